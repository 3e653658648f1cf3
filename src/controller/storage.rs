use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::PathBuf,
};

/// Size of the non-volatile storage (bytes)
pub const STORAGE_SIZE: usize = 1024;

/// Offset of the initialization marker
pub const MARKER_OFFSET: usize = 0x03FF;

/// Value of the initialization marker
pub const MARKER: u8 = 0xAA;

/// Byte addressed non-volatile storage
pub trait Storage {
    fn read(&self, offset: usize, buf: &mut [u8]) -> result::Result<()>;

    fn write(&mut self, offset: usize, bytes: &[u8]) -> result::Result<()>;

    fn is_initialized(&self) -> result::Result<bool> {
        let mut marker = [0u8];
        self.read(MARKER_OFFSET, &mut marker)?;
        Ok(marker[0] == MARKER)
    }

    fn mark_initialized(&mut self) -> result::Result<()> {
        self.write(MARKER_OFFSET, &[MARKER])
    }
}

fn check_bounds(offset: usize, len: usize) -> result::Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= STORAGE_SIZE => Ok(()),
        _ => Err(result::Error::OutOfBounds { offset, len }),
    }
}

/// Volatile storage, starts out erased (`0xFF`)
#[derive(Clone)]
pub struct MemoryStorage {
    bytes: [u8; STORAGE_SIZE],
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { bytes: [0xFF; STORAGE_SIZE] }
    }

    pub fn bytes(&self) -> &[u8; STORAGE_SIZE] {
        &self.bytes
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, offset: usize, buf: &mut [u8]) -> result::Result<()> {
        check_bounds(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> result::Result<()> {
        check_bounds(offset, bytes.len())?;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Storage image kept in a file
///
/// The image is held in memory and the whole file is rewritten on every write.
pub struct FileStorage {
    path: PathBuf,
    image: MemoryStorage,
}

impl FileStorage {
    /// Open the image at `path`. A missing or short file reads as erased storage.
    pub fn open(path: PathBuf) -> result::Result<Self> {
        let mut image = MemoryStorage::new();

        match fs::read(&path) {
            Ok(bytes) => {
                let len = bytes.len().min(STORAGE_SIZE);
                image.bytes[..len].copy_from_slice(&bytes[..len]);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Storage image {} does not exist", path.display());
            }
            Err(err) => return Err(err.into()),
        }

        Ok(Self { path, image })
    }

    fn commit(&self) -> result::Result<()> {
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.path)?;
        file.write_all(self.image.bytes())?;
        Ok(file.sync_all()?)
    }
}

impl Storage for FileStorage {
    fn read(&self, offset: usize, buf: &mut [u8]) -> result::Result<()> {
        self.image.read(offset, buf)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> result::Result<()> {
        self.image.write(offset, bytes)?;
        self.commit()
    }
}

pub mod result {
    use std::{error, fmt, io, result, sync::Arc};

    pub type Result<T> = result::Result<T, Error>;

    #[derive(Clone, Debug)]
    pub enum Error {
        Io(Arc<io::Error>),
        OutOfBounds { offset: usize, len: usize },
    }

    impl fmt::Display for Error {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match *self {
                Error::Io(ref err) => write!(f, "IO Error: {:?}", err),
                Error::OutOfBounds { offset, len } => write!(f, "Access out of bounds: {} bytes at {:#06x}", len, offset),
            }
        }
    }

    impl error::Error for Error {}

    impl From<io::Error> for Error {
        fn from(err: io::Error) -> Self {
            Self::Io(Arc::new(err))
        }
    }
}
