use super::{
    calendar::{self, DateTime},
    program::{
        result::{ProgramError, Result},
        Parity, Program, ProgramIndex, Recurrence, RecurrenceKind, SeasonalAdjustment, StartTime, MAX_INTERVAL_DAYS,
        MAX_RUN_MINUTES, PROGRAM_COUNT, RECORD_SIZE,
    },
    station::{StationIndex, StationQueue, STATION_COUNT},
    storage::{self, Storage},
};

/// Offset of the first program record
pub const STORAGE_BASE: usize = 0x0010;

const SEASONAL_OFFSET: usize = STORAGE_BASE + PROGRAM_COUNT * RECORD_SIZE;

/// Program records followed by the seasonal adjustment byte
const IMAGE_SIZE: usize = PROGRAM_COUNT * RECORD_SIZE + 1;

/// Program table and seasonal adjustment, mirrored to non-volatile storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramTable {
    programs: [Program; PROGRAM_COUNT],
    seasonal_adjustment: SeasonalAdjustment,
    dirty: bool,
}

impl Default for ProgramTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramTable {
    /// All programs disabled, 100% seasonal adjustment
    pub fn new() -> Self {
        Self {
            programs: [Program::default(); PROGRAM_COUNT],
            seasonal_adjustment: SeasonalAdjustment::default(),
            dirty: false,
        }
    }

    /// Load the table, writing defaults to blank storage first
    pub fn init(storage: &mut dyn Storage) -> storage::result::Result<Self> {
        if !storage.is_initialized()? {
            tracing::warn!("Storage is not initialized, writing default programs");
            let mut table = Self::new();
            table.save(storage)?;
            storage.mark_initialized()?;
            return Ok(table);
        }

        Self::restore(storage)
    }

    /// Read the table from storage. A corrupt image is replaced by defaults.
    pub fn restore(storage: &mut dyn Storage) -> storage::result::Result<Self> {
        let mut image = [0u8; IMAGE_SIZE];
        storage.read(STORAGE_BASE, &mut image)?;

        match Self::decode(&image) {
            Ok(table) => {
                tracing::debug!("Restored {} programs from storage", PROGRAM_COUNT);
                Ok(table)
            }
            Err(err) => {
                tracing::warn!("Stored programs are invalid ({}), restoring defaults", err);
                let mut table = Self::new();
                table.save(storage)?;
                Ok(table)
            }
        }
    }

    fn decode(image: &[u8; IMAGE_SIZE]) -> Result<Self> {
        let mut table = Self::new();
        for (program, chunk) in table.programs.iter_mut().zip(image.chunks_exact(RECORD_SIZE)) {
            let mut record = [0u8; RECORD_SIZE];
            record.copy_from_slice(chunk);
            *program = Program::decode(&record)?;
        }

        let tenths = image[PROGRAM_COUNT * RECORD_SIZE];
        table.seasonal_adjustment = SeasonalAdjustment::new(tenths).ok_or(ProgramError::SeasonalAdjustment(tenths))?;
        Ok(table)
    }

    fn encode(&self) -> [u8; IMAGE_SIZE] {
        let mut image = [0u8; IMAGE_SIZE];
        for (chunk, program) in image.chunks_exact_mut(RECORD_SIZE).zip(self.programs.iter()) {
            chunk.copy_from_slice(&program.encode());
        }
        image[IMAGE_SIZE - 1] = self.seasonal_adjustment.tenths();
        image
    }

    /// Write the whole table in one storage write and clear the dirty flag
    pub fn save(&mut self, storage: &mut dyn Storage) -> storage::result::Result<()> {
        storage.write(STORAGE_BASE, &self.encode())?;
        self.dirty = false;
        Ok(())
    }

    /// Save pending changes once the user stopped pressing buttons.
    ///
    /// Returns [true] if the table was written.
    pub fn persist_if_settled(&mut self, storage: &mut dyn Storage, input_active: bool) -> storage::result::Result<bool> {
        if !self.dirty || input_active {
            return Ok(false);
        }

        self.save(storage)?;
        tracing::info!("Programs saved");
        Ok(true)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // region: GETTERS

    pub fn programs(&self) -> &[Program; PROGRAM_COUNT] {
        &self.programs
    }

    pub fn program(&self, index: ProgramIndex) -> Option<&Program> {
        self.programs.get(index)
    }

    pub fn seasonal_adjustment(&self) -> SeasonalAdjustment {
        self.seasonal_adjustment
    }

    // endregion GETTERS

    // region: SETTERS

    fn program_mut(&mut self, index: ProgramIndex) -> Result<&mut Program> {
        let program = self.programs.get_mut(index).ok_or(ProgramError::ProgramIndex(index))?;
        self.dirty = true;
        Ok(program)
    }

    pub fn set_start_time(&mut self, index: ProgramIndex, hour: u8, minute: u8) -> Result<()> {
        let start_time = StartTime::new(hour, minute).ok_or(ProgramError::StartTime { hour, minute })?;
        self.program_mut(index)?.start_time = start_time;
        Ok(())
    }

    pub fn disable(&mut self, index: ProgramIndex) -> Result<()> {
        self.program_mut(index)?.start_time = StartTime::DISABLED;
        Ok(())
    }

    pub fn set_run_time(&mut self, index: ProgramIndex, station: StationIndex, minutes: u8) -> Result<()> {
        if station >= STATION_COUNT {
            return Err(ProgramError::StationIndex(station));
        }
        if minutes > MAX_RUN_MINUTES {
            return Err(ProgramError::RunTime(minutes));
        }
        self.program_mut(index)?.run_times[station] = minutes;
        Ok(())
    }

    pub fn switch_recurrence(&mut self, index: ProgramIndex, kind: RecurrenceKind) -> Result<()> {
        self.program_mut(index)?.switch_recurrence(kind);
        Ok(())
    }

    pub fn set_weekdays(&mut self, index: ProgramIndex, mask: u8) -> Result<()> {
        self.program_mut(index)?.recurrence = Recurrence::Weekdays(mask & Recurrence::EVERY_DAY.encode());
        Ok(())
    }

    pub fn set_odd_even(&mut self, index: ProgramIndex, parity: Parity) -> Result<()> {
        self.program_mut(index)?.recurrence = Recurrence::OddEven(parity);
        Ok(())
    }

    /// Change the interval period and anchor it so the first run is the next start time
    /// from `now` (today if the start time is still ahead, tomorrow otherwise).
    pub fn set_interval_period(&mut self, index: ProgramIndex, period: u8, now: &DateTime) -> Result<()> {
        if period == 0 || period > MAX_INTERVAL_DAYS {
            return Err(ProgramError::IntervalPeriod(period));
        }

        let program = self.program_mut(index)?;
        let passed = u16::from(program.start_time.passed(now));
        let offset = ((calendar::day_of_year(now) + passed) % u16::from(period)) as u8;
        program.recurrence = Recurrence::Interval { period, offset };
        Ok(())
    }

    pub fn set_seasonal_adjustment(&mut self, tenths: u8) -> Result<()> {
        self.seasonal_adjustment = SeasonalAdjustment::new(tenths).ok_or(ProgramError::SeasonalAdjustment(tenths))?;
        self.dirty = true;
        Ok(())
    }

    // endregion SETTERS

    /// Queue every program due at `now`. Returns [true] if any station run time was raised.
    pub fn check(&self, now: &DateTime, stations: &mut StationQueue) -> bool {
        let mut started = false;
        for (index, program) in self.programs.iter().enumerate() {
            if !program.is_due(now) {
                continue;
            }
            tracing::info!("Program {} started at {}", index + 1, now);
            started |= self.queue(index, stations);
        }
        started
    }

    /// Queue the run times of a program, scaled by the seasonal adjustment.
    ///
    /// Returns [true] if any station run time was raised.
    pub fn queue(&self, index: ProgramIndex, stations: &mut StationQueue) -> bool {
        let program = match self.programs.get(index) {
            Some(program) => program,
            None => return false,
        };

        let mut raised = false;
        for (station, minutes) in program.run_times.iter().enumerate().filter(|(_, m)| **m > 0) {
            raised |= stations.queue_start(station, self.seasonal_adjustment.scale(*minutes));
        }
        raised
    }

    /// Re-anchor every interval program on `now`, so the next run is a full period away
    pub fn reset_calendar_offsets(&mut self, now: &DateTime) {
        let year_day = calendar::day_of_year(now);
        for program in self.programs.iter_mut() {
            if let Recurrence::Interval { period, offset } = &mut program.recurrence {
                *offset = (year_day % u16::from(*period)) as u8;
                self.dirty = true;
            }
        }
    }
}
