use core::fmt;

/// Front panel buttons and rotary switch
pub trait Buttons: Send {
    fn any_pressed(&mut self) -> bool;
}

/// Operating mode selected on the front panel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Automatic programs
    Run,
    /// Programs suspended
    Off,
    /// Manual or remote run in progress
    Progress,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Run
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Selection::Run => write!(f, "RUN"),
            Selection::Off => write!(f, "OFF"),
            Selection::Progress => write!(f, "PROGRESS"),
        }
    }
}
