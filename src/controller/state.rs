use super::{calendar::DateTime, controls::Selection, sensor::RainMonitor};

pub struct ControllerState {
    /// Date and time, refreshed from the RTC every minute
    pub now: DateTime,
    pub rain: RainMonitor,
    selection: Selection,
    /// Selection to return to when a run in progress completes
    selection_previous: Selection,
}

impl ControllerState {
    pub fn new(now: DateTime) -> Self {
        Self {
            now,
            rain: RainMonitor::default(),
            selection: Selection::default(),
            selection_previous: Selection::default(),
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        if selection != self.selection {
            tracing::info!("Selection {} -> {}", self.selection, selection);
        }
        self.selection = selection;
    }

    /// Show run progress, remembering the current selection
    pub fn enter_progress(&mut self) {
        if self.selection != Selection::Progress {
            self.selection_previous = self.selection;
            self.set_selection(Selection::Progress);
        }
    }

    pub fn leave_progress(&mut self) {
        if self.selection == Selection::Progress {
            self.set_selection(self.selection_previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_returns_to_previous_selection() {
        let mut state = ControllerState::new(DateTime::default());
        state.set_selection(Selection::Off);
        state.enter_progress();
        state.enter_progress();
        assert_eq!(state.selection(), Selection::Progress);

        state.leave_progress();
        assert_eq!(state.selection(), Selection::Off);

        state.leave_progress();
        assert_eq!(state.selection(), Selection::Off, "Only leaves Progress");
    }
}
