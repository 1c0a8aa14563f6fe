//! Poll state.
//!
//! At most one poll is active per channel; a new poll unconditionally
//! replaces whatever was there. Closing keeps the final numbers visible
//! until the next poll or a session reset.

use crate::domain::{Poll, PollOption};

#[derive(Default)]
pub struct PollState {
    current: Option<Poll>,
    closed: bool,
    /// The option index this client voted for, if any.
    chosen_option: Option<usize>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_new(&mut self, poll: Poll) {
        self.current = Some(poll);
        self.closed = false;
        self.chosen_option = None;
    }

    /// Apply a vote count update to the current poll.
    pub fn update(&mut self, poll: Poll) {
        match &mut self.current {
            Some(current) => {
                current.options = poll.options;
                current.total_count = poll.total_count;
            }
            // An update without a current poll means we joined mid-poll.
            None => self.current = Some(poll),
        }
    }

    pub fn close_current(&mut self) {
        if self.current.is_some() {
            self.closed = true;
        }
    }

    /// Record the option this client voted for.
    pub fn choose(&mut self, option_index: usize) {
        self.chosen_option = Some(option_index);
    }

    pub fn current(&self) -> Option<&Poll> {
        self.current.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn chosen_option(&self) -> Option<usize> {
        self.chosen_option
    }

    /// Share of the total vote an option holds, in percent.
    pub fn percentage(&self, option: &PollOption) -> f64 {
        let total = self
            .current
            .as_ref()
            .map(|poll| poll.total_count)
            .unwrap_or(0);
        if total == 0 {
            0.0
        } else {
            f64::from(option.count) / f64::from(total) * 100.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
