use std::time::Instant;

use flowgrid_types::SavedActionMoment;

/// Saved actions applied live but not yet committed to history.
#[derive(Debug, Default)]
pub(crate) struct PendingGesture {
    moments: Vec<SavedActionMoment>,
    deadline: Option<Instant>,
}

impl PendingGesture {
    /// Append `moment`; the quiescence deadline restarts at `deadline`.
    pub(crate) fn push(&mut self, moment: SavedActionMoment, deadline: Instant) {
        self.moments.push(moment);
        self.deadline = Some(deadline);
    }

    pub(crate) fn moments(&self) -> &[SavedActionMoment] {
        &self.moments
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub(crate) fn take(&mut self) -> Vec<SavedActionMoment> {
        self.deadline = None;
        std::mem::take(&mut self.moments)
    }
}
