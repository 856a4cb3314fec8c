//! Follow-the-last-result side selection.

use crate::types::Side;

/// Remembers the result of the most recently completed round.
///
/// The first round of the engine's lifetime plays Even; every later round
/// plays whatever the previous round resolved to. Cycle boundaries do not
/// reset this.
#[derive(Debug, Clone, Default)]
pub struct OutcomeTracker {
    last_result: Option<Side>,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn side_for_next_round(&self) -> Side {
        self.last_result.unwrap_or(Side::Even)
    }

    /// Record a confirmed, decoded round result.
    pub fn record(&mut self, result: Side) {
        self.last_result = Some(result);
    }

    pub fn last_result(&self) -> Option<Side> {
        self.last_result
    }
}
