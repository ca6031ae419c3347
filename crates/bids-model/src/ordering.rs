//! Result of one run-ordering check.

use serde::{Deserialize, Serialize};

/// Outcome reported by the ordering check-and-fix collaborator.
///
/// Each call may already have corrected files in place; `NotConverged` means
/// the tree still needs another pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOrderOutcome {
    Converged,
    NotConverged(String),
}

impl RunOrderOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}
