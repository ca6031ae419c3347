//! Bounded convergence loop for multi-run ordering.

use tracing::{info, warn};

use bids_model::{Modality, RunOrderOutcome, SubjectSession};

use crate::error::{DataIntegrityError, Result};
use crate::tools::{OrderingFixer, OrderingRequest};
use crate::workspace::ScratchWorkspace;

/// Total check-and-fix passes before the ordering is declared broken.
pub const MAX_ORDERING_ATTEMPTS: u32 = 3;

/// Re-runs the check-and-fix pass until it reports convergence.
///
/// Each pass may correct the tree in place, so a later pass is expected to
/// see a fixed tree. Returns the number of passes used. Tool failures are
/// propagated immediately and not retried.
pub fn converge_run_order(fixer: &dyn OrderingFixer, request: &OrderingRequest<'_>) -> Result<u32> {
    let mut last_reason = String::new();
    for attempt in 1..=MAX_ORDERING_ATTEMPTS {
        let outcome = fixer.check_and_fix(request)?;
        if outcome.is_converged() {
            info!(attempt, "run ordering converged");
            return Ok(attempt);
        }
        if let RunOrderOutcome::NotConverged(reason) = outcome {
            warn!(attempt, %reason, "run ordering not yet converged");
            last_reason = reason;
        }
    }
    Err(DataIntegrityError::OrderingNotConverged {
        attempts: MAX_ORDERING_ATTEMPTS,
        reason: last_reason,
    }
    .into())
}

/// Validates run ordering when the converter produced a `func` folder.
pub fn validate_run_order(
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
    fixer: &dyn OrderingFixer,
) -> Result<Option<u32>> {
    let func_dir = workspace.staged_session(session).join(Modality::Func.dir_name());
    if !func_dir.is_dir() {
        return Ok(None);
    }
    let staged_root = workspace.bids_root();
    let error_report = workspace.order_error_report();
    let map_report = workspace.order_map_report();
    let request = OrderingRequest {
        staged_root: &staged_root,
        error_report: &error_report,
        map_report: &map_report,
        session,
    };
    converge_run_order(fixer, &request).map(Some)
}
