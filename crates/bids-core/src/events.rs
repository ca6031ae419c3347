//! Renaming of raw task event logs into `sourcedata/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use bids_model::{Modality, SubjectSession, TaskId, canonical_event_log_path};

use crate::error::{PipelineError, Result};
use crate::fs_utils::{file_name_str, list_files};
use crate::workspace::ScratchWorkspace;

/// Marker present in every raw event-log file name.
pub const EVENT_LOG_MARKER: &str = "EventRelatedInformation";

const DEFAULT_EXTENSION: &str = "txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedEventLog {
    pub task: TaskId,
    /// 1-based, per task, in discovery order.
    pub run_index: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Task of a raw event-log file, if its name identifies one.
pub fn event_log_task(file_name: &str) -> Option<TaskId> {
    if !file_name.contains(EVENT_LOG_MARKER) {
        return None;
    }
    TaskId::ALL
        .into_iter()
        .find(|task| task.matches_file_name(file_name))
}

/// Copies every event log in the staged source tree to its canonical name.
///
/// Logs are discovered in sorted path order; that order fixes the run
/// indices. The originals stay in place.
pub fn rename_event_logs(
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
) -> Result<Vec<RenamedEventLog>> {
    let staged = workspace.staged_dicoms(session);
    if !staged.is_dir() {
        return Ok(Vec::new());
    }

    let sourcedata = workspace.sourcedata_root();
    let mut counters: BTreeMap<TaskId, usize> = BTreeMap::new();
    let mut renamed = Vec::new();
    for source in list_files(&staged).map_err(PipelineError::fs("list", &staged))? {
        let Some(task) = event_log_task(file_name_str(&source)) else {
            continue;
        };
        let counter = counters.entry(task).or_default();
        *counter += 1;
        let run_index = *counter;

        let destination = sourcedata.join(canonical_event_log_path(
            session,
            Modality::Func,
            task,
            run_index,
            extension_of(&source),
        ));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(PipelineError::fs("create", parent))?;
        }
        fs::copy(&source, &destination).map_err(PipelineError::fs("copy", &source))?;
        debug!(from = %source.display(), to = %destination.display(), "copied event log");
        renamed.push(RenamedEventLog {
            task,
            run_index,
            source,
            destination,
        });
    }

    if !renamed.is_empty() {
        info!(count = renamed.len(), "renamed task event logs");
    }
    Ok(renamed)
}

fn extension_of(path: &Path) -> &str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_EXTENSION)
}
