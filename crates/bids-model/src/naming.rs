//! Canonical file names for task event logs in `sourcedata/`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::session::{Modality, SubjectSession};

/// Behavioral tasks with per-run event logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskId {
    Mid,
    Sst,
    NBack,
}

impl TaskId {
    pub const ALL: [TaskId; 3] = [Self::Mid, Self::Sst, Self::NBack];

    /// Token that identifies this task in raw scanner-side file names.
    pub const fn matcher(self) -> &'static str {
        match self {
            Self::Mid => "MID",
            Self::Sst => "SST",
            Self::NBack => "nBack",
        }
    }

    /// Task label used in output file names.
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Mid => "MID",
            Self::Sst => "SST",
            Self::NBack => "nback",
        }
    }

    /// Whether a raw file name carries this task's matcher as a whole token.
    ///
    /// Tokens are separated by `-`, `_` or `.`, so `ABCD-MID-fMRI_run-...`
    /// matches `MID` while `ABCD-MIDline...` does not.
    pub fn matches_file_name(self, file_name: &str) -> bool {
        file_name
            .split(['-', '_', '.'])
            .any(|token| token == self.matcher())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// `{subject}_{session}_task-{task}_run-{index:02}_bold_EventRelatedInformation.{ext}`
pub fn event_log_file_name(
    session: &SubjectSession,
    task: TaskId,
    run_index: usize,
    extension: &str,
) -> String {
    format!(
        "{}_{}_task-{}_run-{:02}_bold_EventRelatedInformation.{}",
        session.subject(),
        session.session(),
        task.canonical_name(),
        run_index,
        extension.trim_start_matches('.')
    )
}

/// Path of an event log relative to the `sourcedata/` root.
pub fn canonical_event_log_path(
    session: &SubjectSession,
    modality: Modality,
    task: TaskId,
    run_index: usize,
    extension: &str,
) -> PathBuf {
    session
        .modality_dir(modality)
        .join(event_log_file_name(session, task, run_index, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SubjectSession {
        SubjectSession::new("sub-01", "ses-00A").unwrap()
    }

    #[test]
    fn nback_uses_canonical_alias() {
        assert_eq!(
            event_log_file_name(&session(), TaskId::NBack, 2, "txt"),
            "sub-01_ses-00A_task-nback_run-02_bold_EventRelatedInformation.txt"
        );
    }

    #[test]
    fn extension_dot_is_optional() {
        assert_eq!(
            event_log_file_name(&session(), TaskId::Mid, 1, ".csv"),
            "sub-01_ses-00A_task-MID_run-01_bold_EventRelatedInformation.csv"
        );
    }

    #[test]
    fn relative_path_lands_in_modality_dir() {
        assert_eq!(
            canonical_event_log_path(&session(), Modality::Func, TaskId::Sst, 3, "txt"),
            PathBuf::from(
                "sub-01/ses-00A/func/sub-01_ses-00A_task-SST_run-03_bold_EventRelatedInformation.txt"
            )
        );
    }

    #[test]
    fn matcher_requires_whole_token() {
        assert!(TaskId::Mid.matches_file_name("ABCD-MID-fMRI_run-20180101-EventRelatedInformation.txt"));
        assert!(TaskId::NBack.matches_file_name("ABCD-nBack-fMRI_run-1-EventRelatedInformation.txt"));
        assert!(!TaskId::NBack.matches_file_name("ABCD-nback-fMRI_run-1-EventRelatedInformation.txt"));
        assert!(!TaskId::Sst.matches_file_name("ABCD-SSTX-fMRI_run-1-EventRelatedInformation.txt"));
    }
}
