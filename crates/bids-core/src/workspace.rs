//! Scratch workspace owned by one pipeline invocation.
//!
//! The workspace is a randomly named directory under the scratch root. It is
//! created once, passed by reference to every stage, and never removed by the
//! pipeline: the caller decides when to [`ScratchWorkspace::release`] it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use bids_model::SubjectSession;

use crate::error::{PipelineError, Result};

const WORKSPACE_PREFIX: &str = "dicom2bids-";

/// Layout of the intermediate trees for one invocation.
#[derive(Debug)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    /// Creates a uniquely named workspace under `scratch_root`.
    pub fn create(scratch_root: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_root).map_err(PipelineError::fs("create", scratch_root))?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(scratch_root)
            .map_err(PipelineError::fs("create workspace in", scratch_root))?;
        // Keep the directory around: cleanup belongs to the caller.
        let root = dir.keep();
        debug!(workspace = %root.display(), "created scratch workspace");
        Ok(Self { root })
    }

    /// Wraps an existing directory (used when resuming or in tests).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the staged DICOM trees.
    pub fn dicom_root(&self) -> PathBuf {
        self.root.join("dicoms")
    }

    /// `dicoms/<sub>/<ses>`: one subdirectory per acquisition.
    pub fn staged_dicoms(&self, session: &SubjectSession) -> PathBuf {
        self.dicom_root().join(session.relative_dir())
    }

    /// Where unpacked archives are moved so they are never processed twice.
    pub fn consumed_archives(&self, session: &SubjectSession) -> PathBuf {
        self.root.join("consumed").join(session.relative_dir())
    }

    /// Converter output root.
    pub fn bids_root(&self) -> PathBuf {
        self.root.join("BIDS_unprocessed")
    }

    /// `BIDS_unprocessed/<sub>`
    pub fn staged_subject(&self, session: &SubjectSession) -> PathBuf {
        self.bids_root().join(session.subject())
    }

    /// `BIDS_unprocessed/<sub>/<ses>`
    pub fn staged_session(&self, session: &SubjectSession) -> PathBuf {
        self.bids_root().join(session.relative_dir())
    }

    /// Root of the renamed event logs.
    pub fn sourcedata_root(&self) -> PathBuf {
        self.root.join("sourcedata")
    }

    pub fn order_error_report(&self) -> PathBuf {
        self.root.join("bids_order_error.json")
    }

    pub fn order_map_report(&self) -> PathBuf {
        self.root.join("bids_order_map.json")
    }

    /// Deletes the workspace and everything in it.
    pub fn release(self) -> Result<()> {
        fs::remove_dir_all(&self.root).map_err(PipelineError::fs("remove", &self.root))?;
        info!(workspace = %self.root.display(), "released scratch workspace");
        Ok(())
    }
}
