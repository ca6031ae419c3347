//! Pipeline configuration.
//!
//! Centralizes the session identity, the filesystem roots and the external
//! tool commands so every stage reads them from one place.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use bids_model::SubjectSession;

use crate::error::{PipelineError, Result};

/// Environment variables consulted when toolkit directories are not given.
pub const FSL_DIR_ENV: &str = "FSLDIR";
pub const MRE_DIR_ENV: &str = "MCRROOT";

/// Default dcm2bids mapping configuration.
pub const DEFAULT_CONVERSION_CONFIG: &str = "abcd_dcm2bids.conf";

/// Default directory holding the canonical GE gradient tables.
pub const DEFAULT_REFERENCE_TABLES: &str = "ABCD_Release_2.0_Diffusion_Tables";

/// Toolkit directories handed to the field-map scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolkitDirs {
    /// FSL installation directory.
    pub fsl_dir: PathBuf,
    /// MATLAB Runtime (MRE) directory.
    pub mre_dir: PathBuf,
}

impl ToolkitDirs {
    /// Accepts both directories or neither.
    pub fn from_pair(fsl_dir: Option<PathBuf>, mre_dir: Option<PathBuf>) -> Result<Option<Self>> {
        match (fsl_dir, mre_dir) {
            (Some(fsl_dir), Some(mre_dir)) => Ok(Some(Self { fsl_dir, mre_dir })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(PipelineError::configuration(
                "FSL directory given without an MRE directory",
            )),
            (None, Some(_)) => Err(PipelineError::configuration(
                "MRE directory given without an FSL directory",
            )),
        }
    }

    /// Reads `FSLDIR` and `MCRROOT`; both must be set and non-empty.
    pub fn from_env() -> Option<Self> {
        let read = |key: &str| env::var_os(key).filter(|value| !value.is_empty()).map(PathBuf::from);
        Some(Self {
            fsl_dir: read(FSL_DIR_ENV)?,
            mre_dir: read(MRE_DIR_ENV)?,
        })
    }
}

/// Executables for each external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommands {
    pub converter: PathBuf,
    pub raw_data_scrubber: PathBuf,
    pub ordering_fixer: PathBuf,
    pub fieldmap_scorer: PathBuf,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            converter: PathBuf::from("dcm2bids"),
            raw_data_scrubber: PathBuf::from("remove_RawDataStorage_dcms.py"),
            ordering_fixer: PathBuf::from("run_order_fix.py"),
            fieldmap_scorer: PathBuf::from("sefm_eval_and_json_editor.py"),
        }
    }
}

/// Everything one pipeline invocation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub session: SubjectSession,
    /// Directory with one subdirectory of archives per acquisition.
    pub archive_root: PathBuf,
    /// Durable BIDS output root.
    pub output_root: PathBuf,
    /// Parent of the per-run scratch workspace.
    pub scratch_root: PathBuf,
    /// Toolkit directories; `None` falls back to the environment.
    pub toolkit: Option<ToolkitDirs>,
    /// Modality-mapping configuration for the converter.
    pub conversion_config: PathBuf,
    /// Directory containing the GE reference gradient tables.
    pub reference_tables: PathBuf,
    pub tools: ToolCommands,
}

impl PipelineConfig {
    pub fn new(
        session: SubjectSession,
        archive_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session,
            archive_root: archive_root.into(),
            output_root: output_root.into(),
            scratch_root: scratch_root.into(),
            toolkit: None,
            conversion_config: PathBuf::from(DEFAULT_CONVERSION_CONFIG),
            reference_tables: PathBuf::from(DEFAULT_REFERENCE_TABLES),
            tools: ToolCommands::default(),
        }
    }

    pub fn with_toolkit(mut self, toolkit: Option<ToolkitDirs>) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn with_conversion_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.conversion_config = path.into();
        self
    }

    pub fn with_reference_tables(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_tables = path.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolCommands) -> Self {
        self.tools = tools;
        self
    }

    /// Explicit toolkit directories, else the environment, else `None`.
    pub fn resolved_toolkit(&self) -> Option<ToolkitDirs> {
        self.toolkit.clone().or_else(ToolkitDirs::from_env)
    }

    /// Reference gradient table path for a file name from the rule table.
    pub fn reference_table(&self, file_name: &str) -> PathBuf {
        self.reference_tables.join(file_name)
    }
}
