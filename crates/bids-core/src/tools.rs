//! Typed interfaces to the external collaborators.
//!
//! The pipeline only talks to these traits. [`Toolchain::from_commands`]
//! wires in the process-backed clients from [`crate::process`]; tests
//! substitute deterministic fakes.

use std::path::Path;

use bids_model::{RunOrderOutcome, SubjectSession};

use crate::config::{ToolCommands, ToolkitDirs};
use crate::error::Result;
use crate::process::{
    ProcessConverter, ProcessFieldMapScorer, ProcessOrderingFixer, ProcessRawDataScrubber,
};
use crate::scanner::{DicomTagReader, ScannerTagSource};

/// Inputs for the DICOM to NIfTI/BIDS converter.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub source_root: &'a Path,
    pub session: &'a SubjectSession,
    /// Modality-mapping configuration.
    pub config_file: &'a Path,
    pub output_root: &'a Path,
    /// Replace existing outputs so a re-run is idempotent.
    pub overwrite: bool,
}

pub trait ImageConverter {
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<()>;
}

/// Removes non-image (raw data storage) series from a functional DICOM
/// directory, in place, before conversion.
pub trait RawDataScrubber {
    fn scrub(&self, functional_dicoms: &Path) -> Result<()>;
}

/// Inputs for one ordering check-and-fix pass.
#[derive(Debug, Clone, Copy)]
pub struct OrderingRequest<'a> {
    pub staged_root: &'a Path,
    pub error_report: &'a Path,
    pub map_report: &'a Path,
    pub session: &'a SubjectSession,
}

/// Diagnoses and corrects multi-run ordering in place.
///
/// Must be idempotent: calling it on an already ordered tree returns
/// [`RunOrderOutcome::Converged`] and changes nothing.
pub trait OrderingFixer {
    fn check_and_fix(&self, request: &OrderingRequest<'_>) -> Result<RunOrderOutcome>;
}

/// Inputs for field-map scoring and selection.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapRequest<'a> {
    pub staged_root: &'a Path,
    pub toolkit: &'a ToolkitDirs,
    pub session: &'a SubjectSession,
    pub output_root: &'a Path,
}

/// Picks the best field map per group and rewrites `IntendedFor` lists.
pub trait FieldMapScorer {
    fn select(&self, request: &FieldMapRequest<'_>) -> Result<()>;
}

/// The full set of collaborators one pipeline run uses.
pub struct Toolchain {
    pub converter: Box<dyn ImageConverter>,
    pub scrubber: Box<dyn RawDataScrubber>,
    pub ordering: Box<dyn OrderingFixer>,
    pub fieldmaps: Box<dyn FieldMapScorer>,
    pub scanner: Box<dyn ScannerTagSource>,
}

impl Toolchain {
    /// Production toolchain invoking the configured executables.
    pub fn from_commands(commands: &ToolCommands) -> Self {
        Self {
            converter: Box::new(ProcessConverter::new(&commands.converter)),
            scrubber: Box::new(ProcessRawDataScrubber::new(&commands.raw_data_scrubber)),
            ordering: Box::new(ProcessOrderingFixer::new(&commands.ordering_fixer)),
            fieldmaps: Box::new(ProcessFieldMapScorer::new(&commands.fieldmap_scorer)),
            scanner: Box::new(DicomTagReader),
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}
