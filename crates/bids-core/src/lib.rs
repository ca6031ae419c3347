//! Staged conversion of one subject-session's DICOM archives into BIDS.
//!
//! [`Pipeline::run`] drives the stages against a [`ScratchWorkspace`] and
//! promotes the result into the shared output tree only when every stage
//! succeeded. External tools are reached through the traits in [`tools`];
//! the process-backed clients live in [`process`].

pub mod config;
pub mod convert;
pub mod dwi;
pub mod error;
pub mod events;
pub mod extract;
pub mod fmap;
mod fs_utils;
pub mod ordering;
pub mod pipeline;
pub mod process;
pub mod promote;
pub mod scanner;
pub mod sidecar;
pub mod tools;
pub mod workspace;

pub use config::{PipelineConfig, ToolCommands, ToolkitDirs};
pub use error::{DataIntegrityError, ErrorCategory, PipelineError, Result, SidecarError};
pub use extract::{ArchiveType, ExtractSummary, extract_archives};
pub use ordering::{MAX_ORDERING_ATTEMPTS, converge_run_order};
pub use pipeline::{Pipeline, PipelineReport, Stage, StageOutcome};
pub use promote::PromotionSummary;
pub use scanner::{DicomTagReader, ScannerTagSource};
pub use sidecar::{CanonicalSidecar, canonicalize_sidecar, sanitize_sidecar, sanitize_tree};
pub use tools::{
    ConversionRequest, FieldMapRequest, FieldMapScorer, ImageConverter, OrderingFixer,
    OrderingRequest, RawDataScrubber, Toolchain,
};
pub use workspace::ScratchWorkspace;
