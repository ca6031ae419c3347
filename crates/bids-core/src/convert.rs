//! Hand-off to the image converter.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use bids_model::{Modality, SubjectSession};

use crate::error::{PipelineError, Result};
use crate::fs_utils::file_name_str;
use crate::tools::{ConversionRequest, ImageConverter, RawDataScrubber};
use crate::workspace::ScratchWorkspace;

/// Modality of a staged acquisition directory, judged by its name.
///
/// Acquisition directories are named after their modality folder
/// (`anat`, `func`, `dwi`, `fmap`), optionally with a suffix.
pub fn acquisition_modality(name: &str) -> Option<Modality> {
    let lower = name.to_ascii_lowercase();
    Modality::ALL
        .into_iter()
        .find(|modality| lower.starts_with(modality.dir_name()))
}

/// Staged acquisition directories of one modality, sorted by name.
pub fn staged_acquisitions(staged_dicoms: &Path, modality: Modality) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(staged_dicoms) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .filter(|path| acquisition_modality(file_name_str(path)) == Some(modality))
        .collect();
    dirs.sort();
    dirs
}

/// Modality folders the converter produced.
#[derive(Debug, Clone, Default)]
pub struct ConversionSummary {
    pub scrubbed_dirs: usize,
    pub modalities: Vec<Modality>,
}

/// Scrubs functional DICOMs, then runs the converter into the staged BIDS root.
pub fn run_conversion(
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
    config_file: &Path,
    converter: &dyn ImageConverter,
    scrubber: &dyn RawDataScrubber,
) -> Result<ConversionSummary> {
    let staged_dicoms = workspace.staged_dicoms(session);
    let functional = staged_acquisitions(&staged_dicoms, Modality::Func);
    for dir in &functional {
        scrubber.scrub(dir)?;
        info!(dir = %dir.display(), "removed raw data storage series");
    }

    let output_root = workspace.bids_root();
    fs::create_dir_all(&output_root).map_err(PipelineError::fs("create", &output_root))?;

    let request = ConversionRequest {
        source_root: &staged_dicoms,
        session,
        config_file,
        output_root: &output_root,
        overwrite: true,
    };
    converter.convert(&request)?;

    let staged_session = workspace.staged_session(session);
    let modalities: Vec<Modality> = Modality::ALL
        .into_iter()
        .filter(|modality| staged_session.join(modality.dir_name()).is_dir())
        .collect();
    info!(?modalities, "conversion produced modality folders");

    Ok(ConversionSummary {
        scrubbed_dirs: functional.len(),
        modalities,
    })
}
