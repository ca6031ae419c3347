//! Vendor-conditional gradient-table correction for diffusion runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use bids_model::{
    Correction, ManufacturerProfile, Modality, ReferenceTable, ScannerTags, SubjectSession,
};

use crate::config::PipelineConfig;
use crate::convert::staged_acquisitions;
use crate::error::{DataIntegrityError, PipelineError, Result};
use crate::fs_utils::{file_name_str, list_files};
use crate::scanner::{ScannerTagSource, dicom_candidates};
use crate::workspace::ScratchWorkspace;

/// Gradient-table pair of one diffusion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientRun {
    /// Run path without the `.bval` / `.bvec` extension.
    pub stem: PathBuf,
    pub bval: PathBuf,
    pub bvec: PathBuf,
}

/// Outcome of the correction stage.
#[derive(Debug, Clone)]
pub struct DiffusionCorrection {
    pub profile: ManufacturerProfile,
    pub runs: usize,
    /// Reference tables copied in, if any.
    pub replaced_with: Option<ReferenceTable>,
}

/// Applies the correction rule for the session's scanner to every diffusion run.
///
/// Returns `Ok(None)` when the converter produced no `dwi` folder.
pub fn correct_gradient_tables(
    config: &PipelineConfig,
    workspace: &ScratchWorkspace,
    scanner: &dyn ScannerTagSource,
) -> Result<Option<DiffusionCorrection>> {
    let session = &config.session;
    let dwi_dir = workspace.staged_session(session).join(Modality::Dwi.dir_name());
    if !dwi_dir.is_dir() {
        return Ok(None);
    }

    let runs = gradient_runs(&dwi_dir)?;
    let tags = session_scanner_tags(session, workspace, scanner)?;
    let profile = tags.profile();
    info!(
        manufacturer = %tags.manufacturer,
        software_version = tags.software_version.as_deref().unwrap_or(""),
        %profile,
        "classified scanner"
    );

    let replaced_with = match profile.correction() {
        Correction::Reject => {
            return Err(DataIntegrityError::UnrecognizedManufacturer {
                manufacturer: tags.manufacturer,
            }
            .into());
        }
        Correction::Keep => {
            info!(%profile, runs = runs.len(), "keeping converter gradient tables");
            None
        }
        Correction::Replace(table) => {
            let bval = reference_file(config, table.bval_file_name())?;
            let bvec = reference_file(config, table.bvec_file_name())?;
            for run in &runs {
                fs::copy(&bval, &run.bval).map_err(PipelineError::fs("overwrite", &run.bval))?;
                fs::copy(&bvec, &run.bvec).map_err(PipelineError::fs("overwrite", &run.bvec))?;
            }
            info!(%profile, ?table, runs = runs.len(), "replaced gradient tables");
            Some(table)
        }
    };

    Ok(Some(DiffusionCorrection {
        profile,
        runs: runs.len(),
        replaced_with,
    }))
}

/// Reads the scanner tags of the first staged diffusion DICOM that opens.
///
/// Name-matched candidates that turn out not to be DICOM are skipped.
fn session_scanner_tags(
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
    scanner: &dyn ScannerTagSource,
) -> Result<ScannerTags> {
    let staged_dicoms = workspace.staged_dicoms(session);
    let candidates = staged_acquisitions(&staged_dicoms, Modality::Dwi)
        .iter()
        .flat_map(|dir| dicom_candidates(dir))
        .collect::<Vec<_>>();
    for dicom in &candidates {
        match scanner.read_tags(dicom) {
            Ok(tags) => {
                debug!(dicom = %dicom.display(), "read scanner tags");
                return Ok(tags);
            }
            Err(err) => debug!(dicom = %dicom.display(), error = %err, "skipping unreadable candidate"),
        }
    }
    if !candidates.is_empty() {
        warn!(candidates = candidates.len(), "no diffusion candidate could be read as DICOM");
    }
    Err(DataIntegrityError::MissingScannerTags { path: staged_dicoms }.into())
}

fn reference_file(config: &PipelineConfig, file_name: &str) -> Result<PathBuf> {
    let path = config.reference_table(file_name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::configuration(format!(
            "reference gradient table {} not found",
            path.display()
        )))
    }
}

/// Collects the bval/bvec pairs in a `dwi` folder.
///
/// A run with only one of the two files violates the both-or-neither rule.
pub fn gradient_runs(dwi_dir: &Path) -> Result<Vec<GradientRun>> {
    let mut halves: BTreeMap<PathBuf, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
    for path in list_files(dwi_dir).map_err(PipelineError::fs("list", dwi_dir))? {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        let slot = halves.entry(path.with_extension("")).or_default();
        match extension {
            "bval" => slot.0 = Some(path),
            "bvec" => slot.1 = Some(path),
            _ => {}
        }
    }

    let mut runs = Vec::new();
    for (stem, pair) in halves {
        match pair {
            (Some(bval), Some(bvec)) => runs.push(GradientRun { stem, bval, bvec }),
            (None, None) => {}
            (Some(_), None) => return Err(incomplete(stem, "bval", "bvec")),
            (None, Some(_)) => return Err(incomplete(stem, "bvec", "bval")),
        }
    }
    if runs.is_empty() {
        warn!(dir = %dwi_dir.display(), "diffusion folder has no gradient tables");
    }
    Ok(runs)
}

fn incomplete(stem: PathBuf, present: &'static str, missing: &'static str) -> PipelineError {
    let run = PathBuf::from(file_name_str(&stem));
    DataIntegrityError::IncompleteGradientTable {
        run,
        present,
        missing,
    }
    .into()
}
