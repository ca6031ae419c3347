//! Field-map selection hand-off and cleanup of what the scorer leaves behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use bids_model::{Modality, SubjectSession};

use crate::config::ToolkitDirs;
use crate::error::{PipelineError, Result, SidecarError};
use crate::fs_utils::{file_name_str, list_files, remove_file_best_effort};
use crate::sidecar::{CanonicalSidecar, load_sidecar, render_sidecar};
use crate::tools::{FieldMapRequest, FieldMapScorer};
use crate::workspace::ScratchWorkspace;

/// Prefix of dataset-relative `IntendedFor` URIs.
const BIDS_URI_PREFIX: &str = "bids::";

#[derive(Debug, Clone, Default)]
pub struct FieldMapSummary {
    pub removed_artifacts: usize,
    pub pruned_links: usize,
    /// Best-effort failures that did not stop the stage.
    pub warnings: Vec<String>,
}

/// Runs the scorer on the staged tree, then removes combined-direction
/// artifacts and `IntendedFor` links to files that no longer exist.
///
/// The scorer is handed the final `output_root` and drops subject-level JSON
/// files there as well as in the staged tree; both sets are removed. Only this
/// session's subject directory is touched under `output_root`.
///
/// Returns `Ok(None)` when the converter produced no `fmap` folder.
pub fn select_field_maps(
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
    toolkit: &ToolkitDirs,
    output_root: &Path,
    scorer: &dyn FieldMapScorer,
) -> Result<Option<FieldMapSummary>> {
    let fmap_dir = workspace.staged_session(session).join(Modality::Fmap.dir_name());
    if !fmap_dir.is_dir() {
        return Ok(None);
    }

    let staged_root = workspace.bids_root();
    scorer.select(&FieldMapRequest {
        staged_root: &staged_root,
        toolkit,
        session,
        output_root,
    })?;
    info!(fmap = %fmap_dir.display(), "field-map selection finished");

    let staged_subject = workspace.staged_subject(session);
    let mut artifacts = combined_artifacts(&fmap_dir)?;
    artifacts.extend(subject_level_json(&staged_subject)?);
    artifacts.extend(subject_level_json(&output_root.join(session.subject()))?);

    let mut summary = FieldMapSummary::default();
    for artifact in artifacts {
        if remove_file_best_effort(&artifact, &mut summary.warnings) {
            debug!(path = %artifact.display(), "removed field-map scorer artifact");
            summary.removed_artifacts += 1;
        }
    }
    summary.pruned_links = prune_intended_for(&fmap_dir, &staged_root, &staged_subject)?;
    Ok(Some(summary))
}

/// True for scorer intermediates in `fmap/` that must not be promoted.
pub fn is_combined_artifact(file_name: &str) -> bool {
    (file_name.starts_with("vol") && file_name.ends_with(".nii.gz")) || file_name.contains("dir-both")
}

/// Combined-direction files in `fmap_dir`.
fn combined_artifacts(fmap_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(fmap_dir)
        .map_err(PipelineError::fs("list", fmap_dir))?
        .into_iter()
        .filter(|path| is_combined_artifact(file_name_str(path)))
        .collect())
}

/// JSON files directly inside `subject_dir`. A missing directory has none.
fn subject_level_json(subject_dir: &Path) -> Result<Vec<PathBuf>> {
    if !subject_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(subject_dir).map_err(PipelineError::fs("list", subject_dir))?;
    let mut stray: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    stray.sort();
    Ok(stray)
}

/// Drops `IntendedFor` entries whose target is missing from the staged tree.
///
/// Entries are either subject-relative (`ses-X/func/...`) or dataset-relative
/// BIDS URIs (`bids::sub-Y/ses-X/func/...`). Returns the number removed.
fn prune_intended_for(fmap_dir: &Path, staged_root: &Path, subject_dir: &Path) -> Result<usize> {
    let mut pruned = 0;
    for path in list_files(fmap_dir).map_err(PipelineError::fs("list", fmap_dir))? {
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let (_, CanonicalSidecar { mut value, .. }) = load_sidecar(&path)?;

        let removed = match value.get_mut("IntendedFor") {
            Some(links) => retain_existing(links, staged_root, subject_dir),
            None => 0,
        };
        if removed == 0 {
            continue;
        }
        if value.get("IntendedFor").is_some_and(is_empty_links) {
            if let Some(object) = value.as_object_mut() {
                object.shift_remove("IntendedFor");
            }
        }
        warn!(sidecar = %path.display(), removed, "pruned dangling IntendedFor links");
        let text = render_sidecar(&value)
            .map_err(SidecarError::from)
            .map_err(PipelineError::malformed_sidecar(&path))?;
        fs::write(&path, text).map_err(PipelineError::fs("rewrite", &path))?;
        pruned += removed;
    }
    Ok(pruned)
}

fn retain_existing(links: &mut Value, staged_root: &Path, subject_dir: &Path) -> usize {
    match links {
        Value::String(target) if !link_exists(target, staged_root, subject_dir) => {
            *links = Value::Array(Vec::new());
            1
        }
        Value::Array(targets) => {
            let before = targets.len();
            targets.retain(|target| {
                target
                    .as_str()
                    .is_none_or(|target| link_exists(target, staged_root, subject_dir))
            });
            before - targets.len()
        }
        _ => 0,
    }
}

fn is_empty_links(links: &Value) -> bool {
    links.as_array().is_some_and(Vec::is_empty)
}

fn link_exists(target: &str, staged_root: &Path, subject_dir: &Path) -> bool {
    match target.strip_prefix(BIDS_URI_PREFIX) {
        Some(dataset_relative) => staged_root.join(dataset_relative).is_file(),
        None => subject_dir.join(target).is_file(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Writes the subject-level JSON the real scorer leaves in its output
    /// directory and remembers where it was pointed.
    #[derive(Default)]
    struct RecordingScorer {
        output_roots: RefCell<Vec<PathBuf>>,
    }

    impl FieldMapScorer for RecordingScorer {
        fn select(&self, request: &FieldMapRequest<'_>) -> Result<()> {
            self.output_roots.borrow_mut().push(request.output_root.to_path_buf());
            let subject = request.output_root.join(request.session.subject());
            fs::create_dir_all(&subject).unwrap();
            fs::write(subject.join("sub-01_ses-00A_fmap-scores.json"), "{}").unwrap();
            Ok(())
        }
    }

    #[test]
    fn recognizes_combined_artifacts() {
        assert!(is_combined_artifact("vol0000.nii.gz"));
        assert!(is_combined_artifact("sub-01_ses-00A_dir-both_epi.nii.gz"));
        assert!(!is_combined_artifact("sub-01_ses-00A_dir-AP_run-01_epi.nii.gz"));
        assert!(!is_combined_artifact("volume.json"));
    }

    #[test]
    fn prunes_only_missing_targets() {
        let dir = TempDir::new().unwrap();
        let staged_root = dir.path();
        let subject_dir = staged_root.join("sub-01");
        let fmap = subject_dir.join("ses-00A/fmap");
        let func = subject_dir.join("ses-00A/func");
        fs::create_dir_all(&fmap).unwrap();
        fs::create_dir_all(&func).unwrap();
        fs::write(func.join("sub-01_ses-00A_task-MID_run-01_bold.nii.gz"), b"x").unwrap();
        fs::write(
            fmap.join("sub-01_ses-00A_dir-AP_epi.json"),
            r#"{"IntendedFor": [
                "ses-00A/func/sub-01_ses-00A_task-MID_run-01_bold.nii.gz",
                "ses-00A/func/sub-01_ses-00A_task-MID_run-02_bold.nii.gz",
                "bids::sub-01/ses-00A/func/sub-01_ses-00A_task-MID_run-01_bold.nii.gz"
            ], "TotalReadoutTime": 0.05}"#,
        )
        .unwrap();
        fs::write(
            fmap.join("sub-01_ses-00A_dir-PA_epi.json"),
            r#"{"IntendedFor": "ses-00A/func/gone_bold.nii.gz"}"#,
        )
        .unwrap();

        let pruned = prune_intended_for(&fmap, staged_root, &subject_dir).unwrap();

        assert_eq!(pruned, 2);
        let ap: Value =
            serde_json::from_str(&fs::read_to_string(fmap.join("sub-01_ses-00A_dir-AP_epi.json")).unwrap())
                .unwrap();
        assert_eq!(ap["IntendedFor"].as_array().unwrap().len(), 2);
        let pa: Value =
            serde_json::from_str(&fs::read_to_string(fmap.join("sub-01_ses-00A_dir-PA_epi.json")).unwrap())
                .unwrap();
        assert!(pa.get("IntendedFor").is_none());
    }

    #[test]
    fn scorer_targets_final_output_and_its_json_is_removed() {
        let scratch = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let workspace = ScratchWorkspace::at(scratch.path());
        let session = SubjectSession::new("01", "00A").unwrap();
        let fmap = workspace.staged_session(&session).join("fmap");
        fs::create_dir_all(&fmap).unwrap();
        fs::write(fmap.join("vol0000.nii.gz"), b"x").unwrap();
        fs::write(fmap.join("sub-01_ses-00A_dir-AP_epi.json"), "{}").unwrap();
        fs::write(workspace.staged_subject(&session).join("stray.json"), "{}").unwrap();
        let toolkit = ToolkitDirs {
            fsl_dir: PathBuf::from("/opt/fsl"),
            mre_dir: PathBuf::from("/opt/mcr"),
        };
        let scorer = RecordingScorer::default();

        let summary = select_field_maps(&session, &workspace, &toolkit, output.path(), &scorer)
            .unwrap()
            .unwrap();

        assert_eq!(*scorer.output_roots.borrow(), vec![output.path().to_path_buf()]);
        assert_eq!(summary.removed_artifacts, 3);
        assert!(!output.path().join("sub-01/sub-01_ses-00A_fmap-scores.json").exists());
        assert!(!workspace.staged_subject(&session).join("stray.json").exists());
        assert!(!fmap.join("vol0000.nii.gz").exists());
        assert!(fmap.join("sub-01_ses-00A_dir-AP_epi.json").exists());
    }

    #[test]
    fn missing_fmap_folder_skips_scorer() {
        let scratch = TempDir::new().unwrap();
        let workspace = ScratchWorkspace::at(scratch.path());
        let session = SubjectSession::new("01", "00A").unwrap();
        let toolkit = ToolkitDirs {
            fsl_dir: PathBuf::from("/opt/fsl"),
            mre_dir: PathBuf::from("/opt/mcr"),
        };
        let scorer = RecordingScorer::default();

        let result = select_field_maps(&session, &workspace, &toolkit, scratch.path(), &scorer).unwrap();

        assert!(result.is_none());
        assert!(scorer.output_roots.borrow().is_empty());
    }
}
