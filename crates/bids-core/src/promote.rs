//! Promotion of the staged session into the shared output tree.
//!
//! Each promoted directory is first copied into a hidden sibling of its
//! destination, verified file by file with SHA-256, and only then renamed
//! into place. A reader of the output tree never sees a half-copied session.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use bids_model::{Modality, SubjectSession};

use crate::error::{PipelineError, Result};
use crate::fs_utils::{copy_tree, file_sha256, grant_group_rw, list_files, remove_file_best_effort};
use crate::workspace::ScratchWorkspace;

#[derive(Debug, Clone, Default)]
pub struct PromotionSummary {
    /// `<output>/<sub>/<ses>`
    pub session_dir: PathBuf,
    /// `<output>/sourcedata/<sub>/<ses>`, when event logs were staged.
    pub sourcedata_dir: Option<PathBuf>,
    pub files_promoted: usize,
    pub removed_gradient_files: usize,
    pub warnings: Vec<String>,
}

/// Publishes the staged session and its renamed event logs under `output_root`.
pub fn promote_session(
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
    output_root: &Path,
) -> Result<PromotionSummary> {
    let mut summary = PromotionSummary::default();

    let staged_subject = workspace.staged_subject(session);
    summary.warnings.extend(grant_group_rw(&staged_subject));
    summary.removed_gradient_files =
        remove_fieldmap_gradients(&workspace.staged_session(session), &mut summary.warnings);

    fs::create_dir_all(output_root).map_err(PipelineError::fs("create", output_root))?;
    let session_dir = output_root.join(session.relative_dir());
    summary.files_promoted += atomic_copy(&workspace.staged_session(session), &session_dir)?;
    info!(destination = %session_dir.display(), "promoted session");
    summary.session_dir = session_dir;

    let staged_sourcedata = workspace.sourcedata_root().join(session.subject());
    if staged_sourcedata.is_dir() {
        summary.warnings.extend(grant_group_rw(&staged_sourcedata));
        let source = workspace.sourcedata_root().join(session.relative_dir());
        let destination = output_root.join("sourcedata").join(session.relative_dir());
        summary.files_promoted += atomic_copy(&source, &destination)?;
        info!(destination = %destination.display(), "promoted sourcedata");
        summary.sourcedata_dir = Some(destination);
    }

    Ok(summary)
}

/// Field maps carry no gradient tables; the converter sometimes writes them anyway.
fn remove_fieldmap_gradients(staged_session: &Path, warnings: &mut Vec<String>) -> usize {
    let fmap = staged_session.join(Modality::Fmap.dir_name());
    if !fmap.is_dir() {
        return 0;
    }
    let files = match list_files(&fmap) {
        Ok(files) => files,
        Err(error) => {
            warn!(path = %fmap.display(), %error, "cannot list field maps");
            warnings.push(format!("list {}: {error}", fmap.display()));
            return 0;
        }
    };
    files
        .iter()
        .filter(|path| matches!(path.extension().and_then(|e| e.to_str()), Some("bval" | "bvec")))
        .filter(|path| remove_file_best_effort(path, warnings))
        .count()
}

/// Copies `src` to `dst` through a verified staging sibling, replacing any
/// existing `dst`. Returns the number of files copied.
pub fn atomic_copy(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        return Err(PipelineError::Filesystem {
            operation: "promote",
            path: src.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "staged directory does not exist"),
        });
    }
    let parent = dst
        .parent()
        .ok_or_else(|| PipelineError::configuration(format!("{} has no parent", dst.display())))?;
    fs::create_dir_all(parent).map_err(PipelineError::fs("create", parent))?;
    let name = dst
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::configuration(format!("{} has no file name", dst.display())))?;

    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}.promoting-"))
        .tempdir_in(parent)
        .map_err(PipelineError::fs("create staging directory in", parent))?;
    let permissions = fs::metadata(src)
        .map_err(PipelineError::fs("inspect", src))?
        .permissions();
    fs::set_permissions(staging.path(), permissions)
        .map_err(PipelineError::fs("set permissions on", staging.path()))?;

    let copied = copy_tree(src, staging.path(), |_| true).map_err(PipelineError::fs("copy", src))?;
    verify_copy(src, staging.path())?;
    debug!(staging = %staging.path().display(), files = copied, "verified staged copy");

    swap_into_place(staging, dst, parent, name)?;
    Ok(copied)
}

fn verify_copy(src: &Path, copy: &Path) -> Result<()> {
    for original in list_files(src).map_err(PipelineError::fs("list", src))? {
        let relative = original.strip_prefix(src).map_err(|err| PipelineError::Filesystem {
            operation: "verify",
            path: original.clone(),
            source: io::Error::other(err),
        })?;
        let copied = copy.join(relative);
        let expected = file_sha256(&original).map_err(PipelineError::fs("hash", &original))?;
        let actual = file_sha256(&copied).map_err(PipelineError::fs("hash", &copied))?;
        if expected != actual {
            return Err(PipelineError::Filesystem {
                operation: "verify",
                path: copied,
                source: io::Error::new(io::ErrorKind::InvalidData, "checksum mismatch after copy"),
            });
        }
    }
    Ok(())
}

fn swap_into_place(staging: TempDir, dst: &Path, parent: &Path, name: &str) -> Result<()> {
    // The backup directory is removed when it goes out of scope.
    let backup = if dst.exists() {
        let holder = tempfile::Builder::new()
            .prefix(&format!(".{name}.replaced-"))
            .tempdir_in(parent)
            .map_err(PipelineError::fs("create backup directory in", parent))?;
        let previous = holder.path().join(name);
        fs::rename(dst, &previous).map_err(PipelineError::fs("move aside", dst))?;
        Some((holder, previous))
    } else {
        None
    };

    let staged = staging.keep();
    if let Err(source) = fs::rename(&staged, dst) {
        if let Some((_, previous)) = &backup {
            if let Err(error) = fs::rename(previous, dst) {
                warn!(path = %dst.display(), %error, "cannot restore previous destination");
            }
        }
        if let Err(error) = fs::remove_dir_all(&staged) {
            warn!(path = %staged.display(), %error, "cannot remove staging directory");
        }
        return Err(PipelineError::Filesystem {
            operation: "swap into",
            path: dst.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staged/ses-00A");
        fs::create_dir_all(src.join("anat")).unwrap();
        fs::write(src.join("anat/T1w.nii.gz"), b"new").unwrap();
        let dst = dir.path().join("out/sub-01/ses-00A");
        fs::create_dir_all(dst.join("func")).unwrap();
        fs::write(dst.join("func/old.nii.gz"), b"old").unwrap();

        let copied = atomic_copy(&src, &dst).unwrap();

        assert_eq!(copied, 1);
        assert_eq!(fs::read(dst.join("anat/T1w.nii.gz")).unwrap(), b"new");
        assert!(!dst.join("func").exists());
        let leftovers: Vec<_> = fs::read_dir(dst.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("ses-00A")]);
    }

    #[test]
    fn missing_source_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let err = atomic_copy(&dir.path().join("absent"), &dir.path().join("out/ses-00A")).unwrap_err();
        assert!(matches!(err, PipelineError::Filesystem { operation: "promote", .. }));
        assert!(!dir.path().join("out/ses-00A").exists());
    }

    #[test]
    fn strips_fieldmap_gradients() {
        let dir = TempDir::new().unwrap();
        let fmap = dir.path().join("fmap");
        fs::create_dir_all(&fmap).unwrap();
        for name in ["a_epi.nii.gz", "a_epi.json", "a_epi.bval", "a_epi.bvec"] {
            fs::write(fmap.join(name), b"x").unwrap();
        }
        let mut warnings = Vec::new();
        assert_eq!(remove_fieldmap_gradients(dir.path(), &mut warnings), 2);
        assert!(warnings.is_empty());
        assert!(fmap.join("a_epi.json").is_file());
    }
}
