//! Archive extraction into the staged DICOM tree.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};

use bids_model::SubjectSession;

use crate::error::{PipelineError, Result};
use crate::fs_utils::{copy_tree, file_name_str, list_files};
use crate::workspace::ScratchWorkspace;

const EXTRACT_TOOL: &str = "archive extraction";

/// Archive type for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// tar.gz / tgz archive
    TarGz,
    /// ZIP archive
    Zip,
}

impl ArchiveType {
    /// Get a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "ZIP",
        }
    }
}

impl std::fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Detects the archive type from a file name; `None` for anything else.
#[must_use]
pub fn detect_archive_type(file_name: &str) -> Option<ArchiveType> {
    let name_lower = file_name.to_lowercase();

    if name_lower.ends_with(".tar.gz") || name_lower.ends_with(".tgz") {
        Some(ArchiveType::TarGz)
    } else if name_lower.ends_with(".zip") {
        Some(ArchiveType::Zip)
    } else {
        None
    }
}

pub fn is_archive(path: &Path) -> bool {
    detect_archive_type(file_name_str(path)).is_some()
}

/// What the extraction stage did.
#[derive(Debug, Default, Clone)]
pub struct ExtractSummary {
    /// Acquisition directory names, in processing order.
    pub acquisitions: Vec<String>,
    pub archives_unpacked: usize,
    /// Non-archive files copied alongside the archives.
    pub files_copied: usize,
}

/// Stages every acquisition under `archive_root` into the workspace.
///
/// Each acquisition subdirectory is copied to `dicoms/<sub>/<ses>/<acq>`, its
/// archives are unpacked there and then moved to the consumed area. A missing
/// root is not an error.
pub fn extract_archives(
    archive_root: &Path,
    session: &SubjectSession,
    workspace: &ScratchWorkspace,
) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();
    if !archive_root.is_dir() {
        info!(root = %archive_root.display(), "archive root absent, nothing to extract");
        return Ok(summary);
    }

    for acquisition in acquisition_dirs(archive_root)? {
        let name = file_name_str(&acquisition).to_string();
        let destination = workspace.staged_dicoms(session).join(&name);
        let consumed = workspace.consumed_archives(session).join(&name);

        let copied = copy_tree(&acquisition, &destination, |_| true)
            .map_err(PipelineError::fs("copy", &acquisition))?;

        let archives: Vec<PathBuf> = list_files(&destination)
            .map_err(PipelineError::fs("list", &destination))?
            .into_iter()
            .filter(|path| is_archive(path))
            .collect();

        for archive in &archives {
            let entries = unpack_archive(archive, &destination)?;
            debug!(archive = %archive.display(), entries, "unpacked archive");
            relocate(archive, &destination, &consumed)?;
        }

        let files = copied.saturating_sub(archives.len());
        info!(
            acquisition = %name,
            archives = archives.len(),
            files,
            "staged acquisition"
        );
        summary.archives_unpacked += archives.len();
        summary.files_copied += files;
        summary.acquisitions.push(name);
    }

    Ok(summary)
}

/// Acquisition subdirectories of the root, sorted by name.
fn acquisition_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(PipelineError::fs("read", root))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(PipelineError::fs("read", root))?.path();
        if path.is_dir() {
            dirs.push(path);
        } else if is_archive(&path) {
            warn!(archive = %path.display(), "ignoring archive outside an acquisition directory");
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Unpacks one archive into `destination`, returning the entry count.
pub fn unpack_archive(archive: &Path, destination: &Path) -> Result<usize> {
    let fail = |message: String| {
        PipelineError::external_tool(EXTRACT_TOOL, format!("{}: {message}", archive.display()))
    };
    let archive_type = detect_archive_type(file_name_str(archive))
        .ok_or_else(|| fail("not a supported archive".to_string()))?;
    let file = File::open(archive).map_err(|e| fail(format!("failed to open: {e}")))?;

    match archive_type {
        ArchiveType::TarGz => unpack_tar_gz(file, destination).map_err(fail),
        ArchiveType::Zip => unpack_zip(file, destination).map_err(fail),
    }
}

fn unpack_tar_gz(file: File, destination: &Path) -> std::result::Result<usize, String> {
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = Archive::new(decoder);
    let mut count = 0usize;

    for entry_result in archive
        .entries()
        .map_err(|e| format!("failed to read tar entries: {e}"))?
    {
        let mut entry = entry_result.map_err(|e| format!("failed to read tar entry: {e}"))?;
        let unpacked = entry
            .unpack_in(destination)
            .map_err(|e| format!("failed to unpack entry: {e}"))?;
        if !unpacked {
            let path = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(format!("entry '{path}' escapes the destination"));
        }
        count += 1;
    }
    Ok(count)
}

fn unpack_zip(file: File, destination: &Path) -> std::result::Result<usize, String> {
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| format!("invalid zip: {e}"))?;
    let count = archive.len();
    archive
        .extract(destination)
        .map_err(|e| format!("failed to unpack: {e}"))?;
    Ok(count)
}

/// Moves an unpacked archive out of the staged tree, keeping its relative path.
fn relocate(archive: &Path, staged_root: &Path, consumed_root: &Path) -> Result<()> {
    let relative = archive.strip_prefix(staged_root).unwrap_or(archive);
    let target = consumed_root.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(PipelineError::fs("create", parent))?;
    }
    fs::rename(archive, &target).map_err(PipelineError::fs("relocate", archive))?;
    Ok(())
}
