//! Scanner tag access for the diffusion corrector.

use std::path::{Path, PathBuf};

use dicom_dictionary_std::tags;
use dicom_object::OpenFileOptions;

use bids_model::ScannerTags;

use crate::error::{PipelineError, Result};
use crate::fs_utils::{file_name_str, list_files};

const DICOM_TOOL: &str = "DICOM reader";

/// Source of Manufacturer / Software Versions tags for a DICOM file.
pub trait ScannerTagSource {
    fn read_tags(&self, dicom: &Path) -> Result<ScannerTags>;
}

/// Reads tags from DICOM Part 10 files, stopping before pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomTagReader;

impl ScannerTagSource for DicomTagReader {
    fn read_tags(&self, dicom: &Path) -> Result<ScannerTags> {
        let object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(dicom)
            .map_err(|e| {
                PipelineError::external_tool(DICOM_TOOL, format!("{}: {e}", dicom.display()))
            })?;

        let manufacturer = object
            .element(tags::MANUFACTURER)
            .ok()
            .and_then(|element| element.to_str().ok())
            .map(|value| value.trim().to_string())
            .unwrap_or_default();
        let software_version = object
            .element(tags::SOFTWARE_VERSIONS)
            .ok()
            .and_then(|element| element.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(ScannerTags::new(manufacturer, software_version))
    }
}

/// Whether a file looks like a DICOM slice by name.
///
/// Extracted series use `.dcm`, `.dicom`, `.ima`, a numeric UID suffix, or
/// no extension at all.
pub fn is_dicom_candidate(path: &Path) -> bool {
    let name = file_name_str(path);
    if name.is_empty() || name.starts_with('.') {
        return false;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        // UID-style names such as `1.3.12.2.1107.5`.
        Some(ext) if !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_digit()) => true,
        Some(ext) => ["dcm", "dicom", "ima"]
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known)),
        None => true,
    }
}

/// DICOM candidates under `root` in sorted walk order. An unreadable tree
/// has none.
pub fn dicom_candidates(root: &Path) -> Vec<PathBuf> {
    list_files(root)
        .unwrap_or_default()
        .into_iter()
        .filter(|path| is_dicom_candidate(path))
        .collect()
}
