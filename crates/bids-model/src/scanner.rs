//! Scanner manufacturer classification and the gradient-table rule set.
//!
//! The two DICOM tags read from a diffusion series are resolved exactly once
//! into a [`ManufacturerProfile`]; the corrective action is then a lookup in
//! [`CORRECTION_TABLE`] rather than nested string matching.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw scanner tags as read from the first diffusion DICOM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerTags {
    /// Manufacturer (0008,0070).
    pub manufacturer: String,
    /// Software Versions (0018,1020). Only consulted for GE scanners.
    pub software_version: Option<String>,
}

impl ScannerTags {
    pub fn new(manufacturer: impl Into<String>, software_version: Option<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            software_version,
        }
    }

    pub fn profile(&self) -> ManufacturerProfile {
        ManufacturerProfile::classify(&self.manufacturer, self.software_version.as_deref())
    }
}

/// GE software versions whose gradient tables are replaced with the DV26 reference.
const GE_DV26_BUCKET: [&str; 6] = ["DV26", "RX26", "DV27", "RX27", "DV28", "RX28"];

/// Closed classification of the scanner that acquired a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManufacturerProfile {
    GeV25,
    GeV26To28,
    GeOther,
    Siemens,
    Philips,
    Unrecognized,
}

impl ManufacturerProfile {
    /// Classifies a manufacturer string and, for GE, its software version.
    ///
    /// Matching is case-insensitive. `DV25` is checked before the DV26-28
    /// bucket, so a version string naming both resolves to `GeV25`.
    pub fn classify(manufacturer: &str, software_version: Option<&str>) -> Self {
        let manufacturer = manufacturer.to_ascii_uppercase();
        if manufacturer.contains("SIEMENS") {
            return Self::Siemens;
        }
        if manufacturer.contains("PHILIPS") {
            return Self::Philips;
        }
        let is_ge = manufacturer
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == "GE" || token == "GEMS");
        if !is_ge {
            return Self::Unrecognized;
        }
        let version = software_version.unwrap_or_default().to_ascii_uppercase();
        if version.contains("DV25") {
            Self::GeV25
        } else if GE_DV26_BUCKET.iter().any(|tag| version.contains(tag)) {
            Self::GeV26To28
        } else {
            Self::GeOther
        }
    }

    /// Looks up the corrective action for this profile.
    pub fn correction(self) -> Correction {
        CORRECTION_TABLE
            .iter()
            .find(|(profile, _)| *profile == self)
            .map_or(Correction::Reject, |(_, correction)| *correction)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::GeV25 => "GE (DV25)",
            Self::GeV26To28 => "GE (DV26-DV28)",
            Self::GeOther => "GE (other version)",
            Self::Siemens => "Siemens",
            Self::Philips => "Philips",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for ManufacturerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the diffusion corrector does to every run's bval/bvec pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Overwrite with the named reference tables.
    Replace(ReferenceTable),
    /// Leave the converter output untouched.
    Keep,
    /// Halt: the rule for this scanner is unknown.
    Reject,
}

pub const CORRECTION_TABLE: [(ManufacturerProfile, Correction); 6] = [
    (
        ManufacturerProfile::GeV25,
        Correction::Replace(ReferenceTable::Dv25),
    ),
    (
        ManufacturerProfile::GeV26To28,
        Correction::Replace(ReferenceTable::Dv26),
    ),
    (ManufacturerProfile::GeOther, Correction::Keep),
    (ManufacturerProfile::Siemens, Correction::Keep),
    (ManufacturerProfile::Philips, Correction::Keep),
    (ManufacturerProfile::Unrecognized, Correction::Reject),
];

/// Canonical GE gradient tables shipped alongside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceTable {
    Dv25,
    Dv26,
}

impl ReferenceTable {
    pub const fn bval_file_name(self) -> &'static str {
        match self {
            Self::Dv25 => "GE_bvals_DV25.txt",
            Self::Dv26 => "GE_bvals_DV26.txt",
        }
    }

    pub const fn bvec_file_name(self) -> &'static str {
        match self {
            Self::Dv25 => "GE_bvecs_DV25.txt",
            Self::Dv26 => "GE_bvecs_DV26.txt",
        }
    }
}
