//! Subject/session identity and modality folders.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

const SUBJECT_PREFIX: &str = "sub-";
const SESSION_PREFIX: &str = "ses-";

/// Identity of one pipeline run. Every path the pipeline writes is scoped by it.
///
/// Both labels are stored with their BIDS prefix (`sub-`, `ses-`), so
/// `SubjectSession::new("01", "00A")` and `SubjectSession::new("sub-01", "ses-00A")`
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectSession {
    subject: String,
    session: String,
}

impl SubjectSession {
    /// Builds a session identity, adding missing prefixes.
    ///
    /// Rejects empty labels and labels that would escape their directory.
    pub fn new(subject: &str, session: &str) -> Result<Self> {
        Ok(Self {
            subject: normalize_label("subject", SUBJECT_PREFIX, subject)?,
            session: normalize_label("session", SESSION_PREFIX, session)?,
        })
    }

    /// Subject label with prefix, e.g. `sub-01`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Session label with prefix, e.g. `ses-00A`.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Subject label without the `sub-` prefix, as converters expect it.
    pub fn participant_label(&self) -> &str {
        &self.subject[SUBJECT_PREFIX.len()..]
    }

    /// Session label without the `ses-` prefix.
    pub fn session_label(&self) -> &str {
        &self.session[SESSION_PREFIX.len()..]
    }

    /// `sub-XX/ses-YY`
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.subject).join(&self.session)
    }

    /// `sub-XX/ses-YY/<modality>`
    pub fn modality_dir(&self, modality: Modality) -> PathBuf {
        self.relative_dir().join(modality.dir_name())
    }
}

impl fmt::Display for SubjectSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.session)
    }
}

fn normalize_label(kind: &'static str, prefix: &str, raw: &str) -> Result<String> {
    let raw = raw.trim();
    let label = raw.strip_prefix(prefix).unwrap_or(raw);
    let invalid = |reason| ModelError::InvalidLabel {
        kind,
        value: raw.to_string(),
        reason,
    };
    if label.is_empty() {
        return Err(invalid("label is empty"));
    }
    if label.contains(['/', '\\']) || label == "." || label == ".." {
        return Err(invalid("label must not contain path components"));
    }
    Ok(format!("{prefix}{label}"))
}

/// Modality subfolder of a BIDS session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Anat,
    Func,
    Dwi,
    Fmap,
}

impl Modality {
    pub const ALL: [Modality; 4] = [Self::Anat, Self::Func, Self::Dwi, Self::Fmap];

    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Anat => "anat",
            Self::Func => "func",
            Self::Dwi => "dwi",
            Self::Fmap => "fmap",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_missing_prefixes() {
        let bare = SubjectSession::new("01", "00A").unwrap();
        let prefixed = SubjectSession::new("sub-01", "ses-00A").unwrap();
        assert_eq!(bare, prefixed);
        assert_eq!(bare.subject(), "sub-01");
        assert_eq!(bare.session(), "ses-00A");
        assert_eq!(bare.participant_label(), "01");
        assert_eq!(bare.session_label(), "00A");
    }

    #[test]
    fn rejects_empty_and_traversal_labels() {
        assert!(SubjectSession::new("", "00A").is_err());
        assert!(SubjectSession::new("sub-", "00A").is_err());
        assert!(SubjectSession::new("01", "../00A").is_err());
        assert!(SubjectSession::new("01", "ses-..").is_err());
    }

    #[test]
    fn modality_dir_is_scoped_by_session() {
        let session = SubjectSession::new("sub-01", "ses-00A").unwrap();
        assert_eq!(
            session.modality_dir(Modality::Dwi),
            PathBuf::from("sub-01/ses-00A/dwi")
        );
    }
}
