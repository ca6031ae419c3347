//! Normalization of JSON sidecars written by the converter and scorer.
//!
//! A sidecar is rewritten in a fixed layout: key order preserved, four-space
//! indentation, one trailing newline. Content after the first complete JSON
//! value is dropped. The transformation is idempotent, so a second pass leaves
//! every file byte-identical.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Deserializer, Serializer, Value};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result, SidecarError};
use crate::fs_utils::list_files;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// A sidecar in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSidecar {
    pub value: Value,
    pub text: String,
    /// Bytes of out-of-grammar content that followed the JSON object.
    pub dropped_trailing: usize,
}

/// Parses the first JSON value of `raw` and renders it canonically.
pub fn canonicalize_sidecar(raw: &str) -> std::result::Result<CanonicalSidecar, SidecarError> {
    let text = raw.strip_prefix(BYTE_ORDER_MARK).unwrap_or(raw);
    let mut stream = Deserializer::from_str(text).into_iter::<Value>();
    let value = match stream.next() {
        Some(value) => value?,
        None => return Err(SidecarError::Empty),
    };
    if !value.is_object() {
        return Err(SidecarError::NotAnObject);
    }
    let dropped_trailing = text[stream.byte_offset()..].trim().len();

    let text = render_sidecar(&value)?;
    Ok(CanonicalSidecar {
        value,
        text,
        dropped_trailing,
    })
}

/// Renders a sidecar value in the canonical layout.
pub fn render_sidecar(value: &Value) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    // The serializer only emits UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Reads and canonicalizes the sidecar at `path`, returning the raw text
/// alongside. Undecodable or unparseable content is `MalformedSidecar`.
pub(crate) fn load_sidecar(path: &Path) -> Result<(String, CanonicalSidecar)> {
    let bytes = fs::read(path).map_err(PipelineError::fs("read", path))?;
    let raw = String::from_utf8(bytes)
        .map_err(|err| SidecarError::from(err.utf8_error()))
        .map_err(PipelineError::malformed_sidecar(path))?;
    let canonical = canonicalize_sidecar(&raw).map_err(PipelineError::malformed_sidecar(path))?;
    Ok((raw, canonical))
}

/// Canonicalizes one sidecar in place. Returns whether the file changed.
pub fn sanitize_sidecar(path: &Path) -> Result<bool> {
    let (raw, canonical) = load_sidecar(path)?;
    if canonical.dropped_trailing > 0 {
        warn!(
            path = %path.display(),
            bytes = canonical.dropped_trailing,
            "dropped trailing content after sidecar object"
        );
    }
    if canonical.text == raw {
        return Ok(false);
    }
    fs::write(path, canonical.text).map_err(PipelineError::fs("rewrite", path))?;
    debug!(path = %path.display(), "rewrote sidecar");
    Ok(true)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeSummary {
    pub scanned: usize,
    pub rewritten: usize,
}

/// Sanitizes every `*.json` under `dir`. A missing directory is a no-op.
pub fn sanitize_tree(dir: &Path) -> Result<SanitizeSummary> {
    let mut summary = SanitizeSummary::default();
    if !dir.is_dir() {
        return Ok(summary);
    }
    for path in list_files(dir).map_err(PipelineError::fs("list", dir))? {
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        summary.scanned += 1;
        if sanitize_sidecar(&path)? {
            summary.rewritten += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataIntegrityError;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn trailing_content_is_dropped() {
        let canonical = canonicalize_sidecar("{\"RepetitionTime\": 0.8}\n}garbage").unwrap();
        assert_eq!(canonical.text, "{\n    \"RepetitionTime\": 0.8\n}\n");
        assert_eq!(canonical.dropped_trailing, "}garbage".len());
    }

    #[test]
    fn key_order_is_preserved() {
        let canonical = canonicalize_sidecar(r#"{"z": 1, "a": [1, 2], "m": {"y": true, "b": null}}"#)
            .unwrap();
        let z = canonical.text.find("\"z\"").unwrap();
        let a = canonical.text.find("\"a\"").unwrap();
        let m = canonical.text.find("\"m\"").unwrap();
        assert!(z < a && a < m);
        assert!(canonical.text.find("\"y\"").unwrap() < canonical.text.find("\"b\"").unwrap());
    }

    #[test]
    fn byte_order_mark_is_removed() {
        let canonical = canonicalize_sidecar("\u{feff}{\"a\": 1}").unwrap();
        assert_eq!(canonical.text, "{\n    \"a\": 1\n}\n");
    }

    #[test]
    fn rejects_empty_and_non_objects() {
        assert!(matches!(canonicalize_sidecar(""), Err(SidecarError::Empty)));
        assert!(matches!(canonicalize_sidecar("   \n"), Err(SidecarError::Empty)));
        assert!(matches!(canonicalize_sidecar("[1, 2]"), Err(SidecarError::NotAnObject)));
        assert!(matches!(canonicalize_sidecar("garbage {}"), Err(SidecarError::Json(_))));
    }

    #[test]
    fn malformed_file_is_data_integrity_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{\"a\": ").unwrap();
        let err = sanitize_sidecar(&path).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DataIntegrity(DataIntegrityError::MalformedSidecar { .. })
        ));
    }

    #[test]
    fn non_utf8_file_is_malformed_not_filesystem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.json");
        let latin1 = b"{\"InstitutionName\": \"Universit\xe4t\"}";
        fs::write(&path, latin1).unwrap();
        let err = sanitize_sidecar(&path).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DataIntegrity(DataIntegrityError::MalformedSidecar {
                source: SidecarError::Encoding(_),
                ..
            })
        ));
        assert_eq!(fs::read(&path).unwrap(), latin1);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("anat")).unwrap();
        fs::write(dir.path().join("anat/T1w.json"), "{\"EchoTime\":0.002}extra").unwrap();
        fs::write(dir.path().join("anat/T1w.nii.gz"), b"nifti").unwrap();

        let first = sanitize_tree(dir.path()).unwrap();
        let bytes = fs::read(dir.path().join("anat/T1w.json")).unwrap();
        let second = sanitize_tree(dir.path()).unwrap();

        assert_eq!(first, SanitizeSummary { scanned: 1, rewritten: 1 });
        assert_eq!(second, SanitizeSummary { scanned: 1, rewritten: 0 });
        assert_eq!(fs::read(dir.path().join("anat/T1w.json")).unwrap(), bytes);
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _./-]{0,12}".prop_map(Value::from),
        ]
    }

    fn sidecar_object() -> impl Strategy<Value = Value> {
        prop::collection::vec(("[A-Za-z]{1,10}", scalar()), 0..8).prop_map(|pairs| {
            Value::Object(pairs.into_iter().collect())
        })
    }

    proptest! {
        #[test]
        fn canonicalization_is_idempotent(object in sidecar_object(), compact in any::<bool>()) {
            let raw = if compact {
                serde_json::to_string(&object).unwrap()
            } else {
                serde_json::to_string_pretty(&object).unwrap()
            };
            let once = canonicalize_sidecar(&raw).unwrap();
            let twice = canonicalize_sidecar(&once.text).unwrap();
            prop_assert_eq!(&once.text, &twice.text);
            prop_assert_eq!(twice.dropped_trailing, 0);
        }
    }
}
