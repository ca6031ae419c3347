#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use bids_core::{
    ConversionRequest, FieldMapRequest, FieldMapScorer, ImageConverter, OrderingFixer,
    OrderingRequest, PipelineConfig, PipelineError, RawDataScrubber, ScannerTagSource, Toolchain,
    ToolkitDirs,
};
use bids_model::{Modality, RunOrderOutcome, ScannerTags, SubjectSession};

pub fn write_tgz(path: &Path, entries: &[(&str, &[u8])]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// Directories of one test run, all under a single temp root.
pub struct Fixture {
    pub temp: TempDir,
    pub session: SubjectSession,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            session: SubjectSession::new("01", "00A").unwrap(),
        }
    }

    pub fn archive_root(&self) -> PathBuf {
        self.temp.path().join("archives")
    }

    pub fn output_root(&self) -> PathBuf {
        self.temp.path().join("output")
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.temp.path().join("scratch")
    }

    pub fn reference_tables(&self) -> PathBuf {
        self.temp.path().join("tables")
    }

    pub fn acquisition(&self, name: &str) -> PathBuf {
        let dir = self.archive_root().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn config(&self) -> PipelineConfig {
        let toolkit = ToolkitDirs {
            fsl_dir: self.temp.path().join("fsl"),
            mre_dir: self.temp.path().join("mre"),
        };
        PipelineConfig::new(
            self.session.clone(),
            self.archive_root(),
            self.output_root(),
            self.scratch_root(),
        )
        .with_toolkit(Some(toolkit))
        .with_reference_tables(self.reference_tables())
    }

    pub fn write_reference_tables(&self) {
        let dir = self.reference_tables();
        fs::create_dir_all(&dir).unwrap();
        for version in ["DV25", "DV26"] {
            fs::write(dir.join(format!("GE_bvals_{version}.txt")), format!("bvals {version}\n")).unwrap();
            fs::write(dir.join(format!("GE_bvecs_{version}.txt")), format!("bvecs {version}\n")).unwrap();
        }
    }
}

/// Shared log of collaborator calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Failure injected into one collaborator of the fake toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// The converter exits non-zero without writing anything.
    ConverterFails,
    /// The converter writes a truncated functional sidecar.
    MalformedSidecar,
    /// The ordering fixer keeps renaming runs on every pass.
    OrderingNeverConverges,
    /// The field-map scorer exits non-zero.
    ScorerFails,
}

/// Writes a minimal BIDS tree for each requested modality.
pub struct FakeConverter {
    pub modalities: Vec<Modality>,
    pub calls: CallLog,
    pub fault: Fault,
}

impl ImageConverter for FakeConverter {
    fn convert(&self, request: &ConversionRequest<'_>) -> bids_core::Result<()> {
        self.calls.lock().unwrap().push(format!("convert overwrite={}", request.overwrite));
        if self.fault == Fault::ConverterFails {
            return Err(PipelineError::external_tool("dcm2bids", "exit code Some(1)"));
        }
        let session = request.session;
        let prefix = format!("{}_{}", session.subject(), session.session());
        for modality in &self.modalities {
            let dir = request.output_root.join(session.modality_dir(*modality));
            fs::create_dir_all(&dir).unwrap();
            match modality {
                Modality::Anat => {
                    fs::write(dir.join(format!("{prefix}_T1w.nii.gz")), b"t1w").unwrap();
                    fs::write(dir.join(format!("{prefix}_T1w.json")), "{\"EchoTime\":0.002}}").unwrap();
                }
                Modality::Func => {
                    for run in 1..=3 {
                        let stem = format!("{prefix}_task-MID_run-{run:02}_bold");
                        fs::write(dir.join(format!("{stem}.nii.gz")), b"bold").unwrap();
                        let sidecar = if self.fault == Fault::MalformedSidecar {
                            "{\"RepetitionTime\": "
                        } else {
                            "{\"RepetitionTime\":0.8}"
                        };
                        fs::write(dir.join(format!("{stem}.json")), sidecar).unwrap();
                    }
                }
                Modality::Dwi => {
                    let stem = format!("{prefix}_dwi");
                    fs::write(dir.join(format!("{stem}.nii.gz")), b"dwi").unwrap();
                    fs::write(dir.join(format!("{stem}.json")), "{}").unwrap();
                    fs::write(dir.join(format!("{stem}.bval")), "0 1000\n").unwrap();
                    fs::write(dir.join(format!("{stem}.bvec")), "0 1\n").unwrap();
                }
                Modality::Fmap => {
                    fs::write(dir.join(format!("{prefix}_dir-AP_epi.nii.gz")), b"fmap").unwrap();
                    fs::write(dir.join(format!("{prefix}_dir-AP_epi.bval")), "0\n").unwrap();
                    fs::write(dir.join(format!("{prefix}_dir-AP_epi.bvec")), "0\n").unwrap();
                    let intended_for = serde_json::json!({
                        "IntendedFor": [
                            format!("{}/func/{prefix}_task-MID_run-01_bold.nii.gz", session.session()),
                            format!("{}/func/{prefix}_task-SST_run-01_bold.nii.gz", session.session()),
                        ]
                    });
                    fs::write(dir.join(format!("{prefix}_dir-AP_epi.json")), intended_for.to_string()).unwrap();
                    // Scorer intermediates.
                    fs::write(dir.join("vol0000.nii.gz"), b"vol").unwrap();
                    fs::write(request.output_root.join(session.subject()).join("stray.json"), "{}").unwrap();
                }
            }
        }
        Ok(())
    }
}

pub struct FakeScrubber {
    pub calls: CallLog,
}

impl RawDataScrubber for FakeScrubber {
    fn scrub(&self, functional_dicoms: &Path) -> bids_core::Result<()> {
        let name = functional_dicoms.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(format!("scrub {name}"));
        Ok(())
    }
}

/// Converges on the first pass unless told never to.
pub struct FakeOrdering {
    pub calls: CallLog,
    pub converges: bool,
}

impl OrderingFixer for FakeOrdering {
    fn check_and_fix(&self, request: &OrderingRequest<'_>) -> bids_core::Result<RunOrderOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("order {}", request.session.subject()));
        if self.converges {
            Ok(RunOrderOutcome::Converged)
        } else {
            Ok(RunOrderOutcome::NotConverged("renamed run-02 -> run-01".to_string()))
        }
    }
}

/// Leaves a subject-level score file in the output directory it is given,
/// the way the real scorer does.
pub struct FakeScorer {
    pub calls: CallLog,
    pub fails: bool,
}

impl FieldMapScorer for FakeScorer {
    fn select(&self, request: &FieldMapRequest<'_>) -> bids_core::Result<()> {
        self.calls.lock().unwrap().push("select".to_string());
        if self.fails {
            return Err(PipelineError::external_tool("sefm_eval_and_json_editor.py", "exit code Some(1)"));
        }
        let subject = request.session.subject();
        let dir = request.output_root.join(subject);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{subject}_scores.json")), "{}").unwrap();
        Ok(())
    }
}

pub struct FixedScanner(pub ScannerTags);

impl ScannerTagSource for FixedScanner {
    fn read_tags(&self, _dicom: &Path) -> bids_core::Result<ScannerTags> {
        Ok(self.0.clone())
    }
}

pub fn toolchain(modalities: &[Modality], tags: ScannerTags, calls: &CallLog) -> Toolchain {
    faulty_toolchain(modalities, tags, calls, Fault::None)
}

pub fn faulty_toolchain(
    modalities: &[Modality],
    tags: ScannerTags,
    calls: &CallLog,
    fault: Fault,
) -> Toolchain {
    Toolchain {
        converter: Box::new(FakeConverter {
            modalities: modalities.to_vec(),
            calls: Arc::clone(calls),
            fault,
        }),
        scrubber: Box::new(FakeScrubber {
            calls: Arc::clone(calls),
        }),
        ordering: Box::new(FakeOrdering {
            calls: Arc::clone(calls),
            converges: fault != Fault::OrderingNeverConverges,
        }),
        fieldmaps: Box::new(FakeScorer {
            calls: Arc::clone(calls),
            fails: fault == Fault::ScorerFails,
        }),
        scanner: Box::new(FixedScanner(tags)),
    }
}
