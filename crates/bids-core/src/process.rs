//! Process-backed collaborator clients.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use bids_model::RunOrderOutcome;

use crate::error::{PipelineError, Result};
use crate::tools::{
    ConversionRequest, FieldMapRequest, FieldMapScorer, ImageConverter, OrderingFixer,
    OrderingRequest, RawDataScrubber,
};

/// Runs a command to completion and fails on a non-zero exit.
fn run_tool(tool: &str, command: &mut Command) -> Result<Output> {
    debug!(tool, command = ?command, "running external tool");
    let output = command.output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::external_tool(tool, "executable not found"),
        _ => PipelineError::external_tool(tool, e.to_string()),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::external_tool(
            tool,
            format!("exit code {:?}: {}", output.status.code(), stderr.trim()),
        ));
    }
    Ok(output)
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// `dcm2bids` client.
#[derive(Debug, Clone)]
pub struct ProcessConverter {
    program: PathBuf,
}

impl ProcessConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ImageConverter for ProcessConverter {
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .arg("-d")
            .arg(request.source_root)
            .arg("-p")
            .arg(request.session.participant_label())
            .arg("-s")
            .arg(request.session.session_label())
            .arg("-c")
            .arg(request.config_file)
            .arg("-o")
            .arg(request.output_root)
            .arg("--forceDcm2niix");
        if request.overwrite {
            command.arg("--clobber");
        }
        run_tool(&tool_name(&self.program), &mut command)?;
        Ok(())
    }
}

/// Raw-data-storage removal script client.
#[derive(Debug, Clone)]
pub struct ProcessRawDataScrubber {
    program: PathBuf,
}

impl ProcessRawDataScrubber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RawDataScrubber for ProcessRawDataScrubber {
    fn scrub(&self, functional_dicoms: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg(functional_dicoms);
        run_tool(&tool_name(&self.program), &mut command)?;
        Ok(())
    }
}

/// Run-order fix script client.
///
/// The script prints only the subject label once the tree is correctly
/// ordered; any other output is a diagnosis of what it still had to fix.
#[derive(Debug, Clone)]
pub struct ProcessOrderingFixer {
    program: PathBuf,
}

impl ProcessOrderingFixer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl OrderingFixer for ProcessOrderingFixer {
    fn check_and_fix(&self, request: &OrderingRequest<'_>) -> Result<RunOrderOutcome> {
        let mut command = Command::new(&self.program);
        command
            .arg(request.staged_root)
            .arg(request.error_report)
            .arg(request.map_report)
            .arg("--all")
            .arg("--subject")
            .arg(request.session.subject());
        let output = run_tool(&tool_name(&self.program), &mut command)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ordering_output(&stdout, request.session.subject()))
    }
}

/// Maps the script's stdout to an outcome: converged only when the whole
/// output is the subject label. Anything else, including a fix log followed
/// by the label, needs another pass.
pub fn parse_ordering_output(stdout: &str, subject: &str) -> RunOrderOutcome {
    let output = stdout.trim();
    if output == subject {
        RunOrderOutcome::Converged
    } else if output.is_empty() {
        RunOrderOutcome::NotConverged("no output".to_string())
    } else {
        RunOrderOutcome::NotConverged(output.to_string())
    }
}

/// Field-map evaluation and sidecar editor client.
#[derive(Debug, Clone)]
pub struct ProcessFieldMapScorer {
    program: PathBuf,
}

impl ProcessFieldMapScorer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FieldMapScorer for ProcessFieldMapScorer {
    fn select(&self, request: &FieldMapRequest<'_>) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .arg(request.staged_root)
            .arg(&request.toolkit.fsl_dir)
            .arg(&request.toolkit.mre_dir)
            .arg(format!(
                "--participant-label={}",
                request.session.participant_label()
            ))
            .arg("--output_dir")
            .arg(request.output_root);
        run_tool(&tool_name(&self.program), &mut command)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_output_must_be_exactly_the_subject() {
        assert_eq!(
            parse_ordering_output("sub-01\n", "sub-01"),
            RunOrderOutcome::Converged
        );
        assert_eq!(
            parse_ordering_output("renamed run-02 -> run-01\nsub-01\n", "sub-01"),
            RunOrderOutcome::NotConverged("renamed run-02 -> run-01\nsub-01".to_string())
        );
        assert_eq!(
            parse_ordering_output("sub-01\nrenamed run-02 -> run-01\n", "sub-01"),
            RunOrderOutcome::NotConverged("sub-01\nrenamed run-02 -> run-01".to_string())
        );
        assert_eq!(
            parse_ordering_output("sub-010\n", "sub-01"),
            RunOrderOutcome::NotConverged("sub-010".to_string())
        );
        assert_eq!(
            parse_ordering_output("\n  \n", "sub-01"),
            RunOrderOutcome::NotConverged("no output".to_string())
        );
    }

    #[test]
    fn missing_executable_is_external_tool_error() {
        let mut command = Command::new("definitely-not-an-installed-tool-d2b");
        let result = run_tool("scrubber", &mut command);
        assert!(matches!(
            result,
            Err(PipelineError::ExternalTool { ref message, .. }) if message == "executable not found"
        ));
    }

    #[test]
    fn tool_name_uses_file_name() {
        assert_eq!(tool_name(Path::new("/opt/abcd/src/run_order_fix.py")), "run_order_fix.py");
    }
}
