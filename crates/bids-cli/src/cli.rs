//! CLI argument definitions for `dicom2bids`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use bids_core::{PipelineConfig, ToolCommands, ToolkitDirs};
use bids_model::SubjectSession;

#[derive(Parser)]
#[command(
    name = "dicom2bids",
    version,
    about = "Convert one subject-session of DICOM archives into a BIDS tree",
    long_about = "Convert one subject-session of DICOM archives into a BIDS tree.\n\n\
                  Archives are staged in a private scratch workspace, converted,\n\
                  corrected and validated there, and promoted into the output\n\
                  directory only when every stage succeeds."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert one subject-session and promote it into the output tree.
    Convert(ConvertArgs),

    /// Show the gradient-table rule for each scanner profile.
    Rules,
}

#[derive(Parser)]
pub struct ConvertArgs {
    /// Participant label, with or without the `sub-` prefix.
    #[arg(value_name = "SUBJECT")]
    pub subject: String,

    /// Session label, with or without the `ses-` prefix.
    #[arg(value_name = "SESSION")]
    pub session: String,

    /// Directory with one subdirectory of archives per acquisition.
    #[arg(value_name = "ARCHIVE_ROOT")]
    pub archive_root: PathBuf,

    /// Shared BIDS output tree.
    #[arg(value_name = "OUTPUT_ROOT")]
    pub output_root: PathBuf,

    /// Directory in which the private scratch workspace is created.
    #[arg(value_name = "SCRATCH_ROOT")]
    pub scratch_root: PathBuf,

    /// FSL installation directory (defaults to $FSLDIR).
    #[arg(value_name = "FSL_DIR", requires = "mre_dir")]
    pub fsl_dir: Option<PathBuf>,

    /// MATLAB Runtime directory (defaults to $MCRROOT).
    #[arg(value_name = "MRE_DIR")]
    pub mre_dir: Option<PathBuf>,

    /// Converter modality-mapping configuration.
    #[arg(long = "dcm2bids-config", value_name = "PATH")]
    pub conversion_config: Option<PathBuf>,

    /// Directory with the GE reference gradient tables.
    #[arg(long = "reference-tables", value_name = "DIR")]
    pub reference_tables: Option<PathBuf>,

    /// Converter executable.
    #[arg(long = "converter", value_name = "PROGRAM")]
    pub converter: Option<PathBuf>,

    /// Raw-data-storage scrubber executable.
    #[arg(long = "raw-data-scrubber", value_name = "PROGRAM")]
    pub raw_data_scrubber: Option<PathBuf>,

    /// Run-order check-and-fix executable.
    #[arg(long = "ordering-fixer", value_name = "PROGRAM")]
    pub ordering_fixer: Option<PathBuf>,

    /// Field-map scorer executable.
    #[arg(long = "fieldmap-scorer", value_name = "PROGRAM")]
    pub fieldmap_scorer: Option<PathBuf>,

    /// Remove the scratch workspace when the run ends, whether or not it succeeded.
    ///
    /// By default the workspace is kept so a failed session can be inspected.
    #[arg(long = "cleanup-scratch")]
    pub cleanup_scratch: bool,
}

impl ConvertArgs {
    /// Builds the pipeline configuration, validating labels and the toolkit pair.
    pub fn pipeline_config(&self) -> bids_core::Result<PipelineConfig> {
        let session = SubjectSession::new(&self.subject, &self.session)?;
        let toolkit = ToolkitDirs::from_pair(self.fsl_dir.clone(), self.mre_dir.clone())?;

        let defaults = ToolCommands::default();
        let tools = ToolCommands {
            converter: self.converter.clone().unwrap_or(defaults.converter),
            raw_data_scrubber: self
                .raw_data_scrubber
                .clone()
                .unwrap_or(defaults.raw_data_scrubber),
            ordering_fixer: self.ordering_fixer.clone().unwrap_or(defaults.ordering_fixer),
            fieldmap_scorer: self
                .fieldmap_scorer
                .clone()
                .unwrap_or(defaults.fieldmap_scorer),
        };

        let mut config = PipelineConfig::new(
            session,
            &self.archive_root,
            &self.output_root,
            &self.scratch_root,
        )
        .with_toolkit(toolkit)
        .with_tools(tools);
        if let Some(path) = &self.conversion_config {
            config = config.with_conversion_config(path);
        }
        if let Some(path) = &self.reference_tables {
            config = config.with_reference_tables(path);
        }
        Ok(config)
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
