use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tracing::{debug, error, info, warn};

use bids_core::{Pipeline, PipelineError, PipelineReport, ScratchWorkspace, Toolchain};
use bids_model::Correction;
use bids_model::scanner::CORRECTION_TABLE;

use crate::cli::ConvertArgs;
use crate::summary::{apply_table_style, header_cell};

pub fn run_rules() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Scanner"), header_cell("Gradient tables")]);
    apply_table_style(&mut table);
    for (profile, correction) in CORRECTION_TABLE {
        table.add_row(vec![Cell::new(profile.label()), Cell::new(describe(correction))]);
    }
    println!("{table}");
    Ok(())
}

fn describe(correction: Correction) -> String {
    match correction {
        Correction::Replace(table) => format!(
            "replace with {} / {}",
            table.bval_file_name(),
            table.bvec_file_name()
        ),
        Correction::Keep => "keep converter output".to_string(),
        Correction::Reject => "halt before promotion".to_string(),
    }
}

pub fn run_convert(args: &ConvertArgs) -> Result<PipelineReport> {
    let config = args.pipeline_config().context("invalid invocation")?;
    if let Ok(json) = serde_json::to_string(&config) {
        debug!(config = %json, "pipeline configuration");
    }
    let workspace = ScratchWorkspace::create(&config.scratch_root)
        .context("create scratch workspace")?;
    info!(workspace = %workspace.root().display(), "scratch workspace ready");

    let tools = Toolchain::from_commands(&config.tools);
    let pipeline = Pipeline::new(config, tools);
    let result = pipeline.run(&workspace);

    if let Err(err) = &result {
        error!(category = err.category().label(), error = %err, "session halted");
    }
    if args.cleanup_scratch {
        if let Err(err) = workspace.release() {
            warn!(error = %err, "cannot remove scratch workspace");
        }
    } else if result.is_err() {
        info!(workspace = %workspace.root().display(), "workspace kept for inspection");
    }

    result.map_err(|err: PipelineError| {
        let category = err.category().label();
        anyhow::Error::new(err).context(format!("{category} error"))
    })
}
