use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use bids_core::{PipelineReport, StageOutcome};

pub fn print_report(report: &PipelineReport) {
    println!("Session: {}", report.session);
    println!("Output: {}", report.session_dir.display());
    if let Some(path) = &report.sourcedata_dir {
        println!("Sourcedata: {}", path.display());
    }
    println!("Workspace: {}", report.workspace.display());

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Status"),
        header_cell("Detail"),
    ]);
    apply_summary_table_style(&mut table);
    for (stage, outcome) in &report.stages {
        table.add_row(vec![
            Cell::new(stage.label()).add_attribute(Attribute::Bold),
            status_cell(outcome),
            Cell::new(outcome.detail()),
        ]);
    }
    println!("{table}");

    if !report.warnings.is_empty() {
        let mut warnings = Table::new();
        warnings.set_header(vec![header_cell("Warning")]);
        apply_table_style(&mut warnings);
        for warning in &report.warnings {
            warnings.add_row(vec![Cell::new(warning).fg(Color::Yellow)]);
        }
        println!("{warnings}");
    }
    println!(
        "Promoted {} files in {:.1}s",
        report.files_promoted,
        report.elapsed_ms() as f64 / 1000.0
    );
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

pub fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn status_cell(outcome: &StageOutcome) -> Cell {
    match outcome {
        StageOutcome::Completed(_) => Cell::new("done").fg(Color::Green),
        StageOutcome::Skipped(_) => Cell::new("skipped")
            .fg(Color::DarkGrey)
            .add_attribute(Attribute::Dim),
    }
}
