//! Per-session conversion pipeline with explicit stages.
//!
//! The stages run strictly in order:
//! 1. **Extract**: stage acquisitions and unpack their archives
//! 2. **Convert**: scrub functional series, run the image converter
//! 3. **Diffusion**: vendor-conditional gradient-table correction
//! 4. **Ordering**: bounded multi-run order check-and-fix
//! 5. **Field maps**: scorer hand-off and artifact cleanup
//! 6. **Sanitize**: canonical JSON sidecars
//! 7. **Event logs**: canonical task event-log names in `sourcedata/`
//! 8. **Promote**: verified atomic copy into the output tree
//!
//! A fatal error in any stage returns immediately. Nothing is rolled back and
//! promotion never runs, so the output tree only ever receives fully processed
//! sessions. The scratch workspace is left for the caller to inspect or release.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};

use bids_model::Modality;

use crate::config::PipelineConfig;
use crate::convert::run_conversion;
use crate::dwi::correct_gradient_tables;
use crate::error::Result;
use crate::events::rename_event_logs;
use crate::extract::extract_archives;
use crate::fmap::select_field_maps;
use crate::ordering::validate_run_order;
use crate::promote::{PromotionSummary, promote_session};
use crate::sidecar::sanitize_tree;
use crate::tools::Toolchain;
use crate::workspace::ScratchWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Convert,
    Diffusion,
    Ordering,
    FieldMaps,
    Sanitize,
    EventLogs,
    Promote,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Self::Extract,
        Self::Convert,
        Self::Diffusion,
        Self::Ordering,
        Self::FieldMaps,
        Self::Sanitize,
        Self::EventLogs,
        Self::Promote,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Convert => "convert",
            Self::Diffusion => "diffusion",
            Self::Ordering => "ordering",
            Self::FieldMaps => "field maps",
            Self::Sanitize => "sanitize",
            Self::EventLogs => "event logs",
            Self::Promote => "promote",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StageOutcome {
    Completed(String),
    Skipped(String),
}

impl StageOutcome {
    pub fn detail(&self) -> &str {
        match self {
            Self::Completed(detail) | Self::Skipped(detail) => detail,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub session: String,
    pub workspace: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<(Stage, StageOutcome)>,
    /// Best-effort failures that did not stop the run.
    pub warnings: Vec<String>,
    pub session_dir: PathBuf,
    pub sourcedata_dir: Option<PathBuf>,
    pub files_promoted: usize,
}

impl PipelineReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, outcome)| outcome)
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// One invocation: configuration plus the collaborators it talks to.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    tools: Toolchain,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, tools: Toolchain) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage against `workspace`.
    pub fn run(&self, workspace: &ScratchWorkspace) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let session = &self.config.session;
        let span = info_span!(
            "session",
            subject = session.subject(),
            session = session.session()
        );
        let _guard = span.enter();
        info!(workspace = %workspace.root().display(), "starting conversion");

        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut warnings = Vec::new();

        // =====================================================================
        // Stage 1: Extract
        // =====================================================================
        let extracted = info_span!("stage", stage = Stage::Extract.label())
            .in_scope(|| extract_archives(&self.config.archive_root, session, workspace))?;
        stages.push((
            Stage::Extract,
            StageOutcome::Completed(format!(
                "{} acquisitions, {} archives, {} files",
                extracted.acquisitions.len(),
                extracted.archives_unpacked,
                extracted.files_copied
            )),
        ));

        // =====================================================================
        // Stage 2: Convert
        // =====================================================================
        let converted = info_span!("stage", stage = Stage::Convert.label()).in_scope(|| {
            run_conversion(
                session,
                workspace,
                &self.config.conversion_config,
                self.tools.converter.as_ref(),
                self.tools.scrubber.as_ref(),
            )
        })?;
        let modalities: Vec<&str> = converted.modalities.iter().map(|m| m.dir_name()).collect();
        stages.push((
            Stage::Convert,
            StageOutcome::Completed(format!("produced {}", modalities.join(", "))),
        ));

        // =====================================================================
        // Stage 3: Diffusion
        // =====================================================================
        let corrected = info_span!("stage", stage = Stage::Diffusion.label()).in_scope(|| {
            correct_gradient_tables(&self.config, workspace, self.tools.scanner.as_ref())
        })?;
        stages.push((
            Stage::Diffusion,
            match corrected {
                None => StageOutcome::Skipped("no dwi output".to_string()),
                Some(correction) => StageOutcome::Completed(match correction.replaced_with {
                    Some(table) => format!(
                        "{}: replaced {} runs with {}",
                        correction.profile,
                        correction.runs,
                        table.bval_file_name()
                    ),
                    None => format!("{}: kept {} runs", correction.profile, correction.runs),
                }),
            },
        ));

        // =====================================================================
        // Stage 4: Ordering
        // =====================================================================
        let attempts = info_span!("stage", stage = Stage::Ordering.label()).in_scope(|| {
            validate_run_order(session, workspace, self.tools.ordering.as_ref())
        })?;
        stages.push((
            Stage::Ordering,
            match attempts {
                None => StageOutcome::Skipped("no func output".to_string()),
                Some(attempts) => {
                    StageOutcome::Completed(format!("converged after {attempts} attempt(s)"))
                }
            },
        ));

        // =====================================================================
        // Stage 5: Field maps
        // =====================================================================
        let fmap_span = info_span!("stage", stage = Stage::FieldMaps.label());
        let fieldmaps = match self.config.resolved_toolkit() {
            Some(toolkit) => fmap_span
                .in_scope(|| {
                    select_field_maps(
                        session,
                        workspace,
                        &toolkit,
                        &self.config.output_root,
                        self.tools.fieldmaps.as_ref(),
                    )
                })?
                .map_or_else(
                    || StageOutcome::Skipped("no fmap output".to_string()),
                    |summary| {
                        warnings.extend(summary.warnings);
                        StageOutcome::Completed(format!(
                            "removed {} artifacts, pruned {} links",
                            summary.removed_artifacts, summary.pruned_links
                        ))
                    },
                ),
            None if !workspace
                .staged_session(session)
                .join(Modality::Fmap.dir_name())
                .is_dir() =>
            {
                StageOutcome::Skipped("no fmap output".to_string())
            }
            None => {
                let reason = "FSL and MRE directories unresolved".to_string();
                fmap_span.in_scope(|| warn!(%reason, "skipping field-map selection"));
                warnings.push(format!("field maps: {reason}"));
                StageOutcome::Skipped(reason)
            }
        };
        stages.push((Stage::FieldMaps, fieldmaps));

        // =====================================================================
        // Stage 6: Sanitize
        // =====================================================================
        let sanitized = info_span!("stage", stage = Stage::Sanitize.label())
            .in_scope(|| sanitize_tree(&workspace.staged_session(session)))?;
        stages.push((
            Stage::Sanitize,
            StageOutcome::Completed(format!(
                "{} sidecars, {} rewritten",
                sanitized.scanned, sanitized.rewritten
            )),
        ));

        // =====================================================================
        // Stage 7: Event logs
        // =====================================================================
        let renamed = info_span!("stage", stage = Stage::EventLogs.label())
            .in_scope(|| rename_event_logs(session, workspace))?;
        stages.push((
            Stage::EventLogs,
            if renamed.is_empty() {
                StageOutcome::Skipped("no event logs".to_string())
            } else {
                StageOutcome::Completed(format!("{} logs", renamed.len()))
            },
        ));

        // =====================================================================
        // Stage 8: Promote
        // =====================================================================
        let PromotionSummary {
            session_dir,
            sourcedata_dir,
            files_promoted,
            removed_gradient_files,
            warnings: promotion_warnings,
        } = info_span!("stage", stage = Stage::Promote.label())
            .in_scope(|| promote_session(session, workspace, &self.config.output_root))?;
        warnings.extend(promotion_warnings);
        stages.push((
            Stage::Promote,
            StageOutcome::Completed(format!(
                "{files_promoted} files, {removed_gradient_files} stray gradient files removed"
            )),
        ));

        let report = PipelineReport {
            session: session.to_string(),
            workspace: workspace.root().to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            stages,
            warnings,
            session_dir,
            sourcedata_dir,
            files_promoted,
        };
        info!(
            elapsed_ms = report.elapsed_ms(),
            warnings = report.warnings.len(),
            "conversion finished"
        );
        Ok(report)
    }
}
