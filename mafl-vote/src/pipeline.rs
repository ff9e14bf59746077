//! Per-target pipeline driver
//!
//! For each selected target:
//! 1. Gate every enabled strategy on its existing final output
//! 2. Acquire a workspace (only if some strategy remains)
//! 3. Plan one job per remaining strategy and schedule them together
//! 4. Release the workspace on every exit path
//!
//! Targets are independent. A failed target is recorded and the next one
//! proceeds unless `fail_fast` is set.

use crate::context::RunContext;
use crate::error::{CommandFailure, Result, VoteError};
use crate::gate::IdempotencyGate;
use crate::planner::FusionPlanner;
use crate::scheduler::{CommandScheduler, RunResult};
use crate::strategy::FusionStrategy;
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use mafl_common::ImageEntity;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Per-run options for [`Pipeline::run`]
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub strategies: Vec<FusionStrategy>,
    /// Target stems to restrict processing to; empty means all targets
    pub targets: Vec<String>,
    /// Parent directory for per-target workspaces
    pub temp_root: PathBuf,
    pub fail_fast: bool,
    pub dry_run: bool,
}

/// Outcome of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// Every pending strategy was executed
    Completed,
    /// Every strategy already had its output
    Skipped,
    Failed,
}

/// What happened to one target
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub status: TargetStatus,
    /// Strategies skipped because their output already existed
    pub skipped: Vec<String>,
    /// Strategies planned and scheduled
    pub executed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CommandFailure>,
}

impl TargetReport {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            status: TargetStatus::Skipped,
            skipped: Vec::new(),
            executed: Vec::new(),
            result: None,
            error: None,
            failures: Vec::new(),
        }
    }
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub targets: Vec<TargetReport>,
    /// Requested target stems that were not found
    pub missing_targets: Vec<String>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.count(TargetStatus::Failed)
    }

    pub fn completed(&self) -> usize {
        self.count(TargetStatus::Completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TargetStatus::Skipped)
    }

    /// True when no target failed (all-skipped counts as success)
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Total commands executed across all targets
    pub fn commands_executed(&self) -> usize {
        self.targets
            .iter()
            .filter_map(|t| t.result)
            .map(|r| r.resamples + r.votes)
            .sum()
    }

    fn count(&self, status: TargetStatus) -> usize {
        self.targets.iter().filter(|t| t.status == status).count()
    }

    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VoteError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Drives gate → plan → schedule for each target
pub struct Pipeline {
    ctx: Arc<RunContext>,
    scheduler: CommandScheduler,
    gate: Box<dyn IdempotencyGate>,
}

impl Pipeline {
    pub fn new(
        ctx: Arc<RunContext>,
        scheduler: CommandScheduler,
        gate: Box<dyn IdempotencyGate>,
    ) -> Self {
        Self {
            ctx,
            scheduler,
            gate,
        }
    }

    /// Targets to process in library order, plus requested stems not found
    pub fn select_targets(&self, stems: &[String]) -> (Vec<&ImageEntity>, Vec<String>) {
        let targets = &self.ctx.library().targets;
        if stems.is_empty() {
            return (targets.iter().collect(), Vec::new());
        }

        let selected = targets
            .iter()
            .filter(|t| stems.iter().any(|s| s == t.stem()))
            .collect();
        let missing = stems
            .iter()
            .filter(|s| !targets.iter().any(|t| t.stem() == s.as_str()))
            .cloned()
            .collect();

        (selected, missing)
    }

    /// Process every selected target
    pub async fn run(&self, options: &PipelineOptions) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let (targets, missing_targets) = self.select_targets(&options.targets);

        for stem in &missing_targets {
            tracing::warn!(run_id = %run_id, target = %stem, "Requested target not found");
        }

        tracing::info!(
            run_id = %run_id,
            targets = targets.len(),
            strategies = ?options.strategies.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            concurrency = self.scheduler.concurrency(),
            dry_run = options.dry_run,
            "Starting fusion run"
        );

        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            tracing::debug!("Generating commands for target: {}", target.image().display());

            let report = self
                .run_target(target, &options.strategies, &options.temp_root)
                .await;
            let failed = report.status == TargetStatus::Failed;
            reports.push(report);

            if failed && options.fail_fast {
                tracing::warn!(run_id = %run_id, "Stopping after first failed target (fail-fast)");
                break;
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: options.dry_run,
            targets: reports,
            missing_targets,
        };

        tracing::info!(
            run_id = %run_id,
            completed = summary.completed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            commands = summary.commands_executed(),
            "Fusion run finished"
        );

        summary
    }

    /// Gate, plan and execute all `strategies` for one target
    pub async fn run_target(
        &self,
        target: &ImageEntity,
        strategies: &[FusionStrategy],
        temp_root: &Path,
    ) -> TargetReport {
        let stem = target.stem();
        let mut report = TargetReport::new(stem);
        let mut pending = Vec::new();

        for strategy in strategies {
            let output_dir = self.ctx.output_dir(*strategy, stem);
            if self.gate.should_skip(&output_dir) {
                tracing::info!(
                    target = stem,
                    strategy = %strategy,
                    output = %output_dir.display(),
                    "Output exists, skipping strategy"
                );
                report.skipped.push(strategy.to_string());
            } else {
                pending.push(*strategy);
            }
        }

        if pending.is_empty() {
            return report;
        }
        report.executed = pending.iter().map(|s| s.to_string()).collect();

        match self.execute(target, &pending, temp_root).await {
            Ok(result) => {
                tracing::info!(
                    target = stem,
                    resamples = result.resamples,
                    votes = result.votes,
                    "✓ Target complete"
                );
                report.status = TargetStatus::Completed;
                report.result = Some(result);
            }
            Err(e) => {
                tracing::error!(target = stem, error = %e, "Target failed");
                report.status = TargetStatus::Failed;
                report.failures = e.failures().to_vec();
                report.error = Some(e.to_string());
            }
        }

        report
    }

    async fn execute(
        &self,
        target: &ImageEntity,
        strategies: &[FusionStrategy],
        temp_root: &Path,
    ) -> Result<RunResult> {
        let workspace = Workspace::acquire(temp_root)?;

        let outcome = self
            .plan_and_schedule(target, strategies, workspace.labels_dir())
            .await;

        tracing::debug!(target = target.stem(), "Cleaning up...");
        if let Err(e) = workspace.release() {
            tracing::warn!(target = target.stem(), error = %e, "Workspace cleanup failed");
        }

        outcome
    }

    async fn plan_and_schedule(
        &self,
        target: &ImageEntity,
        strategies: &[FusionStrategy],
        labels_dir: &Path,
    ) -> Result<RunResult> {
        let planner = FusionPlanner::new(&self.ctx);
        let jobs = strategies
            .iter()
            .map(|strategy| planner.plan(*strategy, target, labels_dir))
            .collect::<Result<Vec<_>>>()?;

        self.scheduler.run(&jobs).await
    }
}
