//! mafl-vote library interface
//!
//! Plans and executes multi-atlas label fusion: for each target image, resample
//! every (atlas, template) label volume into target space and fuse the results
//! by voting, under one or more template-selection strategies.
//!
//! Exposes public APIs for integration testing.

pub mod cli;
pub mod command;
pub mod context;
pub mod error;
pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod planner;
pub mod scheduler;
pub mod strategy;
pub mod workspace;

pub use crate::error::{Result, VoteError};

use crate::cli::Settings;
use crate::context::{RunContext, RunLayout};
use crate::executor::{CommandExecutor, DryRunExecutor, ProcessExecutor};
use crate::gate::FinalOutputGate;
use crate::pipeline::{Pipeline, PipelineOptions, RunSummary};
use crate::scheduler::CommandScheduler;
use crate::workspace::TemplateLabelCache;
use mafl_common::scores::score_file_path;
use mafl_common::{ScoreTable, TemplateLibrary, TemplateRepository};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executor matching the settings: real subprocesses, or logging only for dry runs
pub fn executor_for(settings: &Settings) -> Arc<dyn CommandExecutor> {
    if settings.dry_run {
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(ProcessExecutor::new())
    }
}

/// Run the whole pipeline
///
/// Startup failures (discovery, score files, template label extraction) are
/// returned as errors before any target is processed. Per-target failures are
/// recorded in the returned [`RunSummary`].
pub async fn run(settings: &Settings, executor: Arc<dyn CommandExecutor>) -> Result<RunSummary> {
    // Step 1: Discover the template library
    let repository = TemplateRepository::new(settings.image_extension.as_str());
    let library = TemplateLibrary::load(&repository, &settings.input_dir)?;

    debug!(
        "ATLASES:\n\t{}",
        library
            .atlases
            .iter()
            .map(|i| i.image().display().to_string())
            .collect::<Vec<_>>()
            .join("\n\t")
    );
    debug!(
        "TEMPLATES:\n\t{}",
        library
            .templates
            .iter()
            .map(|i| i.image().display().to_string())
            .collect::<Vec<_>>()
            .join("\n\t")
    );
    info!(
        atlases = library.atlases.len(),
        templates = library.templates.len(),
        targets = library.targets.len(),
        "Template library loaded"
    );

    if library.targets.is_empty() {
        warn!(input = %settings.input_dir.display(), "No targets found, nothing to do");
    }

    // Step 2: Load score tables for the enabled top-N strategies
    let mut score_tables = Vec::new();
    for metric in settings.strategies.iter().filter_map(|s| s.metric()) {
        let path = score_file_path(&settings.output_dir, metric);
        info!(metric = %metric, path = %path.display(), "Loading scores");
        score_tables.push((metric, ScoreTable::load(&path)?));
    }

    // Step 3: Populate the shared template label cache before any planning
    let cache = TemplateLabelCache::prepare(
        &settings.template_labels,
        &settings.temp_root,
        executor.as_ref(),
        &settings.tools.extract,
    )
    .await?;

    let layout = RunLayout {
        registrations_dir: settings.registrations_dir.clone(),
        fusion_dir: settings.fusion_dir.clone(),
        template_labels_dir: cache.labels_dir(),
    };
    let ctx = score_tables.into_iter().fold(
        RunContext::new(library, layout, settings.tools.clone(), settings.invert),
        |ctx, (metric, table)| ctx.with_scores(metric, table),
    );

    // Step 4: Process targets
    let pipeline = Pipeline::new(
        Arc::new(ctx),
        CommandScheduler::new(executor, settings.concurrency),
        Box::new(FinalOutputGate::new()),
    );
    let options = PipelineOptions {
        strategies: settings.strategies.clone(),
        targets: settings.targets.clone(),
        temp_root: settings.temp_root.clone(),
        fail_fast: settings.fail_fast,
        dry_run: settings.dry_run,
    };
    let summary = pipeline.run(&options).await;

    if let Err(e) = cache.release() {
        warn!(error = %e, "Failed to remove template label cache");
    }

    Ok(summary)
}
