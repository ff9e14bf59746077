//! Fusion planning
//!
//! For one target and one strategy the planner:
//! 1. Selects the contributing templates (all of them, or the top N by score)
//! 2. Emits one resample command per (atlas, selected template) pair, atlas-major
//! 3. Emits one vote command consuming every resampled output in that order
//!
//! A strategy with no contributing (atlas, template) pair is rejected with
//! [`VoteError::EmptyPlan`] instead of planning a vote with no inputs.
//!
//! Planning is pure: it touches no files and always yields the same commands
//! in the same order for the same context, strategy and target.

use crate::command::{path_arg, CommandKey, PlannedCommand};
use crate::context::{resampled_labels, RunContext};
use crate::error::{Result, VoteError};
use crate::strategy::FusionStrategy;
use mafl_common::ImageEntity;
use std::path::{Path, PathBuf};

/// The commands one (target, strategy) pair needs
#[derive(Debug, Clone)]
pub struct FusionJob {
    target: String,
    strategy: FusionStrategy,
    output_dir: PathBuf,
    templates: Vec<String>,
    resamples: Vec<PlannedCommand>,
    vote: PlannedCommand,
}

impl FusionJob {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn strategy(&self) -> FusionStrategy {
        self.strategy
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Stems of the selected templates, in selection order
    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn resamples(&self) -> &[PlannedCommand] {
        &self.resamples
    }

    pub fn vote(&self) -> &PlannedCommand {
        &self.vote
    }
}

/// Builds [`FusionJob`]s from a [`RunContext`]
pub struct FusionPlanner<'a> {
    ctx: &'a RunContext,
}

impl<'a> FusionPlanner<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Templates contributing to `strategy` for `target`
    ///
    /// Top-N sorts by descending score with a stable sort, so equal scores keep
    /// library order; `n` at or above the template count selects everything.
    pub fn select_templates(
        &self,
        strategy: FusionStrategy,
        target: &ImageEntity,
    ) -> Result<Vec<&'a ImageEntity>> {
        let templates = &self.ctx.library().templates;

        match strategy {
            FusionStrategy::Majority => Ok(templates.iter().collect()),
            FusionStrategy::TopN { metric, n } => {
                let scores = self.ctx.scores(metric)?;
                let mut ranked: Vec<(&ImageEntity, f64)> = templates
                    .iter()
                    .map(|t| (t, scores.get(t.stem(), target.stem())))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked.truncate(n);

                tracing::debug!(
                    target = target.stem(),
                    metric = %metric,
                    selected = ?ranked.iter().map(|(t, s)| format!("{}={}", t.stem(), s)).collect::<Vec<_>>(),
                    "Top-{} templates selected",
                    n
                );

                Ok(ranked.into_iter().map(|(t, _)| t).collect())
            }
        }
    }

    /// Plan `strategy` for `target`, writing resampled labels under `labels_dir`
    pub fn plan(
        &self,
        strategy: FusionStrategy,
        target: &ImageEntity,
        labels_dir: &Path,
    ) -> Result<FusionJob> {
        let selected = self.select_templates(strategy, target)?;
        let atlases = &self.ctx.library().atlases;

        let mut resamples = Vec::with_capacity(atlases.len() * selected.len());
        for atlas in atlases {
            for template in &selected {
                resamples.push(self.resample_command(atlas, template, target, labels_dir));
            }
        }

        if resamples.is_empty() {
            return Err(VoteError::EmptyPlan {
                strategy,
                target: target.stem().to_string(),
            });
        }

        let output_dir = self.ctx.output_dir(strategy, target.stem());
        let vote = self.vote_command(strategy, target, &resamples);

        tracing::debug!(
            target = target.stem(),
            strategy = %strategy,
            atlases = atlases.len(),
            templates = selected.len(),
            resamples = resamples.len(),
            "Planned fusion job"
        );

        Ok(FusionJob {
            target: target.stem().to_string(),
            strategy,
            output_dir,
            templates: selected.iter().map(|t| t.stem().to_string()).collect(),
            resamples,
            vote,
        })
    }

    fn resample_command(
        &self,
        atlas: &ImageEntity,
        template: &ImageEntity,
        target: &ImageEntity,
        labels_dir: &Path,
    ) -> PlannedCommand {
        let invert = self.ctx.invert();
        let source = self.ctx.template_labels(atlas.stem(), template.stem());
        let output = resampled_labels(labels_dir, atlas.stem(), template.stem(), target.stem());

        let mut args: Vec<String> = ["-2", "-near", "-byte", "-keep", "-transform"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(path_arg(&self.ctx.transform(template.stem(), target.stem())));
        args.push("-like".to_string());
        args.push(path_arg(target.image()));
        if invert {
            args.push("-invert".to_string());
        }
        args.push(path_arg(&source));
        args.push(path_arg(&output));

        PlannedCommand::new(
            CommandKey::Resample {
                atlas: atlas.stem().to_string(),
                template: template.stem().to_string(),
                target: target.stem().to_string(),
                inverted: invert,
            },
            &self.ctx.tools().resample,
            args,
            output,
        )
    }

    fn vote_command(
        &self,
        strategy: FusionStrategy,
        target: &ImageEntity,
        resamples: &[PlannedCommand],
    ) -> PlannedCommand {
        let output = self.ctx.final_output(strategy, target.stem());
        let mut args: Vec<String> = resamples.iter().map(|c| path_arg(c.output())).collect();
        args.push(path_arg(&output));

        PlannedCommand::new(
            CommandKey::Vote {
                strategy: strategy.dir_name().to_string(),
                target: target.stem().to_string(),
            },
            &self.ctx.tools().vote,
            args,
            output,
        )
    }
}
