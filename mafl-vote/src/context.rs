//! Run context
//!
//! Everything planning needs for a run (library, score tables, directory
//! layout, tool names) is gathered once into an immutable [`RunContext`] and
//! passed explicitly to the planner and the pipeline.

use crate::error::{Result, VoteError};
use crate::strategy::FusionStrategy;
use mafl_common::{ScoreTable, SimilarityMetric, TemplateLibrary};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of every label volume the pipeline reads or writes
pub const LABELS_FILE: &str = "labels.mnc";

/// External tool names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub resample: String,
    pub vote: String,
    pub extract: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            resample: "mincresample".to_string(),
            vote: "voxel_vote.py".to_string(),
            extract: "tar".to_string(),
        }
    }
}

/// Directory layout shared by every target of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    /// `<registrations_dir>/<template>/<target>/nl.xfm`
    pub registrations_dir: PathBuf,
    /// `<fusion_dir>/<strategy>/<target>/labels.mnc`
    pub fusion_dir: PathBuf,
    /// `<template_labels_dir>/<atlas>/<template>/labels.mnc`
    pub template_labels_dir: PathBuf,
}

/// Immutable state for one pipeline run
#[derive(Debug, Clone)]
pub struct RunContext {
    library: TemplateLibrary,
    scores: BTreeMap<SimilarityMetric, ScoreTable>,
    layout: RunLayout,
    tools: Tools,
    invert: bool,
}

impl RunContext {
    pub fn new(library: TemplateLibrary, layout: RunLayout, tools: Tools, invert: bool) -> Self {
        Self {
            library,
            scores: BTreeMap::new(),
            layout,
            tools,
            invert,
        }
    }

    /// Attach the score table for `metric` (construction only)
    pub fn with_scores(mut self, metric: SimilarityMetric, table: ScoreTable) -> Self {
        self.scores.insert(metric, table);
        self
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    /// Whether resampling inverts the registration transform
    pub fn invert(&self) -> bool {
        self.invert
    }

    pub fn scores(&self, metric: SimilarityMetric) -> Result<&ScoreTable> {
        self.scores
            .get(&metric)
            .ok_or(VoteError::MissingScores(metric))
    }

    /// Output directory of `strategy` for `target`
    pub fn output_dir(&self, strategy: FusionStrategy, target: &str) -> PathBuf {
        self.layout
            .fusion_dir
            .join(strategy.dir_name())
            .join(target)
    }

    /// Final fused label volume of `strategy` for `target`
    pub fn final_output(&self, strategy: FusionStrategy, target: &str) -> PathBuf {
        self.output_dir(strategy, target).join(LABELS_FILE)
    }

    /// Non-linear transform from `template` to `target`
    pub fn transform(&self, template: &str, target: &str) -> PathBuf {
        self.layout
            .registrations_dir
            .join(template)
            .join(target)
            .join("nl.xfm")
    }

    /// Cached template-space labels of `atlas` through `template`
    pub fn template_labels(&self, atlas: &str, template: &str) -> PathBuf {
        self.layout
            .template_labels_dir
            .join(atlas)
            .join(template)
            .join(LABELS_FILE)
    }
}

/// Resampled label volume location inside a workspace labels directory
pub fn resampled_labels(labels_dir: &Path, atlas: &str, template: &str, target: &str) -> PathBuf {
    labels_dir
        .join(atlas)
        .join(template)
        .join(target)
        .join(LABELS_FILE)
}
