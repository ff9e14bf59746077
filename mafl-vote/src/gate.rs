//! Idempotency gate
//!
//! A strategy is skipped for a target when its final fused output already
//! exists. The check is coarse: a partially completed strategy (some resampled
//! labels present, no fused output) is planned again from scratch, and an
//! interrupted vote that left a truncated output must be removed by hand.

use crate::context::LABELS_FILE;
use std::path::Path;

/// Decides whether a strategy's output directory needs no further work
pub trait IdempotencyGate: Send + Sync {
    fn should_skip(&self, output_dir: &Path) -> bool;
}

/// Skips when `<output_dir>/labels.mnc` exists
#[derive(Debug, Clone, Default)]
pub struct FinalOutputGate;

impl FinalOutputGate {
    pub fn new() -> Self {
        Self
    }
}

impl IdempotencyGate for FinalOutputGate {
    fn should_skip(&self, output_dir: &Path) -> bool {
        output_dir.join(LABELS_FILE).exists()
    }
}
