//! Two-phase command scheduler
//!
//! # Architecture
//! - **Phase 1 (resample)**: union of every job's resample commands,
//!   deduplicated by [`CommandKey`](crate::command::CommandKey)
//! - **Barrier**: phase 2 starts only after every phase 1 command has exited
//! - **Phase 2 (vote)**: one vote command per job, deduplicated the same way
//!
//! Both phases run through the same bounded pool of `concurrency` in-flight
//! commands (`futures::stream::buffer_unordered`). Within a phase commands are
//! unordered.
//!
//! # Error Handling
//! - A failed command does not cancel its siblings; the phase drains first
//! - Every failure of the phase is reported together in
//!   [`VoteError::BatchFailed`]
//! - A failed phase prevents the next phase from starting

use crate::command::{dedup, PlannedCommand};
use crate::error::{CommandFailure, Phase, Result, VoteError};
use crate::executor::CommandExecutor;
use crate::planner::FusionJob;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// Default number of concurrent commands
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Counts from a completed two-phase run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Unique resample commands executed
    pub resamples: usize,
    /// Unique vote commands executed
    pub votes: usize,
    /// Resample commands dropped as duplicates of another job's
    pub duplicates: usize,
}

/// Executes fusion jobs in a resample phase followed by a vote phase
#[derive(Clone)]
pub struct CommandScheduler {
    executor: Arc<dyn CommandExecutor>,
    concurrency: usize,
}

impl CommandScheduler {
    /// Create a scheduler; a concurrency of 0 is treated as 1
    pub fn new(executor: Arc<dyn CommandExecutor>, concurrency: usize) -> Self {
        Self {
            executor,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run all resamples of `jobs`, then all their votes
    pub async fn run(&self, jobs: &[FusionJob]) -> Result<RunResult> {
        let (resamples, duplicates) =
            dedup(jobs.iter().flat_map(|job| job.resamples().iter().cloned()));
        let (votes, _) = dedup(jobs.iter().map(|job| job.vote().clone()));

        tracing::info!(
            jobs = jobs.len(),
            resamples = resamples.len(),
            duplicates,
            "Resampling labels ..."
        );
        let resamples = self.run_phase(Phase::Resample, resamples).await?;

        tracing::info!(votes = votes.len(), "Voting...");
        let votes = self.run_phase(Phase::Vote, votes).await?;

        Ok(RunResult {
            resamples,
            votes,
            duplicates,
        })
    }

    /// Run one phase to completion and report every failure
    ///
    /// Returns the number of commands executed.
    pub async fn run_phase(&self, phase: Phase, commands: Vec<PlannedCommand>) -> Result<usize> {
        let total = commands.len();

        let outcomes: Vec<Option<CommandFailure>> = stream::iter(commands)
            .map(|command| {
                let executor = Arc::clone(&self.executor);
                async move {
                    match executor.execute(&command).await {
                        Ok(()) => None,
                        Err(failure) => {
                            tracing::error!(
                                phase = %phase,
                                command = %failure.invocation,
                                reason = %failure.reason,
                                "Command failed"
                            );
                            Some(failure)
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut failures: Vec<CommandFailure> = outcomes.into_iter().flatten().collect();
        if !failures.is_empty() {
            failures.sort_by(|a, b| a.invocation.cmp(&b.invocation));
            return Err(VoteError::BatchFailed {
                phase,
                total,
                failures,
            });
        }

        tracing::debug!(phase = %phase, commands = total, "Phase complete");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKey;
    use crate::error::FailureReason;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records start/end events, tracks peak concurrency, fails chosen programs
    #[derive(Default)]
    struct RecordingExecutor {
        events: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        failing: HashSet<String>,
    }

    impl RecordingExecutor {
        fn failing(invocations: &[&str]) -> Self {
            Self {
                failing: invocations.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn started(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("start ").map(str::to_string))
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute(&self, command: &PlannedCommand) -> std::result::Result<(), CommandFailure> {
            let invocation = command.invocation();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("start {}", invocation));

            tokio::time::sleep(Duration::from_millis(5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("end {}", invocation));

            if self.failing.contains(&invocation) {
                return Err(CommandFailure {
                    invocation,
                    reason: FailureReason::Exit {
                        code: Some(1),
                        stderr: String::new(),
                    },
                });
            }
            Ok(())
        }
    }

    fn resample(atlas: &str, template: &str, target: &str) -> PlannedCommand {
        PlannedCommand::new(
            CommandKey::Resample {
                atlas: atlas.to_string(),
                template: template.to_string(),
                target: target.to_string(),
                inverted: false,
            },
            "resample",
            vec![format!("{}/{}/{}", atlas, template, target)],
            format!("/ws/{}/{}/{}/labels.mnc", atlas, template, target),
        )
    }

    fn vote(strategy: &str, target: &str) -> PlannedCommand {
        PlannedCommand::new(
            CommandKey::Vote {
                strategy: strategy.to_string(),
                target: target.to_string(),
            },
            "vote",
            vec![format!("{}/{}", strategy, target)],
            format!("/out/{}/{}/labels.mnc", strategy, target),
        )
    }

    fn scheduler(executor: &Arc<RecordingExecutor>, concurrency: usize) -> CommandScheduler {
        let executor: Arc<dyn CommandExecutor> = executor.clone();
        CommandScheduler::new(executor, concurrency)
    }

    #[tokio::test]
    async fn test_run_phase_executes_all() {
        let executor = Arc::new(RecordingExecutor::default());
        let commands = vec![resample("A1", "T1", "X"), resample("A1", "T2", "X")];

        let count = scheduler(&executor, 4)
            .run_phase(Phase::Resample, commands)
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(executor.started().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let executor = Arc::new(RecordingExecutor::default());
        let commands: Vec<_> = (0..12)
            .map(|i| resample("A1", &format!("T{}", i), "X"))
            .collect();

        scheduler(&executor, 3)
            .run_phase(Phase::Resample, commands)
            .await
            .unwrap();

        let peak = executor.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded 3", peak);
        assert!(peak > 1, "commands never overlapped");
    }

    #[tokio::test]
    async fn test_zero_concurrency_runs_serially() {
        let executor = Arc::new(RecordingExecutor::default());
        let scheduler = scheduler(&executor, 0);
        assert_eq!(scheduler.concurrency(), 1);

        scheduler
            .run_phase(Phase::Vote, vec![vote("majvote", "X"), vote("xcorr", "X")])
            .await
            .unwrap();

        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_drains_siblings_and_reports_all() {
        let executor = Arc::new(RecordingExecutor::failing(&["resample A1/T1/X", "resample A1/T3/X"]));
        let commands: Vec<_> = ["T1", "T2", "T3", "T4"]
            .iter()
            .map(|t| resample("A1", t, "X"))
            .collect();

        let err = scheduler(&executor, 2)
            .run_phase(Phase::Resample, commands)
            .await
            .unwrap_err();

        assert_eq!(executor.started().len(), 4);
        match err {
            VoteError::BatchFailed {
                phase,
                total,
                failures,
            } => {
                assert_eq!(phase, Phase::Resample);
                assert_eq!(total, 4);
                let failed: Vec<&str> = failures.iter().map(|f| f.invocation.as_str()).collect();
                assert_eq!(failed, vec!["resample A1/T1/X", "resample A1/T3/X"]);
            }
            other => panic!("expected BatchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_phase_succeeds() {
        let executor = Arc::new(RecordingExecutor::default());

        let count = scheduler(&executor, 8)
            .run_phase(Phase::Resample, Vec::new())
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(executor.events().is_empty());
    }

    #[tokio::test]
    async fn test_dedup_across_phases_input() {
        let executor = Arc::new(RecordingExecutor::default());
        let scheduler = scheduler(&executor, 2);

        let (unique, removed) = dedup(vec![
            resample("A1", "T1", "X"),
            resample("A1", "T2", "X"),
            resample("A1", "T1", "X"),
        ]);
        let count = scheduler.run_phase(Phase::Resample, unique).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(removed, 1);
    }
}
