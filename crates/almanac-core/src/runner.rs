//! Autoplay: advancing a branch on a timer, under operator control.
//!
//! [`run_autoplay`] loops until the operator stops it or `max_turns` is
//! reached. Each turn runs on the blocking pool so a long rule pass never
//! stalls the async runtime. A busy branch (someone else is mutating it)
//! skips that beat; a durability failure ends the run with an error.
//!
//! A started turn always runs to completion: the stop flag is only checked
//! between turns.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use almanac_types::{BranchId, ErrorKind, TurnReport};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::operator::{AutoplayEndReason, AutoplayOperator};

/// Errors that end an autoplay run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The engine failed in a way autoplay cannot ride out.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// The blocking task running a turn panicked or was cancelled.
    #[error("turn task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Result of an autoplay run.
#[derive(Debug)]
pub struct AutoplayResult {
    /// Why the run ended.
    pub end_reason: AutoplayEndReason,
    /// Turns this run completed.
    pub total_turns: u64,
    /// The last completed turn, if any.
    pub final_report: Option<TurnReport>,
}

/// Advance `branch` until stopped.
pub async fn run_autoplay(
    engine: Arc<Engine>,
    branch: BranchId,
    operator: Arc<AutoplayOperator>,
) -> Result<AutoplayResult, RunnerError> {
    let mut total_turns: u64 = 0;
    let mut final_report = None;

    info!(
        branch = %branch,
        interval_ms = operator.interval_ms(),
        "autoplay starting"
    );

    loop {
        if operator.is_paused() {
            info!(branch = %branch, "autoplay paused");
            operator.wait_if_paused().await;
            info!(branch = %branch, "autoplay resumed");
        }

        if operator.is_stop_requested() {
            info!(branch = %branch, total_turns, "autoplay stopped by operator");
            return Ok(AutoplayResult {
                end_reason: AutoplayEndReason::OperatorStop,
                total_turns,
                final_report,
            });
        }
        if operator.turn_limit_reached() {
            info!(branch = %branch, total_turns, "autoplay turn limit reached");
            return Ok(AutoplayResult {
                end_reason: AutoplayEndReason::MaxTurnsReached,
                total_turns,
                final_report,
            });
        }

        let turn_engine = Arc::clone(&engine);
        let turn_branch = branch.clone();
        let outcome = tokio::task::spawn_blocking(move || turn_engine.advance_turn(&turn_branch)).await?;
        match outcome {
            Ok(report) => {
                total_turns = total_turns.saturating_add(1);
                operator.record_turn();
                final_report = Some(report);
            }
            Err(e) if e.kind() == ErrorKind::Concurrency => {
                warn!(branch = %branch, error = %e, "branch busy, skipping autoplay beat");
            }
            Err(e) => return Err(e.into()),
        }

        let interval = operator.interval_ms();
        if interval > 0 {
            tokio::time::sleep(Duration::from_millis(interval)).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::AutoplayConfig;
    use almanac_graph::GraphStore;
    use almanac_journal::{Journal, MemorySink};

    fn operator(max_turns: u64) -> Arc<AutoplayOperator> {
        Arc::new(AutoplayOperator::new(&AutoplayConfig {
            enabled: true,
            branch: None,
            interval_ms: 0,
            max_turns,
        }))
    }

    #[tokio::test]
    async fn bounded_by_max_turns() {
        let engine = Arc::new(Engine::in_memory());
        let result = run_autoplay(Arc::clone(&engine), BranchId::trunk(), operator(4))
            .await
            .unwrap();
        assert_eq!(result.end_reason, AutoplayEndReason::MaxTurnsReached);
        assert_eq!(result.total_turns, 4);
        assert_eq!(engine.frontier(&BranchId::trunk()).unwrap().turn, 4);
    }

    #[tokio::test]
    async fn operator_stop_before_first_turn() {
        let engine = Arc::new(Engine::in_memory());
        let op = operator(0);
        op.request_stop();
        let result = run_autoplay(engine, BranchId::trunk(), op).await.unwrap();
        assert_eq!(result.end_reason, AutoplayEndReason::OperatorStop);
        assert_eq!(result.total_turns, 0);
    }

    #[tokio::test]
    async fn durability_failure_ends_the_run() {
        // the first turn-start marker is the last entry the sink accepts
        let journal = Journal::create(BranchId::trunk(), Box::new(MemorySink::failing_after(1))).unwrap();
        let engine = Arc::new(Engine::new(GraphStore::new(journal)));
        let err = run_autoplay(Arc::clone(&engine), BranchId::trunk(), operator(0))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Engine { .. }));
        assert!(engine.is_halted());
    }
}
