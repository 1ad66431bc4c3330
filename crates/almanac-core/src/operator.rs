//! Operator control state for the autoplay runner.
//!
//! Shared between the runner task and the boundary handlers. All control
//! fields are atomics so the runner never takes a lock to check them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;

use crate::config::AutoplayConfig;

/// Shortest interval the operator may set between autoplay turns.
pub const MIN_INTERVAL_MS: u64 = 10;

/// Why an autoplay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayEndReason {
    /// Reached the configured `max_turns`.
    MaxTurnsReached,
    /// An operator issued a stop.
    OperatorStop,
}

/// Shared autoplay control state.
#[derive(Debug)]
pub struct AutoplayOperator {
    paused: AtomicBool,
    resume_notify: Notify,
    stop_requested: AtomicBool,
    interval_ms: AtomicU64,
    turns_run: AtomicU64,
    max_turns: u64,
    started_at: DateTime<Utc>,
}

impl AutoplayOperator {
    /// Control state from configuration.
    pub fn new(config: &AutoplayConfig) -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            interval_ms: AtomicU64::new(config.interval_ms),
            turns_run: AtomicU64::new(0),
            max_turns: config.max_turns,
            started_at: Utc::now(),
        }
    }

    /// Whether the runner is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause after the turn in progress.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume and wake the runner.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Wait until not paused.
    pub async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::Acquire) {
            self.resume_notify.notified().await;
        }
    }

    /// Request a clean stop. Also wakes a paused runner so it can exit.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Milliseconds between turns.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Acquire)
    }

    /// Change the interval. Returns the previous one, or `None` if `ms` is
    /// below [`MIN_INTERVAL_MS`].
    pub fn set_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_INTERVAL_MS {
            return None;
        }
        Some(self.interval_ms.swap(ms, Ordering::AcqRel))
    }

    /// Turns completed so far.
    pub fn turns_run(&self) -> u64 {
        self.turns_run.load(Ordering::Acquire)
    }

    pub(crate) fn record_turn(&self) -> u64 {
        self.turns_run
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    /// Whether `max_turns` has been reached (0 = unlimited).
    pub fn turn_limit_reached(&self) -> bool {
        self.max_turns > 0 && self.turns_run() >= self.max_turns
    }

    /// Snapshot for the boundary.
    pub fn status(&self) -> AutoplayStatus {
        AutoplayStatus {
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            interval_ms: self.interval_ms(),
            turns_run: self.turns_run(),
            max_turns: self.max_turns,
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

/// JSON-serializable autoplay status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoplayStatus {
    /// Whether the runner is paused.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Milliseconds between turns.
    pub interval_ms: u64,
    /// Turns completed.
    pub turns_run: u64,
    /// Configured limit (0 = unlimited).
    pub max_turns: u64,
    /// RFC 3339 start time.
    pub started_at: String,
}
