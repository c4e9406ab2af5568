//! Progress notifications emitted on every collector state transition.

use std::fmt;
use tracing::info;

/// Collector state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Parsing,
    WaitingBackoff,
    TerminatedSuccess,
    TerminatedError,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminatedSuccess | Self::TerminatedError)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Parsing => "parsing",
            Self::WaitingBackoff => "waiting",
            Self::TerminatedSuccess => "done",
            Self::TerminatedError => "failed",
        };
        f.write_str(name)
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    /// Records collected so far.
    pub current: usize,
    /// Configured limit.
    pub total: usize,
    pub message: String,
}

/// Receives progress events. Must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn report(&self, progress: &Progress) {
        self(progress)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, p: &Progress) {
        info!("[{}] {}/{} {}", p.phase, p.current, p.total, p.message);
    }
}
