//! Typed control commands.
//!
//! Every mutation requested from outside the tick owner (dashboard
//! input, REST handlers, WebSocket messages) is one of these variants,
//! pushed onto a single-consumer channel and applied at the top of the
//! next tick. No other thread ever touches scheduler state directly.

/// A control request, keyed by job id where applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move the shared selection point.
    Select { job: usize },
    /// Pause a running job (SIGSTOP to its group).
    Pause { job: usize },
    /// Dequeue-then-start a queued job, or resume a paused one.
    Start { job: usize },
    /// Kill a live job's process group, or cancel a queued job.
    Kill { job: usize },
    /// Open the job's working directory in the file manager.
    OpenPath { job: usize },
    /// Cycle the progress-bar glyph theme.
    ThemeNext,
    /// Scroll a job's log viewport by `delta` lines.
    LogsScroll { job: usize, delta: i64 },
    /// Jump a job's log viewport to the first line.
    LogsHome { job: usize },
    /// Jump a job's log viewport to the last line and re-enable autoscroll.
    LogsEnd { job: usize },
    /// Resize the log pane (rows).
    SetLogsHeight { height: u16 },
    /// Request the run loop to stop.
    Shutdown,
}
