use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Child;

use crate::config::{effective_log_limit, JobSpec};
use crate::error::{EdaqError, Result};
use crate::logbuf::LogBuffer;
use crate::process::{GroupSignal, ProcessController};
use crate::progress::{ProgressMode, ProgressPatterns};
use crate::scheduler::tailer;

/// Lifecycle state of a job. Exactly one at a time.
///
/// `Starting` covers the generate pre-command: its two exits are
/// `Running` (generate succeeded, real command launched) and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Starting,
    Running,
    Paused,
    Success,
    Failed,
    Killed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failed | JobState::Killed | JobState::Canceled
        )
    }

    /// Counts against the concurrency cap.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Starting | JobState::Running)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobState::Queued => "queued",
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Success => "success",
            JobState::Failed => "failed",
            JobState::Killed => "killed",
            JobState::Canceled => "canceled",
        };
        write!(f, "{label}")
    }
}

/// One schedulable unit: a synthesis command plus its observable state.
#[derive(Debug)]
pub struct Job {
    pub id: usize,
    pub command: String,
    pub generate_command: Option<String>,
    pub directory: PathBuf,
    pub display_name: String,
    pub target: String,
    pub arch: String,
    pub status_file: PathBuf,
    pub progress_file: PathBuf,
    pub progress_mode: ProgressMode,
    pub state: JobState,
    /// Log history, shared with this job's stream reader tasks.
    pub log: Arc<Mutex<LogBuffer>>,
    /// First visible line of the log viewport.
    pub log_offset: usize,
    pub autoscroll: bool,
    /// Last displayed progress in percent.
    pub progress: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    run_started: Option<Instant>,
    paused_at: Option<Instant>,
    final_elapsed: Option<Duration>,
    pub(crate) child: Option<Child>,
    pub(crate) pgid: Option<i32>,
}

impl Job {
    pub fn from_spec(id: usize, spec: &JobSpec, default_log_limit: i64) -> Self {
        let limit = effective_log_limit(spec.log_size_limit.unwrap_or(default_log_limit));
        Self {
            id,
            command: spec.command.clone(),
            generate_command: spec.generate_command.clone(),
            directory: spec.directory.clone(),
            display_name: spec.display_name.clone(),
            target: spec.target.clone(),
            arch: spec.arch.clone(),
            status_file: spec.status_file.clone(),
            progress_file: spec.progress_file.clone(),
            progress_mode: spec.progress_mode,
            state: spec.initial_state.unwrap_or(JobState::Queued),
            log: Arc::new(Mutex::new(LogBuffer::new(limit))),
            log_offset: 0,
            autoscroll: true,
            progress: 0.0,
            started_at: None,
            stopped_at: None,
            run_started: None,
            paused_at: None,
            final_elapsed: None,
            child: None,
            pgid: None,
        }
    }

    /// Append a line to this job's own log history.
    pub fn log_line(&self, line: impl Into<String>) {
        if let Ok(mut log) = self.log.lock() {
            log.push(line);
        }
    }

    /// Begin execution: the generate pre-command when one is set
    /// (state `Starting`), otherwise the real command directly.
    pub(crate) fn start(&mut self, ctrl: &ProcessController) {
        match self.generate_command.clone() {
            Some(generate) => {
                self.log_line(format!("Run generate command for {}", self.display_name));
                self.log_line(format!(" > {generate}"));
                match self.launch(ctrl, &generate) {
                    Ok(()) => self.state = JobState::Starting,
                    Err(e) => self.fail_to_start("generate command", &e),
                }
            }
            None => self.run_main(ctrl),
        }
    }

    /// Launch the real command. Entered at admission (no generate step)
    /// or when the generate step exits successfully, in the same slot.
    pub(crate) fn run_main(&mut self, ctrl: &ProcessController) {
        self.log_line("Run job command");
        self.log_line(format!(" > {}", self.command));
        let command = self.command.clone();
        match self.launch(ctrl, &command) {
            Ok(()) => self.state = JobState::Running,
            Err(e) => self.fail_to_start("job command", &e),
        }
    }

    fn launch(&mut self, ctrl: &ProcessController, command: &str) -> std::io::Result<()> {
        let mut child = ctrl.spawn(command, &self.directory)?;
        self.pgid = child.id().map(|pid| pid as i32);
        tailer::attach(&mut child, Arc::clone(&self.log));
        self.child = Some(child);
        if self.run_started.is_none() {
            self.run_started = Some(Instant::now());
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    fn fail_to_start(&mut self, what: &str, e: &std::io::Error) {
        tracing::warn!(job_id = self.id, error = %e, "Failed to spawn {what}");
        self.log_line(format!("error: could not start {what}: {e}"));
        self.state = JobState::Failed;
    }

    /// SIGSTOP the whole group. Only valid from `Running`; freezes the
    /// elapsed clock. Signal failures land in the job log, not upward.
    pub(crate) fn pause(&mut self, ctrl: &ProcessController) -> Result<()> {
        if self.state != JobState::Running {
            return Err(self.invalid_state("pause"));
        }
        match self.pgid {
            Some(pgid) => match ctrl.signal_group(pgid, GroupSignal::Pause) {
                Ok(()) => {
                    self.paused_at = Some(Instant::now());
                    self.state = JobState::Paused;
                    self.log_line("Job paused");
                }
                Err(e) => self.log_line(format!("error: {e}")),
            },
            None => self.log_line("error: no process group to pause"),
        }
        Ok(())
    }

    /// SIGCONT the group and discount the paused interval from the
    /// elapsed clock.
    pub(crate) fn resume(&mut self, ctrl: &ProcessController) -> Result<()> {
        if self.state != JobState::Paused {
            return Err(self.invalid_state("resume"));
        }
        match self.pgid {
            Some(pgid) => match ctrl.signal_group(pgid, GroupSignal::Resume) {
                Ok(()) => {
                    if let (Some(run_started), Some(paused_at)) = (self.run_started, self.paused_at)
                    {
                        self.run_started = Some(run_started + paused_at.elapsed());
                    }
                    self.paused_at = None;
                    self.state = JobState::Running;
                    self.log_line("Job resumed");
                }
                Err(e) => self.log_line(format!("error: {e}")),
            },
            None => self.log_line("error: no process group to resume"),
        }
        Ok(())
    }

    /// Terminate signal to the whole group. The job is reaped and
    /// retired by the next tick, keeping the `Killed` state.
    pub(crate) fn kill(&mut self, ctrl: &ProcessController) -> Result<()> {
        if !matches!(
            self.state,
            JobState::Starting | JobState::Running | JobState::Paused
        ) {
            return Err(self.invalid_state("kill"));
        }
        if let Err(e) = ctrl.terminate(self.pgid, self.child.as_mut()) {
            self.log_line(format!("error: {e}"));
        }
        self.state = JobState::Killed;
        self.log_line("Job killed");
        Ok(())
    }

    /// Non-blocking exit check of the tracked process.
    pub(crate) fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Ok(None),
        }
    }

    /// Finalize bookkeeping on retirement: freeze the clock and drop
    /// the process handle.
    pub(crate) fn finish(&mut self, state: JobState) {
        self.state = state;
        self.final_elapsed = Some(self.elapsed());
        self.stopped_at = Some(Utc::now());
        self.child = None;
    }

    /// Take the child for external reaping (shutdown path).
    pub(crate) fn take_child(&mut self) -> Option<Child> {
        self.child.take()
    }

    /// Wall time spent running, excluding paused intervals.
    pub fn elapsed(&self) -> Duration {
        if let Some(elapsed) = self.final_elapsed {
            return elapsed;
        }
        match (self.run_started, self.paused_at) {
            (Some(run_started), Some(paused_at)) => {
                paused_at.saturating_duration_since(run_started)
            }
            (Some(run_started), None) => run_started.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Refresh the displayed progress: retired jobs keep their frozen
    /// value, active jobs poll their files, everything else shows 0.
    pub(crate) fn refresh_progress(&mut self, patterns: &ProgressPatterns) {
        if self.state.is_terminal() {
            return;
        }
        self.progress = if self.state.is_active() {
            patterns.progress(self.progress_mode, &self.status_file, &self.progress_file)
        } else {
            0.0
        };
    }

    pub fn log_len(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    fn invalid_state(&self, operation: &'static str) -> EdaqError {
        EdaqError::InvalidState {
            job: self.id,
            state: self.state.to_string(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &str) -> JobSpec {
        JobSpec {
            command: command.to_string(),
            generate_command: None,
            directory: PathBuf::from("/tmp"),
            display_name: "test_job".to_string(),
            target: "xc7a100t".to_string(),
            arch: "alu/32bits".to_string(),
            status_file: PathBuf::from("/tmp/status.log"),
            progress_file: PathBuf::from("/tmp/progress.log"),
            progress_mode: ProgressMode::FmaxSearch,
            log_size_limit: None,
            initial_state: None,
        }
    }

    #[test]
    fn new_job_is_queued_with_empty_history() {
        let job = Job::from_spec(3, &spec("true"), 200);
        assert_eq!(job.id, 3);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.log_len(), 0);
        assert_eq!(job.elapsed(), Duration::ZERO);
        assert!(job.autoscroll);
    }

    #[test]
    fn state_labels() {
        assert_eq!(JobState::Queued.to_string(), "queued");
        assert_eq!(JobState::Success.to_string(), "success");
        assert_eq!(JobState::Canceled.to_string(), "canceled");
    }

    #[test]
    fn terminal_and_active_partitions() {
        for state in [
            JobState::Success,
            JobState::Failed,
            JobState::Killed,
            JobState::Canceled,
        ] {
            assert!(state.is_terminal());
            assert!(!state.is_active());
        }
        assert!(JobState::Running.is_active());
        assert!(JobState::Starting.is_active());
        assert!(!JobState::Paused.is_active());
        assert!(!JobState::Queued.is_active());
    }

    #[test]
    fn elapsed_is_frozen_while_paused() {
        let mut job = Job::from_spec(0, &spec("true"), 200);
        let start = Instant::now() - Duration::from_secs(10);
        job.run_started = Some(start);
        job.paused_at = Some(start + Duration::from_secs(4));
        let frozen = job.elapsed();
        assert_eq!(frozen, Duration::from_secs(4));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(job.elapsed(), frozen);
    }

    #[test]
    fn finish_freezes_elapsed() {
        let mut job = Job::from_spec(0, &spec("true"), 200);
        job.run_started = Some(Instant::now() - Duration::from_secs(2));
        job.finish(JobState::Success);
        let first = job.elapsed();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(job.elapsed(), first);
        assert!(job.stopped_at.is_some());
        assert!(job.child.is_none());
    }

    #[test]
    fn refresh_progress_zeroes_inactive_states() {
        let patterns = ProgressPatterns::default();
        let mut job = Job::from_spec(0, &spec("true"), 200);
        job.progress = 42.0;
        job.refresh_progress(&patterns);
        assert_eq!(job.progress, 0.0);

        job.progress = 42.0;
        job.state = JobState::Success;
        job.refresh_progress(&patterns);
        assert_eq!(job.progress, 42.0);
    }

    #[test]
    fn pause_requires_running() {
        let ctrl = ProcessController;
        let mut job = Job::from_spec(0, &spec("true"), 200);
        assert!(job.pause(&ctrl).is_err());
        assert!(job.resume(&ctrl).is_err());
        assert!(job.kill(&ctrl).is_err());
        assert_eq!(job.state, JobState::Queued);
    }
}
