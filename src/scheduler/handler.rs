//! Scheduler core: job list, running set, FIFO wait queue and the
//! single state-transition tick.
//!
//! Exactly one loop owns the tick at a time (the dashboard or the
//! headless loop). Everything else, REST handlers and WebSocket
//! messages and keyboard input alike, only enqueues [`Command`]s or
//! takes read-locked snapshots, so there is never more than one writer.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{JobSpec, SchedulerConfig};
use crate::error::{EdaqError, Result};
use crate::job::{Job, JobState};
use crate::process::ProcessController;
use crate::snapshot::{HandlerStatus, JobSnapshot, LogSlice, Snapshot};
use crate::theme::Theme;

use super::command::Command;

const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Shared handle to the scheduler. Cloning is cheap; all clones address
/// the same state and command channel.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<RwLock<SchedulerState>>,
    tx: mpsc::Sender<Command>,
}

struct SchedulerState {
    jobs: Vec<Job>,
    /// Admitted, not yet retired jobs; its length bounds concurrency.
    running: Vec<usize>,
    queue: VecDeque<usize>,
    retired: Vec<usize>,
    selected: usize,
    theme: Theme,
    logs_height: u16,
    stop_requested: bool,
    commands: mpsc::Receiver<Command>,
    controller: ProcessController,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(specs: &[JobSpec], config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let jobs = specs
            .iter()
            .enumerate()
            .map(|(id, spec)| Job::from_spec(id, spec, config.log_size_limit))
            .collect();
        let state = SchedulerState {
            jobs,
            running: Vec::new(),
            queue: VecDeque::new(),
            retired: Vec::new(),
            selected: 0,
            theme: Theme::default(),
            logs_height: 20,
            stop_requested: false,
            commands: rx,
            controller: ProcessController,
            config,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            tx,
        }
    }

    /// A sender for the command channel, handed to front-ends.
    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.tx.clone()
    }

    /// Enqueue a control command for the next tick.
    pub async fn send(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            tracing::warn!("Command channel closed, command dropped");
        }
    }

    /// Admit jobs in list order: the first `nb_slots` start immediately,
    /// the rest wait in FIFO order. Jobs seeded in a non-queued state
    /// retire untouched.
    pub async fn launch_initial(&self) {
        let mut st = self.state.write().await;
        for id in 0..st.jobs.len() {
            if st.jobs[id].state == JobState::Queued {
                st.queue.push_back(id);
            } else {
                let state = st.jobs[id].state;
                st.jobs[id].finish(state);
                st.retired.push(id);
            }
        }
        st.fill_slots();
    }

    /// One pass of the update logic: apply pending commands, refresh
    /// progress, detect completions, promote queued work, follow logs.
    pub async fn tick(&self) {
        let mut st = self.state.write().await;
        st.drain_commands();
        st.refresh_progress();
        st.detect_completions();
        st.follow_logs();
    }

    /// All jobs reached a terminal state.
    pub async fn finished(&self) -> bool {
        let st = self.state.read().await;
        st.retired.len() == st.jobs.len()
    }

    pub async fn stop_requested(&self) -> bool {
        self.state.read().await.stop_requested
    }

    pub async fn auto_exit(&self) -> bool {
        self.state.read().await.config.auto_exit
    }

    /// Terminate every live job's process group and reap the children.
    pub async fn terminate_all(&self) {
        let children = {
            let mut st = self.state.write().await;
            let ctrl = st.controller;
            let mut children = Vec::new();
            for id in std::mem::take(&mut st.running) {
                let job = &mut st.jobs[id];
                if let Err(e) = ctrl.terminate(job.pgid, job.child.as_mut()) {
                    job.log_line(format!("error: {e}"));
                }
                if let Some(child) = job.take_child() {
                    children.push(child);
                }
                job.finish(JobState::Killed);
                st.retired.push(id);
            }
            children
        };
        for mut child in children {
            let _ = child.wait().await;
        }
    }

    /// Run the tick on a fixed interval with no terminal attached.
    /// Resolves to `true` when every job ended in a terminal state.
    pub fn start_headless(&self, cancel: CancellationToken) -> JoinHandle<bool> {
        let sched = self.clone();
        tokio::spawn(async move {
            let (tick_interval, auto_exit) = {
                let st = sched.state.read().await;
                (st.config.tick_interval, st.config.auto_exit)
            };
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let all_done = sched.finished().await;
                        sched.terminate_all().await;
                        return all_done;
                    }
                    _ = ticker.tick() => {
                        sched.tick().await;
                        if sched.stop_requested().await {
                            let all_done = sched.finished().await;
                            sched.terminate_all().await;
                            return all_done;
                        }
                        if auto_exit && sched.finished().await {
                            return true;
                        }
                    }
                }
            }
        })
    }

    /// Lock-protected snapshot for remote consumers. `logs_job` selects
    /// an optional windowed slice of one job's history.
    pub async fn snapshot(
        &self,
        logs_job: Option<usize>,
        logs_offset: Option<usize>,
        logs_limit: Option<usize>,
    ) -> Snapshot {
        let st = self.state.read().await;
        let jobs = st
            .jobs
            .iter()
            .map(|job| JobSnapshot {
                id: job.id,
                display_name: job.display_name.clone(),
                status: job.state,
                progress: job.progress,
                elapsed_time: job.elapsed().as_secs_f64(),
                directory: job.directory.display().to_string(),
                target: job.target.clone(),
                arch: job.arch.clone(),
            })
            .collect();

        let logs = logs_job.and_then(|id| {
            let job = st.jobs.get(id)?;
            let log = job.log.lock().ok()?;
            let total_lines = log.len();
            let limit = logs_limit.unwrap_or(100);
            let offset = logs_offset.unwrap_or_else(|| total_lines.saturating_sub(limit));
            Some(LogSlice {
                job_id: id,
                total_lines,
                offset,
                limit,
                lines: log.window(offset, limit),
            })
        });

        Snapshot {
            handler: HandlerStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                nb_jobs: st.config.nb_slots,
                selected_job_index: st.selected,
                job_count: st.jobs.len(),
                running: st.running.len(),
                queued: st.queue.len(),
                retired: st.retired.len(),
                theme: st.theme.name().to_string(),
            },
            jobs,
            logs,
        }
    }

    /// View of the selected job's log window for the dashboard.
    pub async fn selected_log_view(&self) -> (usize, Vec<String>) {
        let st = self.state.read().await;
        let Some(job) = st.jobs.get(st.selected) else {
            return (0, Vec::new());
        };
        let view = match job.log.lock() {
            Ok(log) => (
                job.log_offset,
                log.window(job.log_offset, st.logs_height as usize),
            ),
            Err(_) => (0, Vec::new()),
        };
        view
    }

    pub async fn logs_height(&self) -> u16 {
        self.state.read().await.logs_height
    }

    pub async fn theme(&self) -> Theme {
        self.state.read().await.theme
    }
}

impl SchedulerState {
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            tracing::debug!(?command, "Applying command");
            if let Err(e) = self.apply(command) {
                tracing::warn!(error = %e, "Command failed");
                if let Some(job) = self.jobs.get(self.selected) {
                    job.log_line(format!("error: {e}"));
                }
            }
        }
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        let ctrl = self.controller;
        match command {
            Command::Select { job } => {
                self.check_job(job)?;
                self.selected = job;
                self.scroll_to_end(job);
            }
            Command::Pause { job } => {
                self.check_job(job)?;
                // Repeats are no-ops; anything else is a guard violation.
                if self.jobs[job].state != JobState::Paused {
                    self.jobs[job].pause(&ctrl)?;
                }
            }
            Command::Start { job } => {
                self.check_job(job)?;
                match self.jobs[job].state {
                    JobState::Queued => self.start_queued(job),
                    JobState::Paused => self.jobs[job].resume(&ctrl)?,
                    JobState::Running | JobState::Starting => {}
                    state => {
                        return Err(EdaqError::InvalidState {
                            job,
                            state: state.to_string(),
                            operation: "start",
                        })
                    }
                }
            }
            Command::Kill { job } => {
                self.check_job(job)?;
                match self.jobs[job].state {
                    JobState::Queued => self.cancel_queued(job),
                    state if state.is_terminal() => {}
                    _ => self.jobs[job].kill(&ctrl)?,
                }
            }
            Command::OpenPath { job } => {
                self.check_job(job)?;
                let directory = self.jobs[job].directory.clone();
                if let Err(e) = ctrl.open_path(&directory) {
                    self.jobs[job].log_line(format!("error: could not open {}: {e}", directory.display()));
                }
            }
            Command::ThemeNext => self.theme = self.theme.next(),
            Command::LogsScroll { job, delta } => {
                self.check_job(job)?;
                let bottom = self.viewport_bottom(job);
                let j = &mut self.jobs[job];
                j.log_offset = if delta < 0 {
                    j.log_offset.saturating_sub(delta.unsigned_abs() as usize)
                } else {
                    (j.log_offset + delta as usize).min(bottom)
                };
                j.autoscroll = false;
            }
            Command::LogsHome { job } => {
                self.check_job(job)?;
                self.jobs[job].log_offset = 0;
                self.jobs[job].autoscroll = false;
            }
            Command::LogsEnd { job } => {
                self.check_job(job)?;
                self.scroll_to_end(job);
            }
            Command::SetLogsHeight { height } => {
                self.logs_height = height.max(1);
            }
            Command::Shutdown => self.stop_requested = true,
        }
        Ok(())
    }

    fn check_job(&self, job: usize) -> Result<()> {
        if job < self.jobs.len() {
            Ok(())
        } else {
            Err(EdaqError::JobNotFound(job))
        }
    }

    fn viewport_bottom(&self, job: usize) -> usize {
        self.jobs[job]
            .log_len()
            .saturating_sub(self.logs_height as usize)
    }

    fn scroll_to_end(&mut self, job: usize) {
        let bottom = self.viewport_bottom(job);
        self.jobs[job].log_offset = bottom;
        self.jobs[job].autoscroll = true;
    }

    /// A user-requested start pulls the job out of the queue; with no
    /// free slot it moves to the queue head instead.
    fn start_queued(&mut self, job: usize) {
        self.queue.retain(|&id| id != job);
        if self.running.len() < self.config.nb_slots {
            self.admit(job);
        } else {
            self.jobs[job].log_line("Waiting for a free slot");
            self.queue.push_front(job);
        }
    }

    /// Canceling a queued job is pure bookkeeping: no process existed.
    fn cancel_queued(&mut self, job: usize) {
        self.queue.retain(|&id| id != job);
        self.jobs[job].log_line("Job canceled");
        self.jobs[job].finish(JobState::Canceled);
        self.retired.push(job);
    }

    fn refresh_progress(&mut self) {
        let patterns = self.config.patterns.clone();
        for job in &mut self.jobs {
            job.refresh_progress(&patterns);
        }
    }

    /// Reap exited processes, classify exit codes, relaunch two-phase
    /// jobs, and keep every freed slot busy while work is queued.
    fn detect_completions(&mut self) {
        let ctrl = self.controller;
        let mut i = 0;
        while i < self.running.len() {
            let id = self.running[i];
            match self.jobs[id].try_wait() {
                Ok(Some(exit)) => {
                    let was_starting = self.jobs[id].state == JobState::Starting;
                    if was_starting && exit.success() {
                        // Generate step done: real command takes the same slot.
                        self.jobs[id].log_line("");
                        self.jobs[id].run_main(&ctrl);
                        if self.jobs[id].state == JobState::Failed {
                            self.retire_at(i);
                        } else {
                            i += 1;
                        }
                        continue;
                    }
                    let job = &mut self.jobs[id];
                    let final_state = match job.state {
                        JobState::Killed => JobState::Killed,
                        JobState::Starting => {
                            job.log_line("error: generate command failed");
                            job.log_line("note: look for an earlier error in this log");
                            JobState::Failed
                        }
                        _ if exit.success() => JobState::Success,
                        _ => JobState::Failed,
                    };
                    tracing::info!(
                        job_id = id,
                        state = %final_state,
                        exit_code = ?exit.code(),
                        "Job finished"
                    );
                    job.finish(final_state);
                    self.retire_at(i);
                }
                Ok(None) => i += 1,
                Err(e) => {
                    self.jobs[id].log_line(format!("error: wait failed: {e}"));
                    i += 1;
                }
            }
        }
        self.fill_slots();
    }

    /// Move `running[i]` to the retired list.
    fn retire_at(&mut self, i: usize) {
        let id = self.running.remove(i);
        self.retired.push(id);
    }

    /// Work conservation: no slot stays idle while the queue is non-empty.
    fn fill_slots(&mut self) {
        while self.running.len() < self.config.nb_slots {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            self.admit(id);
        }
    }

    fn admit(&mut self, id: usize) {
        let ctrl = self.controller;
        tracing::info!(job_id = id, name = %self.jobs[id].display_name, "Starting job");
        self.jobs[id].start(&ctrl);
        if self.jobs[id].state.is_terminal() {
            // Spawn failed; the job never held a slot.
            self.retired.push(id);
        } else {
            self.running.push(id);
        }
    }

    /// Keep autoscrolling viewports pinned to the newest lines.
    fn follow_logs(&mut self) {
        let height = self.logs_height as usize;
        for job in &mut self.jobs {
            let (len, changed) = match job.log.lock() {
                Ok(mut log) => (log.len(), log.take_changed()),
                Err(_) => continue,
            };
            if changed && job.autoscroll {
                job.log_offset = len.saturating_sub(height);
            }
        }
    }
}
