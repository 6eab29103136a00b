//! Point-in-time, read-only view of scheduler and job state, shared by
//! the dashboard, the REST endpoints and the WebSocket push channel.

use serde::{Deserialize, Serialize};

use crate::job::JobState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub handler: HandlerStatus,
    pub jobs: Vec<JobSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogSlice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerStatus {
    pub version: String,
    /// Concurrency cap.
    pub nb_jobs: usize,
    pub selected_job_index: usize,
    pub job_count: usize,
    pub running: usize,
    pub queued: usize,
    pub retired: usize,
    pub theme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: usize,
    pub display_name: String,
    pub status: JobState,
    pub progress: f64,
    /// Seconds spent running, paused intervals excluded.
    pub elapsed_time: f64,
    pub directory: String,
    pub target: String,
    pub arch: String,
}

/// Windowed slice of one job's log history, for incremental polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSlice {
    pub job_id: usize,
    pub total_lines: usize,
    pub offset: usize,
    pub limit: usize,
    pub lines: Vec<String>,
}
