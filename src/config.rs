use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EdaqError, Result};
use crate::job::JobState;
use crate::progress::{ProgressMode, ProgressPatterns};

/// Log retention meaning "keep everything".
pub const LOG_SIZE_UNLIMITED: i64 = -1;

/// Scheduler-wide configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in running/starting state at once.
    pub nb_slots: usize,
    /// Default per-job log retention in lines, `-1` for unbounded.
    pub log_size_limit: i64,
    /// Exit the dashboard without confirmation once every job is terminal.
    pub auto_exit: bool,
    /// Tick period of the headless loop.
    pub tick_interval: Duration,
    /// Line patterns for the progress files.
    pub patterns: ProgressPatterns,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            nb_slots: 4,
            log_size_limit: 200,
            auto_exit: false,
            tick_interval: Duration::from_millis(100),
            patterns: ProgressPatterns::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(nb_slots: usize) -> Self {
        Self {
            nb_slots,
            ..Default::default()
        }
    }

    pub fn with_log_size_limit(mut self, limit: i64) -> Self {
        self.log_size_limit = limit;
        self
    }

    pub fn with_auto_exit(mut self, auto_exit: bool) -> Self {
        self.auto_exit = auto_exit;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Resolve a `-1`-style limit into an eviction bound.
pub fn effective_log_limit(limit: i64) -> Option<usize> {
    if limit < 0 {
        None
    } else {
        Some(limit as usize)
    }
}

/// One job descriptor, as handed over by the flow that builds commands.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    /// Shell command of the synthesis run.
    pub command: String,
    /// Optional generate step run before `command`.
    #[serde(default)]
    pub generate_command: Option<String>,
    /// Working directory of the run.
    pub directory: PathBuf,
    pub display_name: String,
    pub target: String,
    pub arch: String,
    /// Search-stage status file written by the tool wrapper.
    pub status_file: PathBuf,
    /// Synthesis-stage progress file written by the tool wrapper.
    pub progress_file: PathBuf,
    #[serde(default)]
    pub progress_mode: ProgressMode,
    /// Per-job log retention override, `-1` for unbounded.
    #[serde(default)]
    pub log_size_limit: Option<i64>,
    /// Admission state; anything but `queued` keeps the job out of the run.
    #[serde(default)]
    pub initial_state: Option<JobState>,
}

/// On-disk descriptor file: a `[[jobs]]` array plus optional patterns.
#[derive(Debug, Deserialize)]
struct JobFile {
    #[serde(default)]
    patterns: Option<PatternStrings>,
    jobs: Vec<JobSpec>,
}

#[derive(Debug, Deserialize)]
struct PatternStrings {
    search: Option<String>,
    synth: Option<String>,
}

/// Load job descriptors from a TOML file, applying any pattern overrides
/// onto `config`.
pub fn load_job_file(path: &Path, config: &mut SchedulerConfig) -> Result<Vec<JobSpec>> {
    let content = std::fs::read_to_string(path)?;
    let file: JobFile = toml::from_str(&content)?;

    if let Some(patterns) = file.patterns {
        if let Some(search) = patterns.search {
            config.patterns.search = regex::Regex::new(&search)
                .map_err(|e| EdaqError::Descriptor(format!("bad search pattern: {e}")))?;
        }
        if let Some(synth) = patterns.synth {
            config.patterns.synth = regex::Regex::new(&synth)
                .map_err(|e| EdaqError::Descriptor(format!("bad synth pattern: {e}")))?;
        }
    }

    if file.jobs.is_empty() {
        return Err(EdaqError::Descriptor(format!(
            "no jobs in {}",
            path.display()
        )));
    }

    Ok(file.jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.nb_slots, 4);
        assert_eq!(cfg.log_size_limit, 200);
        assert!(!cfg.auto_exit);
        assert_eq!(cfg.tick_interval, Duration::from_millis(100));
    }

    #[test]
    fn scheduler_config_builders() {
        let cfg = SchedulerConfig::new(2)
            .with_log_size_limit(LOG_SIZE_UNLIMITED)
            .with_auto_exit(true)
            .with_tick_interval(Duration::from_millis(50));
        assert_eq!(cfg.nb_slots, 2);
        assert_eq!(cfg.log_size_limit, -1);
        assert!(cfg.auto_exit);
        assert_eq!(cfg.tick_interval, Duration::from_millis(50));
    }

    #[test]
    fn effective_log_limit_maps_negative_to_unbounded() {
        assert_eq!(effective_log_limit(-1), None);
        assert_eq!(effective_log_limit(0), Some(0));
        assert_eq!(effective_log_limit(200), Some(200));
    }

    #[test]
    fn job_file_parses_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[[jobs]]
command = "make synth"
directory = "/tmp/work/alu"
display_name = "alu_32"
target = "xc7a100t"
arch = "alu/32bits"
status_file = "/tmp/work/alu/status.log"
progress_file = "/tmp/work/alu/progress.log"
"#
        )
        .unwrap();

        let mut cfg = SchedulerConfig::default();
        let jobs = load_job_file(&path, &mut cfg).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].command, "make synth");
        assert!(jobs[0].generate_command.is_none());
        assert_eq!(jobs[0].progress_mode, ProgressMode::FmaxSearch);
        assert!(jobs[0].log_size_limit.is_none());
        assert!(jobs[0].initial_state.is_none());
    }

    #[test]
    fn job_file_pattern_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[patterns]
synth = "PROG ([0-9]+) ([0-9]+)"

[[jobs]]
command = "make sim"
directory = "/tmp/work/sim"
display_name = "tb_counter"
target = "verilator"
arch = "counter"
status_file = "/tmp/work/sim/status.log"
progress_file = "/tmp/work/sim/progress.log"
progress_mode = "single"
"#
        )
        .unwrap();

        let mut cfg = SchedulerConfig::default();
        let jobs = load_job_file(&path, &mut cfg).unwrap();
        assert_eq!(jobs[0].progress_mode, ProgressMode::Single);
        assert!(cfg.patterns.synth.is_match("PROG 42 100"));
    }

    #[test]
    fn empty_job_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");
        std::fs::write(&path, "jobs = []\n").unwrap();

        let mut cfg = SchedulerConfig::default();
        assert!(load_job_file(&path, &mut cfg).is_err());
    }
}
