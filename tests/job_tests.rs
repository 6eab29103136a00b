use std::path::PathBuf;
use std::time::Duration;

use edaq::config::{JobSpec, SchedulerConfig};
use edaq::job::JobState;
use edaq::progress::ProgressMode;
use edaq::scheduler::Scheduler;

fn spec(name: &str, command: &str) -> JobSpec {
    JobSpec {
        command: command.to_string(),
        generate_command: None,
        directory: std::env::temp_dir(),
        display_name: name.to_string(),
        target: "xc7a100t".to_string(),
        arch: format!("test/{name}"),
        status_file: PathBuf::from("/nonexistent/status.log"),
        progress_file: PathBuf::from("/nonexistent/progress.log"),
        progress_mode: ProgressMode::FmaxSearch,
        log_size_limit: None,
        initial_state: None,
    }
}

async fn run_to_completion(sched: &Scheduler, timeout_ms: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while !sched.finished().await {
        sched.tick().await;
        assert!(
            tokio::time::Instant::now() < deadline,
            "jobs did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn stream_output_lands_in_the_job_log() {
    let specs = vec![spec("chatty", "echo out_line; echo err_line >&2")];
    let sched = Scheduler::new(&specs, SchedulerConfig::new(1));
    sched.launch_initial().await;
    run_to_completion(&sched, 3000).await;

    // Reader tasks may flush the last lines shortly after exit.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(1000);
    loop {
        let logs = sched.snapshot(Some(0), Some(0), Some(100)).await.logs.unwrap();
        let has_out = logs.lines.iter().any(|l| l == "out_line");
        let has_err = logs.lines.iter().any(|l| l == "err_line");
        if has_out && has_err {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "output not captured: {:?}",
            logs.lines
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn per_job_log_limit_keeps_only_the_tail() {
    let mut chatty = spec("bounded", "printf 'a\\nb\\nc\\nd\\n'");
    chatty.log_size_limit = Some(3);
    let sched = Scheduler::new(&[chatty], SchedulerConfig::new(1));
    sched.launch_initial().await;
    run_to_completion(&sched, 3000).await;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(1000);
    loop {
        let logs = sched.snapshot(Some(0), Some(0), Some(100)).await.logs.unwrap();
        if logs.lines == ["b", "c", "d"] {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tail not as expected: {:?}",
            logs.lines
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn running_job_polls_its_progress_files() {
    let dir = tempfile::tempdir().unwrap();
    let status_file = dir.path().join("status.log");
    let progress_file = dir.path().join("progress.log");
    std::fs::write(&status_file, "search: 40% (2/5)\n").unwrap();
    std::fs::write(&progress_file, "synth: 50%\n").unwrap();

    let mut job = spec("progressing", "sleep 0.5");
    job.status_file = status_file;
    job.progress_file = progress_file;

    let sched = Scheduler::new(&[job], SchedulerConfig::new(1));
    sched.launch_initial().await;
    sched.tick().await;

    let snap = sched.snapshot(None, None, None).await;
    assert_eq!(snap.jobs[0].status, JobState::Running);
    assert_eq!(snap.jobs[0].progress, 50.0);

    sched.terminate_all().await;
}

#[tokio::test]
async fn retired_job_keeps_its_frozen_progress() {
    let dir = tempfile::tempdir().unwrap();
    let progress_file = dir.path().join("progress.log");
    std::fs::write(&progress_file, "synth: 75%\n").unwrap();

    let mut job = spec("frozen", "sleep 0.2");
    job.progress_mode = ProgressMode::Single;
    job.progress_file = progress_file.clone();

    let sched = Scheduler::new(&[job], SchedulerConfig::new(1));
    sched.launch_initial().await;
    run_to_completion(&sched, 3000).await;

    // New file content must not move a retired job's bar.
    std::fs::write(&progress_file, "synth: 10%\n").unwrap();
    sched.tick().await;
    let snap = sched.snapshot(None, None, None).await;
    assert_eq!(snap.jobs[0].status, JobState::Success);
    assert_eq!(snap.jobs[0].progress, 75.0);
}

#[tokio::test]
async fn queued_job_shows_zero_progress() {
    let dir = tempfile::tempdir().unwrap();
    let progress_file = dir.path().join("progress.log");
    std::fs::write(&progress_file, "synth: 75%\n").unwrap();

    let mut waiting = spec("waiting", "sleep 5");
    waiting.progress_mode = ProgressMode::Single;
    waiting.progress_file = progress_file;

    let specs = vec![spec("running", "sleep 5"), waiting];
    let sched = Scheduler::new(&specs, SchedulerConfig::new(1));
    sched.launch_initial().await;
    sched.tick().await;

    let snap = sched.snapshot(None, None, None).await;
    assert_eq!(snap.jobs[1].status, JobState::Queued);
    assert_eq!(snap.jobs[1].progress, 0.0);

    sched.terminate_all().await;
}

#[tokio::test]
async fn non_queued_initial_state_retires_immediately() {
    let mut skipped = spec("skipped", "sleep 5");
    skipped.initial_state = Some(JobState::Canceled);
    let specs = vec![spec("normal", "true"), skipped];

    let sched = Scheduler::new(&specs, SchedulerConfig::new(2));
    sched.launch_initial().await;
    run_to_completion(&sched, 3000).await;

    let snap = sched.snapshot(None, None, None).await;
    assert_eq!(snap.jobs[0].status, JobState::Success);
    assert_eq!(snap.jobs[1].status, JobState::Canceled);
}
