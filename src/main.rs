use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use edaq::api;
use edaq::config::{load_job_file, SchedulerConfig};
use edaq::error::Result;
use edaq::scheduler::Scheduler;
use edaq::shutdown::install_shutdown_handler;
use edaq::tui;

#[derive(Parser, Debug)]
#[command(name = "edaq")]
#[command(version)]
#[command(about = "Parallel job runner for EDA synthesis flows")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run jobs with the interactive terminal dashboard
    Run(RunArgs),

    /// Run jobs headless and expose the control API
    Serve(ServeArgs),
}

#[derive(Parser, Debug)]
struct SchedulerArgs {
    /// Job descriptor file (TOML)
    #[arg(long, short = 'j')]
    jobs: PathBuf,

    /// Maximum number of jobs running at once
    #[arg(long, default_value = "4")]
    nb_jobs: usize,

    /// Per-job log retention in lines, -1 for unbounded
    #[arg(long, default_value = "200", allow_hyphen_values = true)]
    log_size_limit: i64,

    /// Exit without confirmation once every job is terminal
    #[arg(long)]
    auto_exit: bool,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    scheduler: SchedulerArgs,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    #[command(flatten)]
    scheduler: SchedulerArgs,

    /// Address of the control API
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Tick period of the headless loop in milliseconds
    #[arg(long, default_value = "100")]
    tick_interval_ms: u64,
}

impl SchedulerArgs {
    fn build(&self, tick_interval: Option<Duration>) -> Result<Scheduler> {
        let mut config = SchedulerConfig::new(self.nb_jobs)
            .with_log_size_limit(self.log_size_limit)
            .with_auto_exit(self.auto_exit);
        if let Some(interval) = tick_interval {
            config = config.with_tick_interval(interval);
        }
        let specs = load_job_file(&self.jobs, &mut config)?;
        Ok(Scheduler::new(&specs, config))
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let outcome = match args.command {
        Commands::Run(run_args) => run_dashboard(run_args).await,
        Commands::Serve(serve_args) => serve(serve_args).await,
    };

    match outcome {
        // true: every job reached a terminal state; false: force-quit.
        Ok(all_done) => std::process::exit(if all_done { 0 } else { 1 }),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}

async fn run_dashboard(args: RunArgs) -> Result<bool> {
    // No subscriber here: log output would corrupt the alternate screen.
    let scheduler = args.scheduler.build(None)?;
    tui::run(scheduler).await
}

async fn serve(args: ServeArgs) -> Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let scheduler = args
        .scheduler
        .build(Some(Duration::from_millis(args.tick_interval_ms)))?;

    let token = install_shutdown_handler();
    scheduler.launch_initial().await;
    let loop_handle = scheduler.start_headless(token.clone());

    let api_handle = tokio::spawn(api::run_api(args.listen, scheduler.clone(), token.clone()));

    let all_done = loop_handle.await.unwrap_or(false);
    token.cancel();
    let _ = api_handle.await;

    Ok(all_done)
}
