//! Platform process control.
//!
//! Jobs run as whole process groups so that signals reach every
//! sub-process the wrapped tool spawns. On Unix this uses group signals
//! (SIGSTOP/SIGCONT/SIGTERM); elsewhere pause/resume are unsupported and
//! termination falls back to killing the tracked child only.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{EdaqError, Result};

/// Signal sent to a job's whole process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    Pause,
    Resume,
    Terminate,
}

/// Process primitives the scheduler core calls. The platform
/// implementation is selected once, at build time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessController;

impl ProcessController {
    /// Spawn `command` through the shell in its own process group, with
    /// piped output streams.
    pub fn spawn(&self, command: &str, dir: &Path) -> std::io::Result<Child> {
        let mut cmd = shell_command(command);
        cmd.current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.spawn()
    }

    #[cfg(unix)]
    pub fn signal_group(&self, pgid: i32, signal: GroupSignal) -> Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let group = Pid::from_raw(pgid);
        let sig = match signal {
            GroupSignal::Pause => Signal::SIGSTOP,
            GroupSignal::Resume => Signal::SIGCONT,
            GroupSignal::Terminate => Signal::SIGTERM,
        };
        killpg(group, sig)
            .map_err(|e| EdaqError::Signal(format!("signal {sig} to group {pgid}: {e}")))?;
        if signal == GroupSignal::Terminate {
            // A stopped group must be continued before it can act on SIGTERM.
            let _ = killpg(group, Signal::SIGCONT);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn signal_group(&self, _pgid: i32, signal: GroupSignal) -> Result<()> {
        Err(EdaqError::Signal(format!(
            "{signal:?} is not supported on this platform"
        )))
    }

    /// Terminate a job, preferring a group signal and falling back to
    /// killing the tracked child.
    pub fn terminate(&self, pgid: Option<i32>, child: Option<&mut Child>) -> Result<()> {
        if let Some(pgid) = pgid {
            if self.signal_group(pgid, GroupSignal::Terminate).is_ok() {
                return Ok(());
            }
        }
        match child {
            Some(child) => child
                .start_kill()
                .map_err(|e| EdaqError::Signal(format!("kill: {e}"))),
            None => Err(EdaqError::Signal("no process to terminate".to_string())),
        }
    }

    /// Open a directory in the desktop file manager. Fire and forget.
    pub fn open_path(&self, path: &Path) -> std::io::Result<()> {
        Command::new(OPENER)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(all(unix, not(target_os = "macos")))]
const OPENER: &str = "xdg-open";
#[cfg(not(unix))]
const OPENER: &str = "explorer";

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
