//! Non-blocking drain of job output streams.
//!
//! One reader task per stream per job appends complete lines into the
//! job's shared ring buffer. Line order within a stream is preserved;
//! interleaving between stdout and stderr is best-effort.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

use crate::logbuf::LogBuffer;

/// Take both output streams of a freshly spawned child and tail them
/// into `log` until EOF.
pub fn attach(child: &mut Child, log: Arc<Mutex<LogBuffer>>) {
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, Arc::clone(&log));
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, log);
    }
}

fn spawn_reader<R>(stream: R, log: Arc<Mutex<LogBuffer>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut log) = log.lock() {
                log.push(line);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessController;
    use std::time::Duration;

    #[tokio::test]
    async fn tailer_captures_both_streams_in_order() {
        let ctrl = ProcessController;
        let dir = tempfile::tempdir().unwrap();
        let mut child = ctrl
            .spawn("echo one; echo two; echo err >&2", dir.path())
            .unwrap();
        let log = Arc::new(Mutex::new(LogBuffer::new(None)));
        attach(&mut child, Arc::clone(&log));

        child.wait().await.unwrap();
        // Readers may still be flushing the final lines after exit.
        for _ in 0..50 {
            if log.lock().unwrap().len() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let lines: Vec<String> = log.lock().unwrap().iter().cloned().collect();
        assert_eq!(lines.len(), 3);
        let stdout_lines: Vec<&String> =
            lines.iter().filter(|l| l.as_str() != "err").collect();
        assert_eq!(stdout_lines, ["one", "two"]);
        assert!(lines.iter().any(|l| l == "err"));
    }
}
