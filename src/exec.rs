use crate::error::CollectError;
use crate::metrics::Metrics;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::debug;

/// How long a command that closed its stdout gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_millis(200);

/// Runs diagnostic commands and hands their stdout back line by line.
///
/// Every child is owned by a [`ChildGuard`], so it is killed and reaped on
/// completion, on error, on timeout and when the owning collector is stopped.
#[derive(Clone)]
pub struct CommandExecutor {
    timeout: Option<Duration>,
    cancel: watch::Receiver<bool>,
    metrics: Option<Arc<Metrics>>,
}

impl CommandExecutor {
    pub fn new(timeout: Option<Duration>, cancel: watch::Receiver<bool>) -> Self {
        Self {
            timeout,
            cancel,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn lines(&self, program: &str, args: &[&str]) -> Result<Vec<String>, CollectError> {
        let mut out = Vec::new();
        self.drive(program, args, self.timeout, |line| out.push(line))
            .await?;
        Ok(out)
    }

    /// First non-blank line, e.g. the answer of `getprop` or `getenforce`.
    pub async fn first_line(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<Option<String>, CollectError> {
        let lines = self.lines(program, args).await?;
        Ok(lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .find(|l| !l.is_empty()))
    }

    /// Follows a long-running command until it exits or the executor is cancelled.
    pub async fn stream<F>(&self, program: &str, args: &[&str], on_line: F) -> Result<(), CollectError>
    where
        F: FnMut(String),
    {
        self.drive(program, args, None, on_line).await
    }

    async fn drive<F>(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
        mut on_line: F,
    ) -> Result<(), CollectError>
    where
        F: FnMut(String),
    {
        let mut cancel = self.cancel.clone();
        if *cancel.borrow_and_update() {
            return Err(CollectError::Cancelled);
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CollectError::from_spawn(program, source))?;
        let stdout = child.stdout.take();
        let guard = ChildGuard::new(program, child);
        let Some(stdout) = stdout else {
            guard.release(Duration::ZERO).await;
            return Err(CollectError::Unavailable {
                program: program.to_string(),
                reason: "stdout was not captured".to_string(),
            });
        };

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let deadline = deadline(timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break Err(CollectError::Cancelled),
                _ = &mut deadline => {
                    break Err(CollectError::Timeout {
                        program: program.to_string(),
                        timeout: timeout.unwrap_or_default(),
                    })
                }
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break Ok(()),
                    Ok(_) => {
                        on_line(decode_line(&buf));
                        buf.clear();
                    }
                    Err(source) => {
                        break Err(CollectError::Io {
                            what: format!("{program} output"),
                            source,
                        })
                    }
                },
            }
        };

        let grace = if outcome.is_ok() { EXIT_GRACE } else { Duration::ZERO };
        guard.release(grace).await;
        if let Some(metrics) = &self.metrics {
            let label = match &outcome {
                Ok(()) => "ok",
                Err(err) => err.kind(),
            };
            metrics.inc_command_run(program, label);
        }
        outcome
    }
}

/// One raw stdout line without its terminator. Invalid UTF-8 becomes U+FFFD.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn deadline(timeout: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        match timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => std::future::pending::<()>().await,
        }
    }
}

/// Resolves once the flag flips to `true` or the sender side is gone.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Scoped owner of a spawned child process.
struct ChildGuard {
    program: String,
    child: Option<Child>,
}

impl ChildGuard {
    fn new(program: &str, child: Child) -> Self {
        Self {
            program: program.to_string(),
            child: Some(child),
        }
    }

    /// Waits up to `grace` for the child to exit on its own, then kills it
    /// and reaps it.
    async fn release(mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                if !status.success() {
                    debug!(program = %self.program, status = %status, "command exited with non-zero status");
                }
            }
            _ => {
                if let Err(err) = child.kill().await {
                    debug!(program = %self.program, error = %err, "failed to kill command");
                }
            }
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn executor(timeout: Option<Duration>) -> (watch::Sender<bool>, CommandExecutor) {
        let (tx, rx) = watch::channel(false);
        (tx, CommandExecutor::new(timeout, rx))
    }

    #[tokio::test]
    async fn collects_stdout_lines() {
        let (_tx, exec) = executor(Some(Duration::from_secs(5)));
        let lines = exec
            .lines("sh", &["-c", "printf 'MemTotal: 1 kB\\nMemFree: 2 kB\\n'"])
            .await
            .expect("sh is available");
        assert_eq!(lines, vec!["MemTotal: 1 kB", "MemFree: 2 kB"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let (_tx, exec) = executor(Some(Duration::from_secs(5)));
        let lines = exec
            .lines(
                "sh",
                &["-c", "printf 'MemTotal: 1 kB\\n\\377bad\\r\\nMemFree: 2 kB'"],
            )
            .await
            .expect("lossy decode");
        assert_eq!(lines, vec!["MemTotal: 1 kB", "\u{FFFD}bad", "MemFree: 2 kB"]);

        let mut seen = Vec::new();
        exec.stream("sh", &["-c", "printf 'one\\n\\377\\ntwo\\n'"], |l| seen.push(l))
            .await
            .expect("stream keeps going");
        assert_eq!(seen, vec!["one", "\u{FFFD}", "two"]);
    }

    #[tokio::test]
    async fn first_line_skips_blank_lines() {
        let (_tx, exec) = executor(Some(Duration::from_secs(5)));
        let line = exec
            .first_line("sh", &["-c", "printf '\\n  \\nEnforcing\\n'"])
            .await
            .expect("sh is available");
        assert_eq!(line.as_deref(), Some("Enforcing"));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let (_tx, exec) = executor(Some(Duration::from_secs(5)));
        let err = exec
            .lines("definitely-not-a-real-diagnostic-tool", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }

    #[tokio::test]
    async fn overrun_is_killed_on_timeout() {
        let (_tx, exec) = executor(Some(Duration::from_millis(200)));
        let start = Instant::now();
        let err = exec
            .lines("sh", &["-c", "echo started; sleep 30"])
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancellation_kills_running_child() {
        let (tx, exec) = executor(None);
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; echo ready; sleep 30", pid_file.display());

        let task = tokio::spawn(async move { exec.lines("sh", &["-c", &script]).await });
        let mut pid = String::new();
        for _ in 0..250 {
            pid = std::fs::read_to_string(&pid_file).unwrap_or_default();
            if pid.ends_with('\n') {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!pid.trim().is_empty(), "child never started");
        tx.send(true).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        let alive = std::path::Path::new(&format!("/proc/{}", pid.trim())).exists();
        assert!(!alive, "child should be reaped once cancellation returns");
    }

    #[tokio::test]
    async fn cancelled_executor_does_not_spawn() {
        let (tx, exec) = executor(None);
        tx.send(true).unwrap();
        let err = exec.lines("sh", &["-c", "echo hi"]).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn stream_forwards_each_line() {
        let (_tx, exec) = executor(None);
        let mut seen = Vec::new();
        exec.stream("sh", &["-c", "echo a; echo b; echo c"], |l| seen.push(l))
            .await
            .unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }
}
