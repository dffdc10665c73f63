//! Subprocess execution with bounded timeouts and partial log capture.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl PhaseRun {
    /// Combined log text, stdout first.
    pub fn log(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    fn spawn_failed(err: String) -> Self {
        Self {
            stderr: err,
            ..Default::default()
        }
    }
}

/// Runs a binary in a working directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    bin: PathBuf,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(bin: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `bin args...` in `cwd`.
    ///
    /// On timeout the child is left running and the output captured so far
    /// is returned.
    pub async fn run(&self, args: &[&str], cwd: &Path, env: &[(String, String)]) -> PhaseRun {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .current_dir(cwd)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(bin = ?self.bin, ?args, error = %e, "failed to spawn");
                return PhaseRun::spawn_failed(format!("failed to spawn {}: {e}", self.bin.display()));
            }
        };

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            child.stdout.take().map(|r| spawn_reader(r, stdout_buf.clone())),
            child.stderr.take().map(|r| spawn_reader(r, stderr_buf.clone())),
        ];

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                for reader in readers.into_iter().flatten() {
                    let _ = reader.await;
                }
                let (success, exit_code, spawn_err) = match status {
                    Ok(s) => (s.success(), s.code(), None),
                    Err(e) => (false, None, Some(e.to_string())),
                };
                let mut stderr = drain(&stderr_buf).await;
                if let Some(err) = spawn_err {
                    stderr.push_str(&err);
                }
                debug!(bin = ?self.bin, ?args, success, ?exit_code, "phase finished");
                PhaseRun {
                    success,
                    exit_code,
                    timed_out: false,
                    stdout: drain(&stdout_buf).await,
                    stderr,
                }
            }
            Err(_) => {
                warn!(bin = ?self.bin, ?args, timeout = ?self.timeout, "phase timed out; process left running");
                let mut stderr = drain(&stderr_buf).await;
                stderr.push_str(&format!("\ntimed out after {:?}", self.timeout));
                PhaseRun {
                    success: false,
                    exit_code: None,
                    timed_out: true,
                    stdout: drain(&stdout_buf).await,
                    stderr,
                }
            }
        }
    }
}

fn spawn_reader<R>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    })
}

async fn drain(buf: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&buf.lock().await).into_owned()
}
