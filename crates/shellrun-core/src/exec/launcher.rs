use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::config::Shell;
use crate::error::{Error, Result};

/// How a process ended, as observed by [`LaunchedProcess::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failed { code: i32 },
    Signaled { signal: i32 },
    WaitError { message: String },
}

impl ExitOutcome {
    fn from_status(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitOutcome::Success;
        }
        if let Some(code) = status.code() {
            return ExitOutcome::Failed { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::Signaled { signal };
            }
        }
        ExitOutcome::WaitError {
            message: format!("unrecognised exit status: {status}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    /// Short human-readable description used for lifecycle log lines.
    pub fn describe(&self) -> String {
        match self {
            ExitOutcome::Success => "process exited successfully".to_string(),
            ExitOutcome::Failed { code } => format!("process exited with code {code}"),
            ExitOutcome::Signaled { signal } => format!("process terminated by signal {signal}"),
            ExitOutcome::WaitError { message } => format!("failed to wait for process: {message}"),
        }
    }
}

/// A started child process with both output pipes attached.
///
/// The pipes are handed out once via [`take_streams`](Self::take_streams);
/// the remaining handle is only good for waiting.
#[derive(Debug)]
pub struct LaunchedProcess {
    pid: u32,
    child: Child,
    streams: Option<(ChildStdout, ChildStderr)>,
}

impl LaunchedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Detach stdout and stderr. Returns `None` on the second call.
    pub fn take_streams(&mut self) -> Option<(ChildStdout, ChildStderr)> {
        self.streams.take()
    }

    /// Block this task until the process exits.
    pub async fn wait(&mut self) -> ExitOutcome {
        match self.child.wait().await {
            Ok(status) => ExitOutcome::from_status(status),
            Err(e) => ExitOutcome::WaitError {
                message: e.to_string(),
            },
        }
    }

    /// Kill and reap the process. Used when the launch cannot be tracked.
    pub async fn abort(&mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

/// Start `<shell.program> <shell.arg> <script>` with piped stdout/stderr.
///
/// Fails fast: if the process cannot be spawned or a pipe is missing, any
/// started child is killed and reaped before the error is returned.
pub async fn launch(shell: &Shell, script: &str) -> Result<LaunchedProcess> {
    let mut child = Command::new(&shell.program)
        .arg(&shell.arg)
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::LaunchFailed(format!("failed to spawn '{}': {e}", shell.program)))?;

    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(out), Some(err)) => (out, err),
        _ => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Err(Error::LaunchFailed(
                "failed to capture stdout/stderr".into(),
            ));
        }
    };

    let Some(pid) = child.id() else {
        let _ = child.wait().await;
        return Err(Error::LaunchFailed(
            "process exited before its pid could be read".into(),
        ));
    };

    tracing::debug!(pid, program = %shell.program, "process started");

    Ok(LaunchedProcess {
        pid,
        child,
        streams: Some((stdout, stderr)),
    })
}
