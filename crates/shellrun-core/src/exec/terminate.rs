use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::ExecutionId;

use super::supervisor::{finalize, Executor};

/// What happened when a termination signal was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// No such process. The caller's goal is already met.
    AlreadyExited,
}

/// Delivers a termination signal to an OS process by pid.
#[async_trait]
pub trait ProcessSignaller: Send + Sync {
    async fn terminate(&self, pid: u32) -> Result<SignalOutcome>;

    /// Whether `pid` still names a live process. Implementations that cannot
    /// tell must answer `true`.
    async fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

/// Hard-kills processes through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignaller;

#[cfg(unix)]
#[async_trait]
impl ProcessSignaller for OsSignaller {
    async fn terminate(&self, pid: u32) -> Result<SignalOutcome> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| Error::TerminationFailed {
            pid,
            reason: "pid out of range".into(),
        })?;
        if raw <= 0 {
            return Err(Error::TerminationFailed {
                pid,
                reason: "refusing to signal a process group".into(),
            });
        }

        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => Ok(SignalOutcome::Delivered),
            Err(Errno::ESRCH) => Ok(SignalOutcome::AlreadyExited),
            Err(e) => Err(Error::TerminationFailed {
                pid,
                reason: e.desc().to_string(),
            }),
        }
    }

    async fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH)),
            _ => false,
        }
    }
}

#[cfg(not(unix))]
#[async_trait]
impl ProcessSignaller for OsSignaller {
    async fn terminate(&self, pid: u32) -> Result<SignalOutcome> {
        let output = tokio::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .output()
            .await
            .map_err(|e| Error::TerminationFailed {
                pid,
                reason: e.to_string(),
            })?;
        if output.status.success() {
            return Ok(SignalOutcome::Delivered);
        }
        // taskkill exits 128 when the pid does not exist.
        if output.status.code() == Some(128) {
            return Ok(SignalOutcome::AlreadyExited);
        }
        Err(Error::TerminationFailed {
            pid,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let filter = format!("PID eq {pid}");
        match tokio::process::Command::new("tasklist")
            .args(["/NH", "/FI", &filter])
            .output()
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
            Err(_) => true,
        }
    }
}

impl Executor {
    /// Kill the process behind an active execution and finalize its record.
    ///
    /// A process that already exited on its own between the lookup and the
    /// signal is not an error; the record is finalized either way. Racing
    /// with the exit watcher is fine, only one of them finalizes.
    pub async fn stop(&self, id: ExecutionId) -> Result<()> {
        let execution = self.ledger.get(id).await?;
        if !execution.active {
            return Err(Error::NotActive(id));
        }

        let pid = execution.process_id;
        match self.signaller.terminate(pid).await {
            Ok(SignalOutcome::Delivered) => tracing::info!(%id, pid, "termination signal sent"),
            Ok(SignalOutcome::AlreadyExited) => {
                tracing::info!(%id, pid, "process already exited before stop")
            }
            Err(e) => {
                tracing::error!(%id, pid, error = %e, "failed to stop execution");
                return Err(e);
            }
        }

        finalize(self.ledger.as_ref(), id, "stopped").await?;
        Ok(())
    }
}
