use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::config::Shell;
use crate::error::{Error, Result};
use crate::store::{CommandCatalog, ExecutionLedger, LogSink};
use crate::types::{Command, CommandId, Execution, ExecutionId, Finalization, LogLine};

use super::drain::{drain, StreamTag};
use super::launcher::{self, ExitOutcome};
use super::terminate::{OsSignaller, ProcessSignaller};

// ---------------------------------------------------------------------------
// Completion signal
// ---------------------------------------------------------------------------

/// Resolves once an execution has exited, been finalized, and had both of
/// its output streams fully drained.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<ExitOutcome>>,
}

impl Completion {
    /// Wait for the execution to finish. Returns `None` only if the watcher
    /// task went away without reporting (e.g. the runtime shut down).
    pub async fn wait(mut self) -> Option<ExitOutcome> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome
    }

    /// The outcome if the execution has already finished.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.rx.borrow().clone()
    }
}

/// Returned by [`Executor::spawn`].
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub id: ExecutionId,
    pub pid: u32,
    pub completion: Completion,
}

impl ExecutionHandle {
    pub async fn wait(self) -> Option<ExitOutcome> {
        self.completion.wait().await
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Launches registered commands and supervises them until they exit or are
/// stopped.
///
/// Every dependency is injected. The executor holds no lock across a
/// subprocess lifetime: id issuance is the ledger's atomic insert and
/// finalization is the ledger's per-record check-and-set, so unrelated
/// executions never wait on each other.
#[derive(Clone)]
pub struct Executor {
    pub(super) catalog: Arc<dyn CommandCatalog>,
    pub(super) ledger: Arc<dyn ExecutionLedger>,
    pub(super) sink: Arc<dyn LogSink>,
    pub(super) signaller: Arc<dyn ProcessSignaller>,
    shell: Shell,
    in_flight: Arc<Mutex<HashMap<ExecutionId, Completion>>>,
}

impl Executor {
    pub fn new(
        catalog: Arc<dyn CommandCatalog>,
        ledger: Arc<dyn ExecutionLedger>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            sink,
            signaller: Arc::new(OsSignaller),
            shell: Shell::default(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build an executor whose three collaborators are one store.
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: CommandCatalog + ExecutionLedger + LogSink + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_signaller(mut self, signaller: Arc<dyn ProcessSignaller>) -> Self {
        self.signaller = signaller;
        self
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Run the command registered under `alias` and return its execution id
    /// as soon as the record exists. Output capture and exit detection
    /// continue in the background.
    pub async fn execute(&self, alias: &str) -> Result<ExecutionId> {
        Ok(self.spawn(alias).await?.id)
    }

    /// Like [`execute`](Self::execute) but also returns a handle that can be
    /// awaited for completion.
    ///
    /// The start sequence runs on its own task. Dropping the returned future
    /// only detaches from it: the child still ends up either supervised with
    /// a record or killed.
    pub async fn spawn(&self, alias: &str) -> Result<ExecutionHandle> {
        let this = self.clone();
        let alias = alias.to_string();
        tokio::spawn(async move { this.start(&alias).await })
            .await
            .map_err(|e| Error::LaunchFailed(format!("start task failed: {e}")))?
    }

    async fn start(&self, alias: &str) -> Result<ExecutionHandle> {
        let command = self.catalog.resolve(alias).await?;

        let mut process = launcher::launch(&self.shell, &command.script).await?;
        let pid = process.pid();
        let Some((stdout, stderr)) = process.take_streams() else {
            process.abort().await;
            return Err(Error::LaunchFailed("output streams already taken".into()));
        };

        let id = match self.ledger.create(command.id, pid).await {
            Ok(id) => id,
            Err(e) => {
                // The process is running but nothing tracks it.
                tracing::error!(
                    alias,
                    pid,
                    error = %e,
                    "failed to record execution; killing untracked process"
                );
                process.abort().await;
                return Err(match e {
                    Error::Persistence(_) => e,
                    other => Error::Persistence(other.to_string()),
                });
            }
        };

        tracing::info!(%id, pid, alias, "execution started");

        let (done_tx, done_rx) = watch::channel(None);
        let completion = Completion { rx: done_rx };
        lock(&self.in_flight).insert(id, completion.clone());

        let sink = Arc::clone(&self.sink);
        let stdout_task =
            tokio::spawn(async move { drain(stdout, id, StreamTag::Stdout, sink.as_ref()).await });
        let sink = Arc::clone(&self.sink);
        let stderr_task =
            tokio::spawn(async move { drain(stderr, id, StreamTag::Stderr, sink.as_ref()).await });

        let ledger = Arc::clone(&self.ledger);
        let sink = Arc::clone(&self.sink);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let outcome = process.wait().await;
            if outcome.is_success() {
                tracing::info!(%id, pid, "{}", outcome.describe());
            } else {
                tracing::warn!(%id, pid, "{}", outcome.describe());
            }

            if let Err(e) = finalize(ledger.as_ref(), id, "exited").await {
                tracing::error!(%id, error = %e, "failed to finalize execution");
            }

            for (stream, task) in [(StreamTag::Stdout, stdout_task), (StreamTag::Stderr, stderr_task)] {
                match task.await {
                    Ok(report) => tracing::debug!(
                        %id,
                        %stream,
                        lines = report.lines,
                        dropped = report.dropped,
                        "drain finished"
                    ),
                    Err(e) => tracing::error!(%id, %stream, error = %e, "drain task failed"),
                }
            }

            if !outcome.is_success() {
                let message = format!("[system] {}", outcome.describe());
                if let Err(e) = sink.append(id, &message).await {
                    tracing::warn!(%id, error = %e, "dropping lifecycle log line");
                }
            }

            let _ = done_tx.send(Some(outcome));
            lock(&in_flight).remove(&id);
        });

        Ok(ExecutionHandle {
            id,
            pid,
            completion,
        })
    }

    /// Completion signal for an execution that is still being supervised by
    /// this executor. `None` once it has finished or if it was never ours.
    pub fn completion(&self, id: ExecutionId) -> Option<Completion> {
        lock(&self.in_flight).get(&id).cloned()
    }

    // -- pass-throughs used by the transport layer --------------------------

    pub async fn register(&self, alias: &str, script: &str) -> Result<CommandId> {
        let id = self.catalog.register(alias, script).await?;
        tracing::info!(%id, alias, "command registered");
        Ok(id)
    }

    pub async fn command(&self, alias: &str) -> Result<Command> {
        self.catalog.resolve(alias).await
    }

    pub async fn commands(&self) -> Result<Vec<Command>> {
        self.catalog.list().await
    }

    pub async fn get(&self, id: ExecutionId) -> Result<Execution> {
        self.ledger.get(id).await
    }

    pub async fn active(&self) -> Result<Vec<Execution>> {
        self.ledger.list_active().await
    }

    /// Log lines for an existing execution, in the order they were stored.
    pub async fn logs(&self, id: ExecutionId) -> Result<Vec<LogLine>> {
        self.ledger.get(id).await?;
        self.sink.lines(id).await
    }
}

/// Mark `id` inactive. Shared by the exit watcher and [`Executor::stop`];
/// whichever runs second sees `AlreadyFinalized` and does nothing.
pub(super) async fn finalize(
    ledger: &dyn ExecutionLedger,
    id: ExecutionId,
    reason: &'static str,
) -> Result<Finalization> {
    let finalization = ledger.finalize(id).await?;
    if finalization.is_first() {
        tracing::info!(%id, reason, "execution finalized");
    } else {
        tracing::debug!(%id, reason, "execution already finalized");
    }
    Ok(finalization)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
