//! The process-execution engine.
//!
//! ```text
//! Executor::spawn(alias)
//!     │  resolve alias ──► CommandCatalog
//!     │  launch       ──► launcher (bash -c <script>)
//!     │  record       ──► ExecutionLedger::create
//!     ├──► drain(stdout) ─┐
//!     ├──► drain(stderr) ─┼──► LogSink::append
//!     └──► watcher: wait ─► finalize ─► join drains ─► Completion
//!
//! Executor::stop(id) ──► ProcessSignaller ──► finalize
//! ```

pub mod drain;
pub mod launcher;
pub mod recovery;
pub mod supervisor;
pub mod terminate;

pub use drain::{drain, DrainReport, StreamTag};
pub use launcher::{launch, ExitOutcome, LaunchedProcess};
pub use supervisor::{Completion, ExecutionHandle, Executor};
pub use terminate::{OsSignaller, ProcessSignaller, SignalOutcome};
