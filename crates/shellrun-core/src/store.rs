//! Persistence seams used by the execution engine.
//!
//! The engine never touches a database directly; it is handed an
//! implementation of each trait at construction time. [`MemoryStore`]
//! implements all three and backs tests and `serve --memory`. The Postgres
//! implementation lives in `shellrun-server`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{
    Command, CommandId, Execution, ExecutionId, Finalization, LogLine, LogLineId,
};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Resolves aliases to scripts and stores new command definitions.
#[async_trait]
pub trait CommandCatalog: Send + Sync {
    async fn register(&self, alias: &str, script: &str) -> Result<CommandId>;
    async fn resolve(&self, alias: &str) -> Result<Command>;
    async fn list(&self) -> Result<Vec<Command>>;
}

/// Execution records keyed by [`ExecutionId`].
#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// Insert a new active record and issue its id.
    async fn create(&self, command_id: CommandId, process_id: u32) -> Result<ExecutionId>;
    async fn get(&self, id: ExecutionId) -> Result<Execution>;
    /// Atomically flip `active` to false. Calling it on an inactive record
    /// is not an error and returns [`Finalization::AlreadyFinalized`].
    async fn finalize(&self, id: ExecutionId) -> Result<Finalization>;
    async fn list_active(&self) -> Result<Vec<Execution>>;
}

/// Append-only log storage.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, execution_id: ExecutionId, message: &str) -> Result<LogLineId>;
    /// All lines for an execution in insertion order.
    async fn lines(&self, execution_id: ExecutionId) -> Result<Vec<LogLine>>;
}

/// Validate a command definition before it reaches any backend.
pub fn validate_command(alias: &str, script: &str) -> Result<()> {
    if alias.trim().is_empty() {
        return Err(Error::InvalidCommand("alias must not be empty".into()));
    }
    if script.trim().is_empty() {
        return Err(Error::InvalidCommand(format!(
            "script for '{alias}' must not be empty"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn insert(&mut self, build: impl FnOnce(i64) -> T) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.rows.insert(id, build(id));
        id
    }
}

/// In-process store implementing every persistence trait.
///
/// Each table has its own lock and no lock is held across an `.await`, so
/// log appends never contend with ledger transitions.
#[derive(Default)]
pub struct MemoryStore {
    commands: Mutex<Table<Command>>,
    executions: Mutex<Table<Execution>>,
    logs: Mutex<Table<LogLine>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> Error {
    Error::Persistence(format!("store lock poisoned: {e}"))
}

#[async_trait]
impl CommandCatalog for MemoryStore {
    async fn register(&self, alias: &str, script: &str) -> Result<CommandId> {
        validate_command(alias, script)?;
        let mut table = self.commands.lock().map_err(poisoned)?;
        if table.rows.values().any(|c| c.alias == alias) {
            return Err(Error::CommandExists(alias.to_string()));
        }
        let id = table.insert(|id| Command {
            id: CommandId(id),
            alias: alias.to_string(),
            script: script.to_string(),
        });
        Ok(CommandId(id))
    }

    async fn resolve(&self, alias: &str) -> Result<Command> {
        let table = self.commands.lock().map_err(poisoned)?;
        table
            .rows
            .values()
            .find(|c| c.alias == alias)
            .cloned()
            .ok_or_else(|| Error::CommandNotFound(alias.to_string()))
    }

    async fn list(&self) -> Result<Vec<Command>> {
        let table = self.commands.lock().map_err(poisoned)?;
        Ok(table.rows.values().cloned().collect())
    }
}

#[async_trait]
impl ExecutionLedger for MemoryStore {
    async fn create(&self, command_id: CommandId, process_id: u32) -> Result<ExecutionId> {
        let mut table = self.executions.lock().map_err(poisoned)?;
        let id = table.insert(|id| Execution {
            id: ExecutionId(id),
            command_id,
            process_id,
            active: true,
        });
        Ok(ExecutionId(id))
    }

    async fn get(&self, id: ExecutionId) -> Result<Execution> {
        let table = self.executions.lock().map_err(poisoned)?;
        table
            .rows
            .get(&id.0)
            .cloned()
            .ok_or(Error::ExecutionNotFound(id))
    }

    async fn finalize(&self, id: ExecutionId) -> Result<Finalization> {
        let mut table = self.executions.lock().map_err(poisoned)?;
        let record = table
            .rows
            .get_mut(&id.0)
            .ok_or(Error::ExecutionNotFound(id))?;
        if record.active {
            record.active = false;
            Ok(Finalization::Finalized)
        } else {
            Ok(Finalization::AlreadyFinalized)
        }
    }

    async fn list_active(&self) -> Result<Vec<Execution>> {
        let table = self.executions.lock().map_err(poisoned)?;
        Ok(table.rows.values().filter(|e| e.active).cloned().collect())
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn append(&self, execution_id: ExecutionId, message: &str) -> Result<LogLineId> {
        let mut table = self.logs.lock().map_err(poisoned)?;
        let id = table.insert(|id| LogLine {
            id: LogLineId(id),
            execution_id,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(LogLineId(id))
    }

    async fn lines(&self, execution_id: ExecutionId) -> Result<Vec<LogLine>> {
        let table = self.logs.lock().map_err(poisoned)?;
        Ok(table
            .rows
            .values()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
