//! Postgres-backed implementation of the shellrun persistence traits.
//!
//! # Schema
//!
//! ```text
//! commands   (id BIGSERIAL, alias TEXT UNIQUE, script TEXT)
//! executions (id BIGSERIAL, command_id → commands, process_id BIGINT, active BOOLEAN)
//! log_lines  (id BIGSERIAL, execution_id → executions, message TEXT, created_at TIMESTAMPTZ)
//! ```
//!
//! Tables are created on connect if missing. Finalization is a single
//! conditional `UPDATE … WHERE active RETURNING id`, which makes the
//! active→inactive transition atomic per row without any application lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use shellrun_core::config::DatabaseConfig;
use shellrun_core::error::{Error, Result};
use shellrun_core::store::{validate_command, CommandCatalog, ExecutionLedger, LogSink};
use shellrun_core::types::{
    Command, CommandId, Execution, ExecutionId, Finalization, LogLine, LogLineId,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS commands (
        id     BIGSERIAL PRIMARY KEY,
        alias  TEXT NOT NULL UNIQUE,
        script TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id         BIGSERIAL PRIMARY KEY,
        command_id BIGINT NOT NULL REFERENCES commands (id),
        process_id BIGINT NOT NULL,
        active     BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS log_lines (
        id           BIGSERIAL PRIMARY KEY,
        execution_id BIGINT NOT NULL REFERENCES executions (id),
        message      TEXT NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS log_lines_execution_idx ON log_lines (execution_id, id)",
    "CREATE INDEX IF NOT EXISTS executions_active_idx ON executions (active) WHERE active",
];

fn map_db_err(op: &str, e: sqlx::Error) -> Error {
    Error::Persistence(format!("{op}: {e}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn pid_from_db(raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|_| Error::Persistence(format!("invalid process id in ledger: {raw}")))
}

fn command_from_row(row: &PgRow) -> Result<Command> {
    Ok(Command {
        id: CommandId(row.try_get("id").map_err(|e| map_db_err("read command", e))?),
        alias: row.try_get("alias").map_err(|e| map_db_err("read command", e))?,
        script: row.try_get("script").map_err(|e| map_db_err("read command", e))?,
    })
}

fn execution_from_row(row: &PgRow) -> Result<Execution> {
    let process_id: i64 = row
        .try_get("process_id")
        .map_err(|e| map_db_err("read execution", e))?;
    Ok(Execution {
        id: ExecutionId(row.try_get("id").map_err(|e| map_db_err("read execution", e))?),
        command_id: CommandId(
            row.try_get("command_id")
                .map_err(|e| map_db_err("read execution", e))?,
        ),
        process_id: pid_from_db(process_id)?,
        active: row
            .try_get("active")
            .map_err(|e| map_db_err("read execution", e))?,
    })
}

fn log_line_from_row(row: &PgRow) -> Result<LogLine> {
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| map_db_err("read log line", e))?;
    Ok(LogLine {
        id: LogLineId(row.try_get("id").map_err(|e| map_db_err("read log line", e))?),
        execution_id: ExecutionId(
            row.try_get("execution_id")
                .map_err(|e| map_db_err("read log line", e))?,
        ),
        message: row
            .try_get("message")
            .map_err(|e| map_db_err("read log line", e))?,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect using `config` and make sure the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .connect(&config.url())
            .await
            .map_err(|e| map_db_err("connect", e))?;
        let store = Self::with_pool(pool);
        store.bootstrap().await?;
        Ok(store)
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn bootstrap(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| map_db_err("bootstrap schema", e))?;
        }
        tracing::debug!("database schema ready");
        Ok(())
    }
}

#[async_trait]
impl CommandCatalog for PgStore {
    async fn register(&self, alias: &str, script: &str) -> Result<CommandId> {
        validate_command(alias, script)?;
        let row = sqlx::query("INSERT INTO commands (alias, script) VALUES ($1, $2) RETURNING id")
            .bind(alias)
            .bind(script)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::CommandExists(alias.to_string())
                } else {
                    map_db_err("insert command", e)
                }
            })?;
        Ok(CommandId(
            row.try_get("id")
                .map_err(|e| map_db_err("insert command", e))?,
        ))
    }

    async fn resolve(&self, alias: &str) -> Result<Command> {
        let row = sqlx::query("SELECT id, alias, script FROM commands WHERE alias = $1")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_err("select command", e))?
            .ok_or_else(|| Error::CommandNotFound(alias.to_string()))?;
        command_from_row(&row)
    }

    async fn list(&self) -> Result<Vec<Command>> {
        sqlx::query("SELECT id, alias, script FROM commands ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_err("list commands", e))?
            .iter()
            .map(command_from_row)
            .collect()
    }
}

#[async_trait]
impl ExecutionLedger for PgStore {
    async fn create(&self, command_id: CommandId, process_id: u32) -> Result<ExecutionId> {
        let row = sqlx::query(
            "INSERT INTO executions (command_id, process_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(command_id.0)
        .bind(i64::from(process_id))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("insert execution", e))?;
        Ok(ExecutionId(
            row.try_get("id")
                .map_err(|e| map_db_err("insert execution", e))?,
        ))
    }

    async fn get(&self, id: ExecutionId) -> Result<Execution> {
        let row = sqlx::query(
            "SELECT id, command_id, process_id, active FROM executions WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("select execution", e))?
        .ok_or(Error::ExecutionNotFound(id))?;
        execution_from_row(&row)
    }

    async fn finalize(&self, id: ExecutionId) -> Result<Finalization> {
        let flipped = sqlx::query(
            "UPDATE executions SET active = FALSE WHERE id = $1 AND active RETURNING id",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("finalize execution", e))?;
        if flipped.is_some() {
            return Ok(Finalization::Finalized);
        }

        // Nothing flipped: either already inactive or unknown.
        self.get(id).await?;
        Ok(Finalization::AlreadyFinalized)
    }

    async fn list_active(&self) -> Result<Vec<Execution>> {
        sqlx::query(
            "SELECT id, command_id, process_id, active FROM executions WHERE active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("list active executions", e))?
        .iter()
        .map(execution_from_row)
        .collect()
    }
}

#[async_trait]
impl LogSink for PgStore {
    async fn append(&self, execution_id: ExecutionId, message: &str) -> Result<LogLineId> {
        let row = sqlx::query(
            "INSERT INTO log_lines (execution_id, message) VALUES ($1, $2) RETURNING id",
        )
        .bind(execution_id.0)
        .bind(message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("insert log line", e))?;
        Ok(LogLineId(
            row.try_get("id")
                .map_err(|e| map_db_err("insert log line", e))?,
        ))
    }

    async fn lines(&self, execution_id: ExecutionId) -> Result<Vec<LogLine>> {
        sqlx::query(
            "SELECT id, execution_id, message, created_at FROM log_lines \
             WHERE execution_id = $1 ORDER BY id",
        )
        .bind(execution_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("select log lines", e))?
        .iter()
        .map(log_line_from_row)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_round_trips_through_bigint() {
        assert_eq!(pid_from_db(i64::from(u32::MAX)).unwrap(), u32::MAX);
        assert!(matches!(pid_from_db(-1), Err(Error::Persistence(_))));
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn schema_statements_are_idempotent() {
        for stmt in SCHEMA {
            assert!(
                stmt.contains("IF NOT EXISTS"),
                "bootstrap statement must be re-runnable: {stmt}"
            );
        }
    }
}
