use std::sync::Arc;

use shellrun_core::config::Config;
use shellrun_core::store::MemoryStore;
use shellrun_core::Executor;

use crate::pg::PgStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
}

impl AppState {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// State backed by a fresh in-memory store.
    pub fn in_memory(config: &Config) -> Self {
        let executor = Executor::with_store(Arc::new(MemoryStore::new()))
            .with_shell(config.shell.clone());
        Self::new(executor)
    }

    /// Pick the backend from `config`: Postgres when a database is
    /// configured, otherwise in-memory. Stale executions from a previous run
    /// are finalized before the state is handed out.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let state = match &config.database {
            Some(db) => {
                let store = Arc::new(PgStore::connect(db).await?);
                tracing::info!("using postgres store");
                Self::new(Executor::with_store(store).with_shell(config.shell.clone()))
            }
            None => {
                tracing::info!("no database configured, using in-memory store");
                Self::in_memory(config)
            }
        };
        state.executor.recover_stale().await?;
        Ok(state)
    }
}
