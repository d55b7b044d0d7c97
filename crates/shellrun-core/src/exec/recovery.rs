use crate::error::Result;

use super::supervisor::{finalize, Executor};

impl Executor {
    /// Finalize active records left behind by a previous server instance.
    ///
    /// Only records this executor is not supervising are considered, and
    /// only those whose process is gone are finalized; a still-running
    /// orphan keeps its record so it can be stopped. Returns the number of
    /// records finalized.
    pub async fn recover_stale(&self) -> Result<u32> {
        let mut recovered = 0u32;
        for execution in self.ledger.list_active().await? {
            if self.completion(execution.id).is_some() {
                continue;
            }
            if self.signaller.is_alive(execution.process_id).await {
                tracing::warn!(
                    id = %execution.id,
                    pid = execution.process_id,
                    "active execution from a previous run is still alive; output is not captured"
                );
                continue;
            }
            if finalize(self.ledger.as_ref(), execution.id, "recovered")
                .await?
                .is_first()
            {
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "finalized stale executions");
        }
        Ok(recovered)
    }
}
