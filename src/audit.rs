use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
    models::{AuditAction, NewAuditLog},
    permissions::Resource,
    repository::RepositoryState,
};

enum AuditCommand {
    Record(NewAuditLog),
    /// Answered once every entry queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// AuditRecorder
///
/// Fire-and-forget audit trail. `record` hands the entry to a background worker
/// over an unbounded channel and returns immediately, so a slow or failing audit
/// table can never fail or delay the mutation that produced the entry. Failures are
/// logged by the worker.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::UnboundedSender<AuditCommand>,
}

impl AuditRecorder {
    /// Spawns the worker on the current Tokio runtime.
    pub fn spawn(repo: RepositoryState) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(AuditWorker { repo }.run(rx));
        Self { tx }
    }

    pub fn record(
        &self,
        actor: Option<Uuid>,
        action: AuditAction,
        resource: Resource,
        details: impl Into<String>,
    ) {
        let details = details.into();
        let actor_label = actor.map_or_else(|| "system".to_string(), |id| id.to_string());
        tracing::info!(
            target: "audit",
            user = %actor_label,
            action = %action,
            resource = %resource,
            "{}",
            details
        );

        let entry = NewAuditLog {
            user_id: actor,
            action,
            resource,
            details,
        };
        if self.tx.send(AuditCommand::Record(entry)).is_err() {
            tracing::error!("Audit channel closed, entry lost");
        }
    }

    /// Waits until every entry recorded so far has been written (or has failed).
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

struct AuditWorker {
    repo: RepositoryState,
}

impl AuditWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<AuditCommand>) {
        tracing::debug!("Audit worker started");

        while let Some(command) = rx.recv().await {
            match command {
                AuditCommand::Record(entry) => match self.repo.append_audit_log(entry).await {
                    Ok(log) => {
                        tracing::debug!(audit_id = %log.id, action = %log.action, "Audit entry recorded");
                    }
                    Err(e) => {
                        tracing::error!("Failed to write audit entry: {}", e);
                    }
                },
                AuditCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        tracing::debug!("Audit channel closed, worker stopping");
    }
}
