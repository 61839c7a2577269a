use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use rollguard_rollout::{Disposition, Reconciler, RedeployCallback, RedeployFuture, RedeployRequest};

/// Redeploy hook for the CLI: emits a structured event a pipeline can act on.
pub fn log_redeploy() -> RedeployCallback {
    Arc::new(|req: RedeployRequest| -> RedeployFuture {
        info!(
            deployment = %req.deployment_id,
            namespace = %req.namespace,
            app = %req.app_name,
            version = %req.version,
            reason = ?req.reason,
            "redeploy requested"
        );
        Box::pin(async { Ok::<(), anyhow::Error>(()) })
    })
}

pub fn describe(disposition: Disposition) -> String {
    match disposition {
        Disposition::Pending => "pending".to_string(),
        Disposition::InProgress => "in progress".to_string(),
        Disposition::Succeeded => "succeeded".to_string(),
        Disposition::AwaitingEscalation => "failed, awaiting escalation".to_string(),
        Disposition::RollingBack => "rolling back".to_string(),
        Disposition::RolledBack => "rolled back".to_string(),
        Disposition::Unrecoverable(reason) => format!("failed ({reason})"),
        Disposition::RollbackFailed => "rollback failed, needs attention".to_string(),
        Disposition::Cancelled => "cancelled".to_string(),
    }
}

/// Reconcile every id concurrently until each settles or `shutdown` fires.
pub async fn reconcile(
    reconciler: &Reconciler,
    ids: Vec<String>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let total = ids.len();
    let mut handles = Vec::with_capacity(total);
    for id in ids {
        let engine = reconciler.clone();
        let mut shutdown = shutdown.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move { engine.reconcile(&task_id, &mut shutdown).await });
        handles.push((id, handle));
    }

    let mut failed = 0usize;
    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(disposition)) => println!("{id}: {}", describe(disposition)),
            Ok(Err(e)) => {
                error!(deployment = %id, error = %e, "reconciliation failed");
                eprintln!("{id}: error: {e}");
                failed += 1;
            }
            Err(e) => {
                error!(deployment = %id, error = %e, "reconciliation task panicked");
                eprintln!("{id}: error: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} reconciliations failed");
    }
    Ok(())
}
