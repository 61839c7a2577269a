//! Cooperative cancellation over a `watch::Receiver<bool>`.

use tokio::sync::watch;

/// Resolve once the signal carries `true`.
///
/// A dropped sender can never fire, so in that case this future stays
/// pending forever.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
