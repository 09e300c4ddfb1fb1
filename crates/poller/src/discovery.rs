//! Daily route discovery.
//!
//! Spawns a background loop that sleeps until the configured local time
//! of day, runs [`AccountContext::discover`], and repeats. Runs until
//! `cancel` is triggered.

use std::sync::Arc;

use busstop_client::Transport;
use busstop_core::schedule::until_next;
use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::context::AccountContext;

/// Run the discovery loop for `context`.
pub async fn run<T: Transport + 'static>(context: Arc<AccountContext<T>>, cancel: CancellationToken) {
    let at = context.config().discovery_time;
    tracing::info!(discovery_time = %at.format("%H:%M"), "Route discovery job started");

    loop {
        let wait = until_next(Local::now().naive_local(), at);
        tracing::debug!(wait_secs = wait.as_secs(), "Next route discovery scheduled");

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Route discovery job stopping");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                let added = context.discover().await;
                if added.is_empty() {
                    tracing::debug!("Route discovery: nothing new");
                } else {
                    tracing::info!(count = added.len(), "Route discovery: routes added");
                }
            }
        }
    }
}

/// Spawn [`run`] on the tokio runtime, stopping with the context.
pub fn spawn<T: Transport + 'static>(context: &Arc<AccountContext<T>>) -> tokio::task::JoinHandle<()> {
    let cancel = context.cancellation_token();
    tokio::spawn(run(Arc::clone(context), cancel))
}
