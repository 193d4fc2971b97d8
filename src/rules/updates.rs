//! Delivery of remote rules updates to the manager.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::rules::manager::{RulesManager, RulesUpdate};

/// Applies batches received from the remote configuration client.
pub struct RulesUpdater {
    manager: Arc<RulesManager>,
    update_rx: mpsc::UnboundedReceiver<Vec<RulesUpdate>>,
}

impl RulesUpdater {
    /// Create a new RulesUpdater.
    ///
    /// Returns the updater and the sender the remote configuration client
    /// pushes batches into.
    pub fn new(manager: Arc<RulesManager>) -> (Self, mpsc::UnboundedSender<Vec<RulesUpdate>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self { manager, update_rx }, update_tx)
    }

    /// Apply batches until every sender is dropped.
    pub async fn run(mut self) {
        tracing::info!("appsec: rules updater started");

        while let Some(batch) = self.update_rx.recv().await {
            let size = batch.len();
            match self.manager.apply(batch) {
                Ok(revision) => {
                    let latest = self.manager.latest();
                    tracing::info!(
                        revision,
                        updates = size,
                        rules = latest.rules_count(),
                        rules_version = latest.version().unwrap_or("unknown"),
                        "appsec: security rules updated"
                    );
                }
                Err(e) => {
                    tracing::error!("appsec: rejected security rules update: {}. Keeping current rules.", e);
                }
            }
        }

        tracing::info!("appsec: rules updater stopped");
    }

    /// Run on the current Tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &[u8] = br#"{"rules":[{"id":"r1"}]}"#;

    #[tokio::test]
    async fn test_applies_batches_until_closed() {
        let manager = Arc::new(RulesManager::new(BASE).unwrap());
        let (updater, tx) = RulesUpdater::new(Arc::clone(&manager));
        let handle = updater.spawn();

        tx.send(vec![RulesUpdate::Edit {
            path: "datadog/2/ASM_DATA/blocked/config".into(),
            data: br#"{"rules_data":[{"id":"blocked_ips","type":"ip_with_expiration","data":[{"value":"10.0.0.1"}]}]}"#.to_vec(),
        }])
        .unwrap();
        tx.send(vec![RulesUpdate::Edit {
            path: "datadog/2/ASM/broken/config".into(),
            data: b"[".to_vec(),
        }])
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let latest = manager.latest();
        assert_eq!(latest.revision(), 1);
        assert_eq!(latest.fragment().rules_data.len(), 1);
    }
}
