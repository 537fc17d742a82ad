//! Configuration file watcher for hot reload of the filter policy.

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AgentConfig;
use crate::filter::FilterPolicy;

/// Watches the configuration file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AgentConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AgentConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(config) => {
                            tracing::info!(path = ?path, "Config file changed, reloaded");
                            let _ = tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current filters");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Swap the live filter policy for every reload received.
///
/// Returns when the update channel closes.
pub async fn apply_filter_updates(
    mut updates: mpsc::UnboundedReceiver<AgentConfig>,
    policy: Arc<ArcSwap<FilterPolicy>>,
) {
    while let Some(config) = updates.recv().await {
        match FilterPolicy::from_config(&config.filter) {
            Ok(next) => {
                policy.store(Arc::new(next));
                tracing::info!(
                    ignore_paths = config.filter.ignore_paths.len(),
                    ignore_headers = config.filter.ignore_headers.len(),
                    ignore_status_codes = config.filter.ignore_status_codes.len(),
                    "Filter policy updated"
                );
            }
            Err(e) => tracing::error!(error = %e, "Rejected filter update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_filter_updates_swaps_policy() {
        let policy = Arc::new(ArcSwap::from_pointee(FilterPolicy::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut config = AgentConfig::default();
        config.filter.ignore_paths = vec!["^/skip".into()];
        tx.send(config).unwrap();
        drop(tx);

        apply_filter_updates(rx, Arc::clone(&policy)).await;
        assert!(policy.load().is_path_ignored("/skip/me"));
    }
}
