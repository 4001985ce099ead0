//! Configuration hot-reload (§6, §1a "Configuration"): re-reads and
//! re-validates `Settings` from disk without restarting the process.
//!
//! Grounded on the teacher's `config::hot_reload::ConfigWatcher` (mtime
//! polling + `broadcast` channel of versioned updates), adapted to this
//! crate's `Settings`/`ConfigValidator`. Only the gateway's own tunables are
//! covered here — registered services/endpoints are repository content
//! owned by the out-of-scope admin surface, not this tree (§1a).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;

use super::settings::Settings;
use super::validation::ConfigValidator;

#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub settings: Settings,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: u64,
}

/// Watches `config_path`'s mtime on an interval and publishes a validated
/// `ConfigUpdate` to every subscriber whenever it changes. A failed reload
/// (I/O error or validation error) is logged and the watcher keeps serving
/// the last-known-good settings.
pub struct ConfigWatcher {
    current: Arc<RwLock<ConfigUpdate>>,
    config_path: String,
    update_sender: broadcast::Sender<ConfigUpdate>,
    version_counter: Arc<AtomicU64>,
}

impl ConfigWatcher {
    pub fn new(initial_settings: Settings, config_path: String) -> Self {
        let (update_sender, _) = broadcast::channel(32);
        let initial = ConfigUpdate {
            settings: initial_settings,
            timestamp: chrono::Utc::now(),
            version: 1,
        };
        ConfigWatcher {
            current: Arc::new(RwLock::new(initial)),
            config_path,
            update_sender,
            version_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn current(&self) -> ConfigUpdate {
        self.current.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigUpdate> {
        self.update_sender.subscribe()
    }

    /// Spawns the polling task (§1a: "SIGHUP/file-watch"). The teacher polls
    /// on a plain interval rather than an OS file-watch API; this keeps the
    /// same approach since it needs no extra crate and is portable.
    pub fn spawn_watching(self: &Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let watcher = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(poll_interval);
            let mut last_modified = file_modified_time(&watcher.config_path).await;
            loop {
                tick.tick().await;
                let Some(modified) = file_modified_time(&watcher.config_path).await else {
                    warn!("config hot-reload: could not stat '{}'", watcher.config_path);
                    continue;
                };
                if Some(modified) == last_modified {
                    continue;
                }
                match watcher.reload().await {
                    Ok(update) => info!("configuration reloaded (version {})", update.version),
                    Err(reason) => warn!("configuration reload rejected: {reason}"),
                }
                last_modified = Some(modified);
            }
        })
    }

    /// Reloads immediately, regardless of mtime — used by tests and any
    /// future admin-triggered reload surface.
    pub async fn reload(&self) -> Result<ConfigUpdate, String> {
        let settings = load_settings_from_path(&self.config_path).map_err(|e| format!("failed to load config: {e}"))?;
        self.apply(settings).await
    }

    async fn apply(&self, settings: Settings) -> Result<ConfigUpdate, String> {
        let validation = ConfigValidator::validate_comprehensive(&settings);
        if !validation.is_valid {
            return Err(validation.errors.join(", "));
        }
        for warning in &validation.warnings {
            warn!("config hot-reload validation warning: {warning}");
        }

        let version = self.version_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let update = ConfigUpdate {
            settings,
            timestamp: chrono::Utc::now(),
            version,
        };
        *self.current.write().await = update.clone();
        let _ = self.update_sender.send(update.clone());
        Ok(update)
    }
}

async fn file_modified_time(path: &str) -> Option<std::time::SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Unlike `settings::load_settings`, this has no path-traversal guard: the
/// watcher reloads a path that was already accepted (and potentially outside
/// the working directory, e.g. a mounted config volume) at startup.
fn load_settings_from_path(path: &str) -> Result<Settings, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn watcher_starts_at_version_one() {
        let watcher = ConfigWatcher::new(Settings::default(), "nonexistent.json".to_string());
        let current = watcher.current().await;
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn reload_picks_up_file_changes_and_bumps_version() {
        let file = NamedTempFile::new().unwrap();
        let mut settings = Settings::default();
        settings.port = 9000;
        std::fs::write(file.path(), serde_json::to_string(&settings).unwrap()).unwrap();

        let watcher = ConfigWatcher::new(Settings::default(), file.path().to_string_lossy().to_string());

        settings.port = 9100;
        std::fs::write(file.path(), serde_json::to_string(&settings).unwrap()).unwrap();

        let update = watcher.reload().await.unwrap();
        assert_eq!(update.version, 2);
        assert_eq!(update.settings.port, 9100);
        assert_eq!(watcher.current().await.settings.port, 9100);
    }

    #[tokio::test]
    async fn reload_rejects_invalid_settings_and_keeps_last_good() {
        let file = NamedTempFile::new().unwrap();
        let mut settings = Settings::default();
        settings.port = 1234;
        std::fs::write(file.path(), serde_json::to_string(&settings).unwrap()).unwrap();

        let watcher = ConfigWatcher::new(Settings::default(), file.path().to_string_lossy().to_string());
        watcher.reload().await.unwrap();

        settings.port = 0; // invalid: port must be nonzero
        std::fs::write(file.path(), serde_json::to_string(&settings).unwrap()).unwrap();

        let result = watcher.reload().await;
        assert!(result.is_err());
        assert_eq!(watcher.current().await.settings.port, 1234);
    }

    #[tokio::test]
    async fn subscribers_receive_published_updates() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string(&Settings::default()).unwrap()).unwrap();

        let watcher = ConfigWatcher::new(Settings::default(), file.path().to_string_lossy().to_string());
        let mut rx = watcher.subscribe();
        watcher.reload().await.unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.version, 2);
    }
}
