//! Config file watcher.
//!
//! Watches the directory holding the file so that editors replacing the
//! file by rename are still seen. Only validated configs that differ from
//! the last one reported reach the receiver.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    current: AppConfig,
    updates: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// `current` is the config already in use; reloading to it is a no-op.
    pub fn new(path: &Path, current: AppConfig) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current,
            updates,
        };
        (watcher, rx)
    }

    /// Start watching on notify's background thread.
    ///
    /// Updates stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            updates,
        } = self;
        let file_name: Option<OsString> = path.file_name().map(OsString::from);
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let config_path = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(OsString::from) == file_name);
                if !touches_file || !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                match load_config(Some(&config_path)) {
                    Ok(config) if config == current => {
                        tracing::debug!(path = %config_path.display(), "Config file touched, content unchanged");
                    }
                    Ok(config) => {
                        tracing::info!(path = %config_path.display(), "Config file changed, reloading");
                        current = config.clone();
                        let _ = updates.send(config);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Changed config rejected, keeping the current one");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_changed_config() {
        let dir = std::env::temp_dir().join("dualserve_watcher_change");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("app.toml");
        std::fs::write(&path, "[runtime]\ndefault_locale = \"en\"\n").unwrap();
        let current = load_config(Some(&path)).unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path, current);
        let _watcher = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "[runtime]\ndefault_locale = \"zh-tw\"\n").unwrap();

        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no update within 5s")
            .unwrap();
        assert_eq!(update.runtime.default_locale, "zh-tw");
    }
}
