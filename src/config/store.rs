//! Live configuration shared by every subsystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::AppConfig;

/// Holds the current [`AppConfig`]; readers never block a reload.
pub struct ConfigStore {
    current: ArcSwap<AppConfig>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Load from `path` (or defaults) plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            path: path.map(Path::to_path_buf),
        })
    }

    /// Wrap an already validated config.
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            path: None,
        }
    }

    pub fn get(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the current config.
    pub fn store(&self, config: AppConfig) {
        self.current.store(Arc::new(config));
    }

    /// Re-read the source file. On error the current config is kept.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        let config = load_config(self.path.as_deref())?;
        self.store(config);
        Ok(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_swaps_snapshot() {
        let store = ConfigStore::from_config(AppConfig::default());
        let before = store.get();

        let mut next = AppConfig::default();
        next.runtime.debug = true;
        store.store(next);

        assert!(!before.runtime.debug);
        assert!(store.get().runtime.debug);
    }

    #[test]
    fn reload_keeps_current_on_error() {
        let path = std::env::temp_dir().join("dualserve_store_reload.toml");
        std::fs::write(&path, "[runtime]\ndebug = true\n").unwrap();
        let store = ConfigStore::load(Some(&path)).unwrap();
        assert!(store.get().runtime.debug);

        std::fs::write(&path, "[runtime\n").unwrap();
        assert!(store.reload().is_err());
        assert!(store.get().runtime.debug);

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
