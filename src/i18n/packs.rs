//! Custom message packs as a lifecycle service.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConfigStore;
use crate::i18n::Catalog;
use crate::lifecycle::service::{BoxError, Service};

/// Loads `runtime.messages_dir` into the catalog on every `load`, so a reload
/// picks up edited packs.
pub struct MessagePacks {
    catalog: Arc<Catalog>,
    config: Arc<ConfigStore>,
}

impl MessagePacks {
    pub fn new(catalog: Arc<Catalog>, config: Arc<ConfigStore>) -> Self {
        Self { catalog, config }
    }

    fn dir(&self) -> Option<PathBuf> {
        self.config.get().runtime.messages_dir.as_ref().map(PathBuf::from)
    }
}

#[async_trait]
impl Service for MessagePacks {
    fn name(&self) -> &str {
        "message-packs"
    }

    async fn init(&self) -> Result<(), BoxError> {
        match self.dir() {
            Some(dir) if !dir.is_dir() => {
                Err(format!("messages_dir {} is not a directory", dir.display()).into())
            }
            _ => Ok(()),
        }
    }

    async fn load(&self) {
        let Some(dir) = self.dir() else {
            return;
        };
        let catalog = Arc::clone(&self.catalog);
        let path = dir.clone();
        match tokio::task::spawn_blocking(move || catalog.load_dir(&path)).await {
            Ok(Ok(packs)) => tracing::info!(dir = %dir.display(), packs, "Message packs loaded"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Message packs not loaded, keeping previous"),
            Err(e) => tracing::error!(error = %e, "Message pack loader panicked"),
        }
    }

    async fn delete(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::i18n::Translator;

    fn store(dir: Option<PathBuf>) -> Arc<ConfigStore> {
        let mut config = AppConfig::default();
        config.runtime.messages_dir = dir.map(|d| d.display().to_string());
        Arc::new(ConfigStore::from_config(config))
    }

    #[tokio::test]
    async fn init_rejects_missing_dir() {
        let packs = MessagePacks::new(
            Arc::new(Catalog::new("en")),
            store(Some(PathBuf::from("/definitely/not/here"))),
        );
        assert!(packs.init().await.is_err());
    }

    #[tokio::test]
    async fn load_overrides_builtin_messages() {
        let dir = std::env::temp_dir().join("dualserve_packs_load");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("custom.json"),
            r#"{"locale":"en","messages":[{"key":"ECMN-14-0","tmpl":"down for maintenance"}]}"#,
        )
        .unwrap();

        let catalog = Arc::new(Catalog::with_builtin("en"));
        let packs = MessagePacks::new(catalog.clone(), store(Some(dir)));
        packs.init().await.unwrap();
        packs.load().await;

        assert_eq!(catalog.translate("ECMN-14-0", "en", None), "down for maintenance");
    }
}
