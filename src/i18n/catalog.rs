//! Message catalog backed by JSON message packs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};

use serde::Deserialize;
use serde_json::Value;

/// Renders a message for an error code in a locale.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, locale: &str, data: Option<&Value>) -> String;
}

/// A collection of templates for one locale.
#[derive(Debug, Clone, Deserialize)]
pub struct Pack {
    #[serde(default)]
    pub locale: String,
    pub messages: Vec<PackMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackMessage {
    pub key: String,
    /// Overrides the pack locale for this message.
    #[serde(default)]
    pub locale: Option<String>,
    pub tmpl: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid message pack {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

const BUILTIN: &str = include_str!("messages.json");

static BUILTIN_EN: OnceLock<Catalog> = OnceLock::new();

/// Shared English catalog of the built-in packs.
pub fn builtin() -> &'static Catalog {
    BUILTIN_EN.get_or_init(|| Catalog::with_builtin("en"))
}

/// Locale → key → template.
pub struct Catalog {
    default_locale: String,
    templates: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl Catalog {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into().to_lowercase(),
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Catalog preloaded with the built-in packs.
    pub fn with_builtin(default_locale: impl Into<String>) -> Self {
        let catalog = Self::new(default_locale);
        match serde_json::from_str::<Vec<Pack>>(BUILTIN) {
            Ok(packs) => packs.iter().for_each(|p| catalog.load_pack(p)),
            Err(e) => tracing::error!(error = %e, "Built-in message pack is invalid"),
        }
        catalog
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Add a pack, overwriting existing templates with the same key.
    pub fn load_pack(&self, pack: &Pack) {
        let pack_locale = if pack.locale.is_empty() {
            self.default_locale.clone()
        } else {
            pack.locale.to_lowercase()
        };
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        for message in &pack.messages {
            let locale = message
                .locale
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_else(|| pack_locale.clone());
            templates
                .entry(locale)
                .or_default()
                .insert(message.key.clone(), message.tmpl.clone());
        }
    }

    /// Load every `*.json` file in `dir`. A file may hold one pack or a list.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, CatalogError> {
        let io_err = |source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut loaded = 0;
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;
            for pack in parse_packs(&content).map_err(|source| CatalogError::Parse {
                path: path.display().to_string(),
                source,
            })? {
                self.load_pack(&pack);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    fn lookup(&self, key: &str, locale: &str) -> Option<String> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        templates
            .get(locale)
            .and_then(|t| t.get(key))
            .or_else(|| templates.get(&self.default_locale).and_then(|t| t.get(key)))
            .cloned()
    }
}

impl Translator for Catalog {
    fn translate(&self, key: &str, locale: &str, data: Option<&Value>) -> String {
        match self.lookup(key, locale) {
            Some(tmpl) => render(&tmpl, data),
            None => match data {
                Some(data) => format!("{key}: {data}"),
                None => key.to_string(),
            },
        }
    }
}

fn parse_packs(content: &str) -> Result<Vec<Pack>, serde_json::Error> {
    match serde_json::from_str::<Vec<Pack>>(content) {
        Ok(packs) => Ok(packs),
        Err(_) => serde_json::from_str::<Pack>(content).map(|p| vec![p]),
    }
}

/// Replace `{field}` with the matching field of `data`. Unknown fields render empty.
fn render(tmpl: &str, data: Option<&Value>) -> String {
    let mut out = String::with_capacity(tmpl.len());
    let mut rest = tmpl;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let field = &rest[start + 1..start + len];
        match data.and_then(|d| d.get(field)) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_placeholders() {
        let data = json!({"info": "disk full", "n": 3});
        assert_eq!(render("failed: {info} ({n})", Some(&data)), "failed: disk full (3)");
        assert_eq!(render("no {missing} here", Some(&data)), "no  here");
        assert_eq!(render("unclosed {info", Some(&data)), "unclosed {info");
    }

    #[test]
    fn shared_builtin_is_english() {
        assert_eq!(builtin().default_locale(), "en");
        assert_eq!(
            builtin().translate("ECMN-16-0", "en", None),
            "authentication required"
        );
    }

    #[test]
    fn unknown_locale_falls_back_to_default() {
        let catalog = Catalog::with_builtin("en");
        let data = json!({"info": "boom"});
        assert_eq!(
            catalog.translate("ECMN-02-0", "fr", Some(&data)),
            "internal error: boom"
        );
        assert_eq!(
            catalog.translate("ECMN-02-0", "zh-tw", Some(&data)),
            "內部錯誤：boom"
        );
    }

    #[test]
    fn unknown_key_echoes_data() {
        let catalog = Catalog::new("en");
        assert_eq!(catalog.translate("X-1", "en", None), "X-1");
        assert_eq!(
            catalog.translate("X-1", "en", Some(&json!({"info": "a"}))),
            r#"X-1: {"info":"a"}"#
        );
    }

    #[test]
    fn later_packs_override() {
        let catalog = Catalog::with_builtin("en");
        catalog.load_pack(&Pack {
            locale: "EN".into(),
            messages: vec![PackMessage {
                key: "ECMN-16-0".into(),
                locale: None,
                tmpl: "please sign in".into(),
            }],
        });
        assert_eq!(catalog.translate("ECMN-16-0", "en", None), "please sign in");
    }
}
