use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::bootstrap::config::read_yaml;
use crate::bootstrap::error::KernelError;

static LANG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w\-]+$").expect("valid regex"));

pub type Dictionary = HashMap<String, String>;

/// Language files `<langs>/<lang>.yml` flattened into dotted keys.
#[derive(Debug)]
pub struct Translator {
    langs_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    fallback: Option<String>,
    cookie: Option<String>,
    loaded: RwLock<HashMap<String, Arc<Dictionary>>>,
}

impl Translator {
    pub fn new(langs_dir: impl Into<PathBuf>) -> Self {
        Self {
            langs_dir: langs_dir.into(),
            cache_dir: None,
            fallback: None,
            cookie: None,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Compiled dictionaries are also written to and read from `dir`.
    pub fn caching(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn fallback(mut self, lang: &str) -> Result<Self, KernelError> {
        self.fallback = Some(validate(lang)?);
        Ok(self)
    }

    pub fn cookie(mut self, name: impl Into<String>) -> Self {
        self.cookie = Some(name.into());
        self
    }

    pub fn fallback_language(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Name of the cookie carrying the visitor's language, if configured.
    pub fn cookie_name(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn load(&self, lang: &str) -> Result<Arc<Dictionary>, KernelError> {
        let lang = validate(lang)?;
        if let Some(dict) = self
            .loaded
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&lang)
        {
            return Ok(dict.clone());
        }

        let dict = Arc::new(match self.read_compiled(&lang) {
            Some(dict) => dict,
            None => self.compile(&lang)?,
        });
        self.loaded
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(lang.clone(), dict.clone());
        tracing::debug!(lang = %lang, entries = dict.len(), "language_loaded");
        Ok(dict)
    }

    /// Looks `key` up in `lang`, then in the fallback language.
    pub fn translate(&self, key: &str, lang: Option<&str>) -> Option<String> {
        let key = key.to_lowercase();
        let candidates = lang.into_iter().chain(self.fallback.as_deref());
        for lang in candidates {
            match self.load(lang) {
                Ok(dict) => {
                    if let Some(found) = dict.get(&key) {
                        return Some(found.clone());
                    }
                }
                Err(e) => tracing::warn!(lang = %lang, error = %e, "language_load_failed"),
            }
        }
        None
    }

    fn compile(&self, lang: &str) -> Result<Dictionary, KernelError> {
        let path = self.langs_dir.join(format!("{lang}.yml"));
        if !path.is_file() {
            return Err(KernelError::Translator(format!(
                "Language \"{lang}\" file not found"
            )));
        }
        let tree = read_yaml(&path)
            .map_err(|e| KernelError::Translator(format!("Failed to parse language \"{lang}\": {e}")))?;
        let mut dict = Dictionary::new();
        flatten("", &tree, &mut dict);

        if let Some(dir) = &self.cache_dir {
            if let Ok(json) = serde_json::to_vec(&dict) {
                if let Err(e) = std::fs::write(compiled_path(dir, lang), json) {
                    tracing::warn!(lang = %lang, error = %e, "language_cache_write_failed");
                }
            }
        }
        Ok(dict)
    }

    fn read_compiled(&self, lang: &str) -> Option<Dictionary> {
        let bytes = std::fs::read(compiled_path(self.cache_dir.as_deref()?, lang)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

fn compiled_path(dir: &Path, lang: &str) -> PathBuf {
    dir.join(format!("translator.{lang}.json.cache"))
}

fn validate(lang: &str) -> Result<String, KernelError> {
    if LANG_RE.is_match(lang) {
        Ok(lang.to_lowercase())
    } else {
        Err(KernelError::Translator("Invalid language name".into()))
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Dictionary) {
    let key = |k: &str| {
        if prefix.is_empty() {
            k.to_lowercase()
        } else {
            format!("{prefix}.{}", k.to_lowercase())
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&key(k), v, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}
