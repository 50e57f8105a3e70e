use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::bootstrap::error::KernelError;

static PROP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.]{3,32}$").expect("valid regex"));

const RESERVED: [&str; 5] = ["title", "index", "root", "token", "assets"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
}

/// Model handed to templates: well-known props plus custom scalar props.
#[derive(Debug, Clone)]
pub struct Page {
    props: Map<String, Value>,
    assets: Vec<Asset>,
}

impl Page {
    pub fn new(root: impl Into<String>, token: Option<String>) -> Self {
        let mut props = Map::new();
        props.insert("title".into(), Value::Null);
        props.insert("language".into(), Value::Null);
        props.insert("index".into(), json!({"a": 0, "b": 0, "c": 0}));
        props.insert("root".into(), Value::String(root.into()));
        props.insert("token".into(), token.map(Value::String).unwrap_or(Value::Null));
        Self {
            props,
            assets: Vec::new(),
        }
    }

    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.props.insert("title".into(), Value::String(title.into()));
        self
    }

    pub fn language(&mut self, lang: impl Into<String>) -> &mut Self {
        self.props.insert("language".into(), Value::String(lang.into()));
        self
    }

    /// Navigation position, e.g. menu / submenu / tab.
    pub fn index(&mut self, a: i64, b: i64, c: i64) -> &mut Self {
        self.props.insert("index".into(), json!({"a": a, "b": b, "c": c}));
        self
    }

    pub fn prop(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, KernelError> {
        if !PROP_RE.is_match(name) {
            return Err(KernelError::InvalidArgument("Invalid page property name".into()));
        }
        if RESERVED.contains(&name.to_lowercase().as_str()) {
            return Err(KernelError::InvalidArgument(format!(
                "Cannot override \"{name}\" page property"
            )));
        }
        let value = value.into();
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(KernelError::InvalidArgument(format!(
                "Value of type \"{}\" cannot be stored as page prop",
                if value.is_array() { "array" } else { "object" }
            )));
        }
        self.props.insert(name.to_string(), value);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn css(&mut self, uri: impl Into<String>) -> &mut Self {
        self.assets.push(Asset {
            kind: "css".into(),
            uri: uri.into(),
        });
        self
    }

    pub fn js(&mut self, uri: impl Into<String>) -> &mut Self {
        self.assets.push(Asset {
            kind: "js".into(),
            uri: uri.into(),
        });
        self
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn to_json(&self) -> Value {
        let mut out = self.props.clone();
        out.insert("assets".into(), json!(self.assets));
        Value::Object(out)
    }
}
