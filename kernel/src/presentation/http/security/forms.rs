use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::error_handler::{ErrorHandler, ErrorLevel};
use crate::bootstrap::error::KernelError;
use crate::domain::session::Session;

static FORM_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w{3,32}$").expect("valid regex"));

const BAG: &str = "obfuscated_forms";
const KEY_LEN: usize = 12;

/// A form whose field names are replaced with per-session random names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObfuscatedForm {
    name: String,
    hash: String,
    fields: BTreeMap<String, String>,
    #[serde(skip)]
    input: Map<String, Value>,
}

impl ObfuscatedForm {
    pub fn new<S: AsRef<str>>(name: &str, fields: &[S]) -> Self {
        let mut taken = HashSet::new();
        let fields = fields
            .iter()
            .map(|field| {
                let mut key = random_key();
                while !taken.insert(key.clone()) {
                    key = random_key();
                }
                (field.as_ref().to_string(), key)
            })
            .collect();

        let mut hash = [0u8; 16];
        rand::thread_rng().fill(&mut hash);
        Self {
            name: name.to_string(),
            hash: hex::encode(hash),
            fields,
            input: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Obfuscated name of a real field.
    pub fn key(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Binds submitted input; [`value`](Self::value) reads from it.
    pub fn input(&mut self, payload: Map<String, Value>) -> &mut Self {
        self.input = payload;
        self
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.input.get(self.key(field)?)
    }
}

fn random_key() -> String {
    let tail: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LEN - 1)
        .map(char::from)
        .collect();
    // Leading letter keeps the name usable as an HTML id.
    let head = char::from(rand::thread_rng().gen_range(b'a'..=b'z'));
    format!("{head}{tail}")
}

/// Obfuscated forms stored in the session meta.
pub struct Forms<'a> {
    session: &'a mut Session,
    errors: &'a ErrorHandler,
}

impl<'a> Forms<'a> {
    pub fn new(session: &'a mut Session, errors: &'a ErrorHandler) -> Self {
        Self { session, errors }
    }

    /// Returns the stored form or obfuscates a new one.
    pub fn get<S: AsRef<str>>(&mut self, name: &str, fields: &[S]) -> Result<ObfuscatedForm, KernelError> {
        match self.retrieve(name)? {
            Some(form) => Ok(form),
            None => self.obfuscate(name, fields),
        }
    }

    pub fn obfuscate<S: AsRef<str>>(&mut self, name: &str, fields: &[S]) -> Result<ObfuscatedForm, KernelError> {
        validate(name)?;
        let form = ObfuscatedForm::new(name, fields);
        let encoded = serde_json::to_value(&form)
            .map_err(|e| KernelError::InvalidArgument(format!("Failed to store obfuscated form: {e}")))?;
        self.session.meta_mut().bag_mut(BAG).set(name, encoded);
        Ok(form)
    }

    pub fn retrieve(&mut self, name: &str) -> Result<Option<ObfuscatedForm>, KernelError> {
        validate(name)?;
        let Some(stored) = self.session.meta().bag(BAG).and_then(|b| b.get(name)).cloned() else {
            return Ok(None);
        };
        match serde_json::from_value::<ObfuscatedForm>(stored) {
            Ok(form) if form.name == name => Ok(Some(form)),
            _ => {
                self.errors.trigger(
                    format!("Failed to unserialize obfuscated form \"{name}\""),
                    ErrorLevel::Warning,
                );
                self.purge(name);
                Ok(None)
            }
        }
    }

    pub fn purge(&mut self, name: &str) {
        self.session.meta_mut().bag_mut(BAG).delete(name);
    }

    pub fn flush(&mut self) {
        self.session.meta_mut().delete_bag(BAG);
    }
}

fn validate(name: &str) -> Result<(), KernelError> {
    if FORM_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument("Invalid obfuscated form name".into()))
    }
}
