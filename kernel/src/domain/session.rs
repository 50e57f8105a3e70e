use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SESSION_ID_LEN: usize = 64;

/// Named collection of JSON values with nested child bags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bag {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    bags: BTreeMap<String, Bag>,
}

impl Bag {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn bag(&self, name: &str) -> Option<&Bag> {
        self.bags.get(name)
    }

    /// Child bag, created on first use.
    pub fn bag_mut(&mut self, name: &str) -> &mut Bag {
        self.bags.entry(name.to_string()).or_default()
    }

    pub fn delete_bag(&mut self, name: &str) -> bool {
        self.bags.remove(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.bags.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.bags.clear();
    }
}

/// Values written during this request (`current`) and the ones carried over
/// from the previous request (`last`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    current: Bag,
    last: Bag,
}

impl Flash {
    pub fn current(&self) -> &Bag {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Bag {
        &mut self.current
    }

    pub fn last(&self) -> &Bag {
        &self.last
    }

    pub fn rotate(&mut self) {
        self.last = std::mem::take(&mut self.current);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    created_on: i64,
    last_used_on: i64,
    #[serde(default)]
    meta: Bag,
    #[serde(default)]
    data: Bag,
    #[serde(default)]
    flash: Flash,
}

impl Session {
    pub fn new(now: i64) -> Self {
        let mut entropy = [0u8; SESSION_ID_LEN / 2];
        rand::thread_rng().fill_bytes(&mut entropy);
        Self {
            id: hex::encode(entropy),
            created_on: now,
            last_used_on: now,
            meta: Bag::default(),
            data: Bag::default(),
            flash: Flash::default(),
        }
    }

    pub fn is_valid_id(id: &str) -> bool {
        id.len() == SESSION_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_on(&self) -> i64 {
        self.created_on
    }

    pub fn last_used_on(&self) -> i64 {
        self.last_used_on
    }

    pub fn touch(&mut self, now: i64) {
        self.last_used_on = now;
    }

    /// Kernel-internal bags (XSRF, obfuscated forms).
    pub fn meta(&self) -> &Bag {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Bag {
        &mut self.meta
    }

    /// Application data.
    pub fn data(&self) -> &Bag {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Bag {
        &mut self.data
    }

    pub fn flash(&self) -> &Flash {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut Flash {
        &mut self.flash
    }
}
