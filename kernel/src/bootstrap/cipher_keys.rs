use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use subtle::ConstantTimeEq;

use crate::bootstrap::config::Config;
use crate::bootstrap::error::KernelError;
use crate::infrastructure::crypto::{Cipher, default_entropy};

static LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w{2,16}$").expect("valid regex"));

/// Ciphers for the labelled keys under `services.cipher.keys`.
#[derive(Debug)]
pub struct CipherKeys {
    config: Arc<Config>,
    keys: Mutex<HashMap<String, Arc<Cipher>>>,
}

impl CipherKeys {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, label: &str) -> Result<Arc<Cipher>, KernelError> {
        if !LABEL_RE.is_match(label) {
            return Err(KernelError::InvalidArgument("Invalid cipher key tag".into()));
        }
        let label = label.to_lowercase();

        let mut keys = self.keys.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cipher) = keys.get(&label) {
            return Ok(cipher.clone());
        }

        let cfg = self
            .config
            .services()
            .cipher()
            .ok_or_else(|| KernelError::Config("Cipher service is not configured".into()))?;
        let entropy = cfg
            .get(&label)
            .ok_or_else(|| KernelError::Config(format!("Cipher key \"{label}\" does not exist")))?;
        if bool::from(entropy.ct_eq(&default_entropy())) {
            return Err(KernelError::Config(format!(
                "Cipher key \"{label}\" is set to default value; Please change it first"
            )));
        }

        let cipher = Arc::new(Cipher::new(label.clone(), entropy));
        keys.insert(label, cipher.clone());
        Ok(cipher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(cipher: serde_json::Value) -> CipherKeys {
        let raw = json!({
            "time_zone": "UTC",
            "site": {"title": "t", "domain": "t.test", "https": false},
            "services": {"cipher": cipher},
        });
        CipherKeys::new(Arc::new(Config::from_value("test", &raw).unwrap()))
    }

    #[test]
    fn resolves_and_memoises() {
        let keys = keys(json!({"keys": {"primary": "correct horse battery staple"}}));
        let a = keys.get("Primary").unwrap();
        let b = keys.get("primary").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let sealed = a.encrypt_string("x").unwrap();
        assert_eq!(b.decrypt_string(&sealed).unwrap(), "x");
    }

    #[test]
    fn error_messages() {
        let keys = keys(json!({"keys": {"primary": "enter some random words here"}}));
        assert_eq!(
            keys.get("primary").unwrap_err().to_string(),
            "Cipher key \"primary\" is set to default value; Please change it first"
        );
        assert_eq!(
            keys.get("missing").unwrap_err().to_string(),
            "Cipher key \"missing\" does not exist"
        );
        assert!(matches!(keys.get("a"), Err(KernelError::InvalidArgument(_))));
    }
}
