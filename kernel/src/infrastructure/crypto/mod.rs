use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

const PREFIX: &str = "v1";

/// Entropy that ships in sample configuration files; never accepted as a key.
pub const DEFAULT_ENTROPY_WORDS: &str = "enter some random words here";

pub fn default_entropy() -> [u8; 32] {
    Sha256::digest(DEFAULT_ENTROPY_WORDS.as_bytes()).into()
}

/// AES-256-GCM cipher bound to one configured key.
#[derive(Clone)]
pub struct Cipher {
    label: String,
    key: Key<Aes256Gcm>,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").field("label", &self.label).finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn new(label: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            label: label.into(),
            key: Key::<Aes256Gcm>::from(key),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(&self.key);
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ct = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| anyhow::anyhow!("encrypt failed: {}", e))?;
        let mut out = Vec::with_capacity(12 + ct.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    pub fn decrypt(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        if payload.len() < 12 {
            anyhow::bail!("ciphertext too short");
        }
        let (nonce_bytes, ct) = payload.split_at(12);
        let cipher = Aes256Gcm::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ct)
            .map_err(|e| anyhow::anyhow!("decrypt failed: {}", e))
    }

    /// Text form: `v1:<nonce b64>:<ciphertext b64>`.
    pub fn encrypt_string(&self, plaintext: &str) -> anyhow::Result<String> {
        let sealed = self.encrypt(plaintext.as_bytes())?;
        let (nonce, ct) = sealed.split_at(12);
        let n_b64 = base64::engine::general_purpose::STANDARD.encode(nonce);
        let c_b64 = base64::engine::general_purpose::STANDARD.encode(ct);
        Ok(format!("{PREFIX}:{n_b64}:{c_b64}"))
    }

    pub fn decrypt_string(&self, ciphertext: &str) -> anyhow::Result<String> {
        let parts: Vec<&str> = ciphertext.splitn(3, ':').collect();
        if parts.len() != 3 || parts[0] != PREFIX {
            anyhow::bail!("invalid format");
        }
        let mut sealed = base64::engine::general_purpose::STANDARD
            .decode(parts[1])
            .map_err(|e| anyhow::anyhow!("b64 decode nonce: {}", e))?;
        if sealed.len() != 12 {
            anyhow::bail!("invalid nonce length");
        }
        let ct = base64::engine::general_purpose::STANDARD
            .decode(parts[2])
            .map_err(|e| anyhow::anyhow!("b64 decode ct: {}", e))?;
        sealed.extend_from_slice(&ct);
        let pt = self.decrypt(&sealed)?;
        Ok(String::from_utf8(pt)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let cipher = Cipher::new("primary", [7u8; 32]);
        let sealed = cipher.encrypt_string("hello world").unwrap();
        assert!(sealed.starts_with("v1:"));
        assert_eq!(cipher.decrypt_string(&sealed).unwrap(), "hello world");
    }

    #[test]
    fn wrong_key_and_bad_format_fail() {
        let a = Cipher::new("a", [1u8; 32]);
        let b = Cipher::new("b", [2u8; 32]);
        let sealed = a.encrypt_string("secret").unwrap();
        assert!(b.decrypt_string(&sealed).is_err());
        assert!(a.decrypt_string("plain text").is_err());
        assert!(a.decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn debug_hides_key() {
        let cipher = Cipher::new("primary", [0xAB; 32]);
        let dbg = format!("{cipher:?}");
        assert!(dbg.contains("primary"));
        assert!(!dbg.contains("171"));
    }
}
