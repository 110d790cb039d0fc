use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::keys::GroupKey;

pub const NONCE_LEN: usize = 12;

/// Ciphertext and nonce, both base64, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedText {
    pub ciphertext: String,
    pub nonce: String,
}

fn cipher(key: &GroupKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt `text` under `key` with a fresh random nonce.
pub fn seal(key: &GroupKey, text: &str) -> Result<SealedText> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher(key)
        .encrypt(Nonce::from_slice(&nonce), text.as_bytes())
        .map_err(|e| anyhow!("encryption failed: {}", e))?;

    Ok(SealedText {
        ciphertext: BASE64.encode(ciphertext),
        nonce: BASE64.encode(nonce),
    })
}

/// Decrypt what [`seal`] produced. Fails on a wrong key, tampered
/// ciphertext or a malformed nonce.
pub fn open(key: &GroupKey, sealed: &SealedText) -> Result<String> {
    let ciphertext = BASE64
        .decode(&sealed.ciphertext)
        .context("ciphertext is not base64")?;
    let nonce = BASE64.decode(&sealed.nonce).context("nonce is not base64")?;
    if nonce.len() != NONCE_LEN {
        bail!("nonce is {} bytes, expected {}", nonce.len(), NONCE_LEN);
    }

    let plaintext = cipher(key)
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|e| anyhow!("decryption failed: {}", e))?;
    String::from_utf8(plaintext).context("plaintext is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = GroupKey::generate();
        let sealed = seal(&key, "Hello from Kestrel!").unwrap();
        assert_ne!(sealed.ciphertext, "Hello from Kestrel!");
        assert_eq!(open(&key, &sealed).unwrap(), "Hello from Kestrel!");
    }

    #[test]
    fn same_text_gets_a_fresh_nonce() {
        let key = GroupKey::generate();
        assert_ne!(seal(&key, "again").unwrap(), seal(&key, "again").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(&GroupKey::generate(), "Secret message").unwrap();
        assert!(open(&GroupKey::generate(), &sealed).is_err());
    }

    #[test]
    fn truncated_nonce_is_an_error_not_a_panic() {
        let key = GroupKey::generate();
        let mut sealed = seal(&key, "x").unwrap();
        sealed.nonce = BASE64.encode([0u8; 4]);
        assert!(open(&key, &sealed).is_err());
    }
}
