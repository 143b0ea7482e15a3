//! Encrypted credential blobs (bot token, linked-account tokens).
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call. The key id is bound
//! as associated data, so a blob produced under one key cannot be opened
//! (or silently mis-attributed) under another.

use std::fmt;

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{errors::Error, Result};

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const AAD_PREFIX: &[u8] = b"hlb-secret-v1:";

/// Encrypted-and-authenticated credential container.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBlob {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    pub key_id: String,
}

impl fmt::Debug for SecretBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBlob")
            .field("ciphertext", &format_args!("<{} bytes>", self.ciphertext.len()))
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// 256-bit symmetric key plus its public identifier.
pub struct SymmetricKey {
    bytes: SecretBox<[u8; KEY_BYTES]>,
    id: String,
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        let id = key_id(&bytes);
        Self {
            bytes: SecretBox::new(Box::new(bytes)),
            id,
        }
    }

    /// Parse a base64-encoded 32-byte key (the `ENCRYPTION_KEY` format).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|_| Error::Config("encryption key is not valid base64".to_string()))?;
        let bytes: [u8; KEY_BYTES] = raw.as_slice().try_into().map_err(|_| {
            Error::Config(format!(
                "encryption key must be {KEY_BYTES} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn key_id(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Holds the active key for the process lifetime; otherwise stateless.
#[derive(Debug)]
pub struct SecretStore {
    key: SymmetricKey,
}

impl SecretStore {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    pub fn key_id(&self) -> &str {
        self.key.id()
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.bytes.expose_secret())
            .map_err(|_| Error::Crypto("key material has invalid length".to_string()))
    }

    fn aad(&self) -> Vec<u8> {
        let mut aad = AAD_PREFIX.to_vec();
        aad.extend_from_slice(self.key.id().as_bytes());
        aad
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SecretBlob> {
        let cipher = self.cipher()?;
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let aad = self.aad();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Crypto("encryption failed".to_string()))?;

        Ok(SecretBlob {
            ciphertext,
            nonce: nonce.to_vec(),
            key_id: self.key.id().to_string(),
        })
    }

    pub fn decrypt(&self, blob: &SecretBlob) -> Result<Vec<u8>> {
        if blob.key_id != self.key.id() {
            return Err(Error::Crypto(format!(
                "blob was sealed with key {}, active key is {}",
                blob.key_id,
                self.key.id()
            )));
        }
        if blob.nonce.len() != NONCE_BYTES {
            return Err(Error::Crypto(format!(
                "nonce must be {NONCE_BYTES} bytes, got {}",
                blob.nonce.len()
            )));
        }

        let cipher = self.cipher()?;
        let aad = self.aad();
        cipher
            .decrypt(
                Nonce::from_slice(&blob.nonce),
                Payload {
                    msg: &blob.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Crypto("integrity check failed (wrong key or tampered data)".to_string()))
    }

    pub fn seal_str(&self, secret: &str) -> Result<SecretBlob> {
        self.encrypt(secret.as_bytes())
    }

    pub fn open_string(&self, blob: &SecretBlob) -> Result<SecretString> {
        let plaintext = self.decrypt(blob)?;
        let s = String::from_utf8(plaintext)
            .map_err(|_| Error::Crypto("decrypted secret is not valid UTF-8".to_string()))?;
        Ok(SecretString::from(s))
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        BASE64_STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
