//! Digests and signatures.
//!
//! SHA3-256 for content hashes and the audit chain, Ed25519 for signing
//! forensic reports.

use crate::core::{Error, Hash256, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;
use sha3::{Digest, Sha3_256};

/// Signing suite used for forensic exports.
#[derive(Clone)]
pub struct CryptoSuite {
    signing_key: SigningKey,
}

impl CryptoSuite {
    /// Create a new CryptoSuite with a random key pair.
    pub fn new() -> Self {
        use rand::RngCore;
        let mut csprng = rand::rngs::OsRng;
        let mut secret_key_bytes = [0u8; 32];
        csprng.fill_bytes(&mut secret_key_bytes);
        let signing_key = SigningKey::from_bytes(&secret_key_bytes);
        Self { signing_key }
    }

    /// Create from existing signing key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Create from a hex-encoded secret key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| Error::InvalidKeyFormat(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyFormat("Secret key must be 32 bytes".into()))?;
        Ok(Self::from_bytes(&arr))
    }

    /// Get the verifying (public) key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded verifying key.
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Verify a signature made by this suite.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        verify(&self.verifying_key(), message, signature)
    }
}

impl Default for CryptoSuite {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a signature with a public key.
pub fn verify(public_key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| Error::InvalidKeyFormat("Invalid signature length".into()))?;
    let sig = Signature::from_bytes(&sig_bytes);
    public_key.verify(message, &sig)?;
    Ok(())
}

/// Parse a hex-encoded Ed25519 public key.
pub fn verifying_key_from_hex(key: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(key).map_err(|e| Error::InvalidKeyFormat(e.to_string()))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyFormat("Public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&arr).map_err(|e| Error::InvalidKeyFormat(e.to_string()))
}

/// Compute SHA3-256 hash of data.
pub fn sha3_256(data: &[u8]) -> Hash256 {
    sha3_256_multi(&[data])
}

/// Compute SHA3-256 hash of multiple data chunks.
pub fn sha3_256_multi(chunks: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha3_256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash256::new(bytes)
}

/// Digest of a text payload, used as the dedup key.
pub fn content_hash(content: &str) -> Hash256 {
    sha3_256(content.as_bytes())
}

/// Serialize to JSON with object keys in sorted order.
///
/// Struct field order and `HashMap` iteration order must not leak into the
/// bytes that get hashed.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&value)?)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// Digest of the canonical JSON form.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<Hash256> {
    Ok(sha3_256(canonical_json(value)?.as_bytes()))
}
