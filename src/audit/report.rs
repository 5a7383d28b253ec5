//! Signed forensic report over the audit chain.

use crate::audit::chain::{AuditChain, ChainVerification};
use crate::audit::entry::AuditEntry;
use crate::core::crypto::{canonical_json, verify, verifying_key_from_hex, CryptoSuite};
use crate::core::{now, DisplayZone, Error, Result, Timestamp};
use crate::monitoring::MetricsSnapshot;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Entries included in a report's tail.
pub const REPORT_TAIL_LEN: usize = 10;

/// Digest label recorded in every report.
pub const HASH_ALGORITHM: &str = "SHA3-256";

const SIGNATURE_FIELD: &str = "signature";

/// Point-in-time integrity report, signed with Ed25519.
///
/// The signature covers the canonical JSON of every other field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForensicReport {
    pub report_id: String,
    pub generated_at: Timestamp,
    pub generated_at_display: String,
    pub hash_algorithm: String,
    pub chain_verification: ChainVerification,
    pub chain_length: u64,
    pub head_hash: String,
    pub recent_entries: Vec<AuditEntry>,
    pub metrics: MetricsSnapshot,
    pub active_backends: Vec<String>,
    /// Hex Ed25519 verifying key
    pub verifying_key: String,
    /// Base64 Ed25519 signature
    pub signature: String,
}

impl ForensicReport {
    /// Build and sign a report for the current chain state.
    pub fn build(
        chain: &AuditChain,
        metrics: MetricsSnapshot,
        active_backends: Vec<String>,
        zone: &DisplayZone,
        crypto: &CryptoSuite,
    ) -> Result<Self> {
        let generated_at = now();
        let mut report = Self {
            report_id: Uuid::new_v4().to_string(),
            generated_at_display: zone.format(&generated_at),
            generated_at,
            hash_algorithm: HASH_ALGORITHM.to_string(),
            chain_verification: chain.verify_detailed(),
            chain_length: chain.len() as u64,
            head_hash: chain.head_hash(),
            recent_entries: chain.export_tail(REPORT_TAIL_LEN),
            metrics,
            active_backends,
            verifying_key: crypto.verifying_key_hex(),
            signature: String::new(),
        };

        let signature = crypto.sign(report.signed_payload()?.as_bytes());
        report.signature = STANDARD.encode(signature);

        info!(
            report_id = %report.report_id,
            chain_length = report.chain_length,
            chain_valid = report.chain_verification.valid,
            "forensic report generated"
        );
        Ok(report)
    }

    /// Canonical JSON of the report without its signature.
    pub fn signed_payload(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove(SIGNATURE_FIELD);
        }
        canonical_json(&value)
    }

    /// Check the signature against the embedded verifying key.
    pub fn verify_signature(&self) -> Result<()> {
        let key = verifying_key_from_hex(&self.verifying_key)?;
        let signature = STANDARD
            .decode(&self.signature)
            .map_err(|e| Error::InvalidKeyFormat(e.to_string()))?;
        verify(&key, self.signed_payload()?.as_bytes(), &signature)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}
