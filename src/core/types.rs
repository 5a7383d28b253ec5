//! Common types used across memfed modules.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 256-bit digest (SHA3-256).
///
/// Serialized as a lowercase hex string so audit exports stay readable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create a new Hash256 from bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a zero hash.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash256 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Fixed-offset zone used for the human-facing half of a [`DualTimestamp`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayZone {
    /// Offset from UTC in minutes (negative is west of Greenwich)
    pub offset_minutes: i32,
    /// Label appended to formatted times
    pub label: String,
}

impl DisplayZone {
    /// Create a display zone.
    pub fn new(offset_minutes: i32, label: &str) -> Self {
        Self {
            offset_minutes,
            label: label.to_string(),
        }
    }

    /// UTC display zone.
    pub fn utc() -> Self {
        Self::new(0, "UTC")
    }

    /// Format a UTC timestamp in this zone.
    pub fn format(&self, ts: &Timestamp) -> String {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60).unwrap_or(Utc.fix());
        format!(
            "{} {}",
            ts.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S"),
            self.label
        )
    }
}

impl Default for DisplayZone {
    /// Hawaii-Aleutian Standard Time.
    fn default() -> Self {
        Self::new(-600, "HST")
    }
}

/// A UTC instant paired with its display-zone rendering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualTimestamp {
    /// Canonical UTC instant
    pub utc: Timestamp,
    /// Same instant rendered in the display zone
    pub display: String,
}

impl DualTimestamp {
    /// Capture the current instant.
    pub fn now(zone: &DisplayZone) -> Self {
        Self::from_utc(now(), zone)
    }

    /// Build from an existing UTC instant.
    pub fn from_utc(utc: Timestamp, zone: &DisplayZone) -> Self {
        Self {
            display: zone.format(&utc),
            utc,
        }
    }
}

/// Keep at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
