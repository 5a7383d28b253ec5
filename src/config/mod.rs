//! Federation configuration.
//!
//! Configuration-driven adapter construction. Loaded once, consumed at
//! adapter construction time.

mod env;

use crate::core::{DisplayZone, Error, Result};
use crate::monitoring::logging::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Engine knobs
    pub engine: EngineConfig,
    /// Namespace routing
    pub routing: RoutingConfig,
    /// Logging setup
    pub logging: LoggerConfig,
    /// Mounted backends, in registration order
    pub adapters: Vec<AdapterConfig>,
}

impl FederationConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(doc: &str) -> Result<Self> {
        let config: FederationConfig = toml::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let doc = std::fs::read_to_string(path)?;
        Self::from_toml_str(&doc)
    }

    /// Build from process environment variables.
    pub fn from_env() -> Result<Self> {
        let config = env::from_lookup(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary variable lookup (used by tests and embedders).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = env::from_lookup(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Add an adapter.
    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.engine.fanout_timeout_ms == 0 {
            return Err(Error::Config("fanout_timeout_ms must be positive".into()));
        }
        if self.engine.default_search_limit == 0
            || self.engine.default_search_limit > self.engine.max_search_limit
        {
            return Err(Error::Config(format!(
                "default_search_limit must be in 1..={}",
                self.engine.max_search_limit
            )));
        }

        if self.engine.max_query_chars == 0 {
            return Err(Error::Config("max_query_chars must be positive".into()));
        }

        let mut names = HashSet::new();
        for adapter in &self.adapters {
            if adapter.name().is_empty() {
                return Err(Error::Config("adapter name must not be empty".into()));
            }
            if !names.insert(adapter.name().to_string()) {
                return Err(Error::Config(format!(
                    "duplicate adapter name: {}",
                    adapter.name()
                )));
            }
            if let Some(retry) = adapter.retry() {
                if retry.backoff_factor < 1.0 {
                    return Err(Error::Config(format!(
                        "adapter {}: backoff_factor must be >= 1.0",
                        adapter.name()
                    )));
                }
            }
        }

        let referenced = self
            .routing
            .rules
            .iter()
            .flat_map(|r| r.backends.iter())
            .chain(self.routing.fallback.iter().flatten());
        for name in referenced {
            if !names.contains(name) {
                return Err(Error::Config(format!(
                    "routing references unknown adapter: {}",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Engine-wide knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for a whole fan-out (ms)
    pub fanout_timeout_ms: u64,
    /// Largest accepted content payload
    pub max_content_bytes: usize,
    /// Display-zone offset from UTC (minutes)
    pub display_offset_minutes: i32,
    /// Display-zone label
    pub display_label: String,
    /// Search limit when the caller gives none
    pub default_search_limit: usize,
    /// Upper bound on caller-supplied search limits; also the per-backend
    /// fetch size
    pub max_search_limit: usize,
    /// Longest accepted search query (characters)
    pub max_query_chars: usize,
}

impl EngineConfig {
    /// Fan-out deadline as a duration.
    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }

    /// Zone used for the display half of dual timestamps.
    pub fn display_zone(&self) -> DisplayZone {
        DisplayZone::new(self.display_offset_minutes, &self.display_label)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let zone = DisplayZone::default();
        Self {
            fanout_timeout_ms: 30_000,
            max_content_bytes: 50_000,
            display_offset_minutes: zone.offset_minutes,
            display_label: zone.label,
            default_search_limit: 20,
            max_search_limit: 100,
            max_query_chars: 1000,
        }
    }
}

/// Retry tuning for one adapter's outbound calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Exponential backoff base
    pub backoff_factor: f64,
    /// Length of one backoff unit (ms)
    pub backoff_unit_ms: u64,
    /// Per-request timeout (ms)
    pub request_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 1.5,
            backoff_unit_ms: 1000,
            request_timeout_ms: 15_000,
        }
    }
}

/// One mounted backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    /// Vector index (Pinecone-style data plane)
    VectorIndex(VectorIndexConfig),
    /// Key-value memory service (Mem0-style)
    KeyValue(KeyValueConfig),
    /// Generic HTTP memory API (MemoryPlugin / SuperMemory)
    HttpMemory(HttpMemoryConfig),
    /// Process-local store
    InMemory(InMemoryConfig),
}

impl AdapterConfig {
    /// Adapter name (unique within a federation).
    pub fn name(&self) -> &str {
        match self {
            AdapterConfig::VectorIndex(c) => &c.name,
            AdapterConfig::KeyValue(c) => &c.name,
            AdapterConfig::HttpMemory(c) => &c.name,
            AdapterConfig::InMemory(c) => &c.name,
        }
    }

    /// Retry tuning, for adapters that talk to the network.
    pub fn retry(&self) -> Option<&RetryConfig> {
        match self {
            AdapterConfig::VectorIndex(c) => Some(&c.retry),
            AdapterConfig::KeyValue(c) => Some(&c.retry),
            AdapterConfig::HttpMemory(c) => Some(&c.retry),
            AdapterConfig::InMemory(_) => None,
        }
    }

    /// Convenience constructor for a local store.
    pub fn in_memory(name: &str) -> Self {
        AdapterConfig::InMemory(InMemoryConfig {
            name: name.to_string(),
        })
    }
}

/// Vector index configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Adapter name
    pub name: String,
    /// API key (sent as `Api-Key`)
    pub api_key: String,
    /// Index data-plane URL
    pub index_host: String,
    /// Index name (informational, reported in statistics)
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Index namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// Embedding dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Retry tuning
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_index_name() -> String {
    "memfed".to_string()
}

fn default_dimension() -> usize {
    1536
}

/// Key-value memory service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyValueConfig {
    /// Adapter name
    pub name: String,
    /// Primary API key
    pub api_key: String,
    /// Optional second account that mirrors writes
    #[serde(default)]
    pub api_key_secondary: Option<String>,
    /// Service URL
    #[serde(default = "default_kv_url")]
    pub base_url: String,
    /// Retry tuning
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_kv_url() -> String {
    "https://api.mem0.ai".to_string()
}

/// Generic HTTP memory API configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpMemoryConfig {
    /// Adapter name
    pub name: String,
    /// Service URL
    pub base_url: String,
    /// Bearer token
    #[serde(default)]
    pub api_key: Option<String>,
    /// Bucket namespace ensured at initialization
    #[serde(default)]
    pub bucket: Option<String>,
    /// Retry tuning
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Process-local store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Adapter name
    pub name: String,
}

/// Namespace routing configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Ordered rules, first match wins
    pub rules: Vec<RouteRuleConfig>,
    /// Backends for unmatched namespaces (all active adapters if unset)
    pub fallback: Option<Vec<String>>,
}

/// One routing rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteRuleConfig {
    /// Pattern matched against the namespace (case-insensitive)
    pub pattern: String,
    /// How the pattern is matched
    #[serde(default)]
    pub match_kind: MatchKind,
    /// Backends selected on match
    pub backends: Vec<String>,
}

/// Namespace pattern semantics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Namespace starts with the pattern
    #[default]
    Prefix,
    /// Namespace contains the pattern
    Contains,
}
