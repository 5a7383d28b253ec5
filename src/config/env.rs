//! Environment-variable configuration.
//!
//! Mirrors the deployment variables the memory services were historically
//! configured with. An adapter whose required key is missing is skipped.

use super::{
    AdapterConfig, FederationConfig, HttpMemoryConfig, KeyValueConfig, RetryConfig,
    VectorIndexConfig,
};
use tracing::{debug, info};

pub(super) fn from_lookup<F>(lookup: F) -> FederationConfig
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let mut config = FederationConfig::default();

    if let Some(ms) = get("MEMFED_FANOUT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.engine.fanout_timeout_ms = ms;
    }
    if let Some(level) = get("MEMFED_LOG_LEVEL") {
        config.logging.level = level;
    }

    let mut retry = RetryConfig::default();
    if let Some(n) = get("MEMFED_MAX_RETRIES").and_then(|v| v.parse().ok()) {
        retry.max_retries = n;
    }
    if let Some(f) = get("MEMFED_BACKOFF_FACTOR").and_then(|v| v.parse().ok()) {
        retry.backoff_factor = f;
    }

    match (get("PINECONE_API_KEY"), get("PINECONE_INDEX_HOST")) {
        (Some(api_key), Some(index_host)) => {
            config.adapters.push(AdapterConfig::VectorIndex(VectorIndexConfig {
                name: "pinecone".to_string(),
                api_key,
                index_host,
                index_name: get("PINECONE_INDEX_NAME").unwrap_or_else(|| "quantum-memory".into()),
                namespace: get("PINECONE_NAMESPACE"),
                dimension: 1536,
                retry: retry.clone(),
            }));
        }
        (Some(_), None) => info!("pinecone adapter skipped - PINECONE_INDEX_HOST not set"),
        _ => debug!("pinecone adapter skipped - missing config"),
    }

    if let Some(api_key) = get("MEM0_API_KEY") {
        let mut kv = KeyValueConfig {
            name: "mem0".to_string(),
            api_key,
            api_key_secondary: get("MEM0_API_KEY_SECONDARY"),
            base_url: "https://api.mem0.ai".to_string(),
            retry: retry.clone(),
        };
        if let Some(url) = get("MEM0_BASE_URL") {
            kv.base_url = url;
        }
        config.adapters.push(AdapterConfig::KeyValue(kv));
    } else {
        debug!("mem0 adapter skipped - missing config");
    }

    let supermemory_key = get("SUPERMEMORY_API_KEY");
    let supermemory_url = get("SUPERMEMORY_URL").or_else(|| get("SUPERMEMORY_BASE_URL"));
    if supermemory_key.is_some() || supermemory_url.is_some() {
        config.adapters.push(AdapterConfig::HttpMemory(HttpMemoryConfig {
            name: "supermemory".to_string(),
            base_url: supermemory_url.unwrap_or_else(|| "http://localhost:3000".into()),
            api_key: supermemory_key,
            bucket: None,
            retry: retry.clone(),
        }));
    } else {
        debug!("supermemory adapter skipped - missing config");
    }

    if let Some(api_key) = get("MEMORYPLUGIN_API_KEY") {
        config.adapters.push(AdapterConfig::HttpMemory(HttpMemoryConfig {
            name: "memoryplugin".to_string(),
            base_url: get("MEMORYPLUGIN_BASE_URL")
                .unwrap_or_else(|| "https://api.memoryplugin.com".into()),
            api_key: Some(api_key),
            bucket: get("MEMORYPLUGIN_BUCKET"),
            retry,
        }));
    } else {
        debug!("memoryplugin adapter skipped - missing config");
    }

    if config.adapters.is_empty() {
        info!("no remote memory backends configured, using local store");
        config.adapters.push(AdapterConfig::in_memory("local"));
    }

    config
}
