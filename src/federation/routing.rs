//! Namespace-based backend selection.
//!
//! Picks which active adapters an operation fans out to.

use crate::config::{MatchKind, RouteRuleConfig, RoutingConfig};
use tracing::warn;

/// Chooses the ordered backend set for a namespace.
pub trait BackendSelector: Send + Sync {
    /// Select from `available` (active adapters, registration order).
    ///
    /// The returned order is the merge order.
    fn select_backends(&self, namespace: &str, available: &[String]) -> Vec<String>;
}

/// Every active adapter, in registration order.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllBackends;

impl BackendSelector for AllBackends {
    fn select_backends(&self, _namespace: &str, available: &[String]) -> Vec<String> {
        available.to_vec()
    }
}

/// Routing rule.
#[derive(Clone, Debug)]
pub struct RouteRule {
    /// Lowercased pattern
    pattern: String,
    match_kind: MatchKind,
    backends: Vec<String>,
}

impl RouteRule {
    /// Create a new rule.
    pub fn new(pattern: &str, match_kind: MatchKind, backends: Vec<String>) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            match_kind,
            backends,
        }
    }

    /// Check if a (lowercased) namespace matches.
    fn matches(&self, namespace: &str) -> bool {
        match self.match_kind {
            MatchKind::Prefix => namespace.starts_with(&self.pattern),
            MatchKind::Contains => namespace.contains(&self.pattern),
        }
    }
}

impl From<&RouteRuleConfig> for RouteRule {
    fn from(config: &RouteRuleConfig) -> Self {
        Self::new(&config.pattern, config.match_kind, config.backends.clone())
    }
}

/// Rule-based router. First matching rule wins.
#[derive(Clone, Debug, Default)]
pub struct NamespaceRouter {
    rules: Vec<RouteRule>,
    /// `None` falls back to every available adapter
    fallback: Option<Vec<String>>,
}

impl NamespaceRouter {
    /// Create a router with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration.
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            rules: config.rules.iter().map(RouteRule::from).collect(),
            fallback: config.fallback.clone(),
        }
    }

    /// Add a rule after the existing ones.
    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the fallback backend list.
    pub fn with_fallback(mut self, backends: Vec<String>) -> Self {
        self.fallback = Some(backends);
        self
    }

    fn candidates<'a>(&'a self, namespace: &str) -> Option<&'a [String]> {
        let namespace = namespace.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&namespace))
            .map(|r| r.backends.as_slice())
            .or(self.fallback.as_deref())
    }
}

impl BackendSelector for NamespaceRouter {
    fn select_backends(&self, namespace: &str, available: &[String]) -> Vec<String> {
        let Some(candidates) = self.candidates(namespace) else {
            return available.to_vec();
        };

        let mut selected: Vec<String> = Vec::with_capacity(candidates.len());
        for name in candidates {
            if !available.contains(name) {
                warn!(backend = %name, namespace, "routed backend is not active, skipping");
            } else if !selected.contains(name) {
                selected.push(name.clone());
            }
        }
        selected
    }
}
