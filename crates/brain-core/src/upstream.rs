//! The projected upstream configuration
//!
//! The upstream memory service reads this file once at startup. The core is
//! the only writer, but the upstream (or its tooling) may add keys of its
//! own; those MUST survive every rewrite, so the struct models the format as
//! three known projected fields plus an open residual captured via
//! `#[serde(flatten)]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream config file contents: resolved project paths, the projected
/// settings, and every unrecognized key preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Project name to resolved absolute memory-store path
    #[serde(default)]
    pub projects: BTreeMap<String, String>,
    /// Projected from `sync.enabled`
    #[serde(default)]
    pub sync_changes: bool,
    /// Projected from `sync.delay_ms`
    #[serde(default)]
    pub sync_delay: u64,
    /// Projected from `logging.level`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Unknown fields preserved across rewrites
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            projects: BTreeMap::new(),
            sync_changes: true,
            sync_delay: 500,
            log_level: default_log_level(),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = r#"{
            "projects": {"alpha": "/home/user/memories/alpha"},
            "sync_changes": true,
            "sync_delay": 500,
            "log_level": "info",
            "vendor_extension": {"nested": [1, 2, 3]},
            "api_token": "abc"
        }"#;
        let config: UpstreamConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.extra.len(), 2);

        let rewritten = serde_json::to_value(&config).unwrap();
        assert_eq!(rewritten["vendor_extension"]["nested"][1], 2);
        assert_eq!(rewritten["api_token"], "abc");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: UpstreamConfig = serde_json::from_str("{}").unwrap();
        assert!(config.projects.is_empty());
        assert_eq!(config.log_level, "info");
    }
}
