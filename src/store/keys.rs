//! Key layout of the shared store.

use serde::{Deserialize, Serialize};

/// Prefixes used to build every key the gateway reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyLayout {
    /// Prefix of per-bucket quota records.
    pub quota_prefix: String,

    /// Prefix of per-minute sliding window hashes.
    pub window_prefix: String,

    /// Prefix of catalog coordination keys and block markers.
    pub coordination_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            quota_prefix: "dynlimits_reqpermin".to_string(),
            window_prefix: "dynlimits_scw".to_string(),
            coordination_prefix: "dynlimits".to_string(),
        }
    }
}

impl KeyLayout {
    /// Quota record for a bucket: `{quota_prefix}_{bucket}`.
    #[must_use]
    pub fn quota_key(&self, bucket: &str) -> String {
        format!("{}_{bucket}", self.quota_prefix)
    }

    /// Window hash for a bucket and minute: `{window_prefix}_{minute}_{bucket}`.
    #[must_use]
    pub fn window_key(&self, minute: i64, bucket: &str) -> String {
        format!("{}_{minute}_{bucket}", self.window_prefix)
    }

    /// Marker held while an instance publishes a catalog.
    #[must_use]
    pub fn updating_key(&self) -> String {
        self.coordination_key("updating")
    }

    /// Unix time the last publish started.
    #[must_use]
    pub fn update_started_key(&self) -> String {
        self.coordination_key("update_started")
    }

    /// Unix time the last publish finished.
    #[must_use]
    pub fn update_finished_key(&self) -> String {
        self.coordination_key("update_finished")
    }

    /// Semantic version of the last published catalog.
    #[must_use]
    pub fn catalog_version_key(&self) -> String {
        self.coordination_key("catalog_version")
    }

    /// Content hash of the last published limits.
    #[must_use]
    pub fn limits_version_key(&self) -> String {
        self.coordination_key("limits_version")
    }

    /// Block marker for an API key.
    #[must_use]
    pub fn blocked_key(&self, api_key: &str) -> String {
        format!("{}_blocked_{api_key}", self.coordination_prefix)
    }

    fn coordination_key(&self, name: &str) -> String {
        format!("{}_{name}", self.coordination_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let keys = KeyLayout::default();
        assert_eq!(
            keys.quota_key("K_GET_/a/{id}"),
            "dynlimits_reqpermin_K_GET_/a/{id}"
        );
        assert_eq!(keys.window_key(33, "K_GET_/a"), "dynlimits_scw_33_K_GET_/a");
        assert_eq!(keys.updating_key(), "dynlimits_updating");
        assert_eq!(keys.limits_version_key(), "dynlimits_limits_version");
        assert_eq!(keys.blocked_key("K"), "dynlimits_blocked_K");
    }

    #[test]
    fn test_custom_prefixes_from_toml() {
        let keys: KeyLayout = toml::from_str(r#"quota_prefix = "q""#).unwrap();
        assert_eq!(keys.quota_key("b"), "q_b");
        assert_eq!(keys.window_prefix, "dynlimits_scw");
    }
}
