//! Feature switch resolution across the four override tiers.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{Error, Result};

/// One override tier: flag name to value.
pub type FlagTier = BTreeMap<String, bool>;

/// Feature flag tiers snapshotted from the web client's init state.
///
/// Later tiers override earlier ones: `default_config < user < debug < custom_overrides`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlagState {
    pub default_config: FlagTier,
    pub user: FlagTier,
    pub debug: FlagTier,
    pub custom_overrides: FlagTier,
}

impl FeatureFlagState {
    /// Decode the flag tiers from an init-state object.
    ///
    /// Expects `featureSwitch.{defaultConfig,user,debug,customOverrides}`, each a
    /// map of `name -> {"value": bool}`. Missing tiers are treated as empty;
    /// entries with a non-boolean value are dropped.
    pub fn from_init_state(init_state: &Value) -> Result<Self> {
        let switches = init_state
            .get("featureSwitch")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Discovery("init state has no featureSwitch object".into()))?;

        let tier = |key: &str| decode_tier(key, switches.get(key));
        Ok(Self {
            default_config: tier("defaultConfig"),
            user: tier("user"),
            debug: tier("debug"),
            custom_overrides: tier("customOverrides"),
        })
    }

    fn tiers(&self) -> [&FlagTier; 4] {
        [
            &self.default_config,
            &self.user,
            &self.debug,
            &self.custom_overrides,
        ]
    }

    /// Merge all tiers and keep only the names in `allowed`.
    pub fn resolve(&self, allowed: &BTreeSet<String>) -> BTreeMap<String, bool> {
        let mut merged = BTreeMap::new();
        for tier in self.tiers() {
            for (name, value) in tier {
                merged.insert(name.as_str(), *value);
            }
        }
        merged
            .into_iter()
            .filter(|(name, _)| allowed.contains(*name))
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Total number of flag entries across tiers.
    pub fn len(&self) -> usize {
        self.tiers().iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn decode_tier(key: &str, raw: Option<&Value>) -> FlagTier {
    let Some(entries) = raw.and_then(Value::as_object) else {
        return FlagTier::new();
    };
    let mut tier = FlagTier::new();
    for (name, entry) in entries {
        match entry.get("value").and_then(Value::as_bool) {
            Some(value) => {
                tier.insert(name.clone(), value);
            }
            None => debug!("{}: dropping non-boolean flag '{}'", key, name),
        }
    }
    tier
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tier(pairs: &[(&str, bool)]) -> FlagTier {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn allowed(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_custom_overrides_win() {
        let state = FeatureFlagState {
            default_config: tier(&[("f", false)]),
            user: tier(&[("f", true)]),
            debug: tier(&[("f", true)]),
            custom_overrides: tier(&[("f", false)]),
        };
        let resolved = state.resolve(&allowed(&["f"]));
        assert_eq!(resolved.get("f"), Some(&false));
    }

    #[test]
    fn test_precedence_by_tier() {
        let state = FeatureFlagState {
            default_config: tier(&[("a", false), ("b", false), ("c", false)]),
            user: tier(&[("b", true)]),
            debug: tier(&[("c", true)]),
            custom_overrides: FlagTier::new(),
        };
        let resolved = state.resolve(&allowed(&["a", "b", "c"]));
        assert_eq!(resolved, tier(&[("a", false), ("b", true), ("c", true)]));
    }

    #[test]
    fn test_output_limited_to_allowed() {
        let state = FeatureFlagState {
            default_config: tier(&[("a", true), ("b", true)]),
            user: tier(&[("z", true)]),
            ..Default::default()
        };
        let resolved = state.resolve(&allowed(&["b", "missing"]));
        assert_eq!(resolved.len(), 1);
        assert!(resolved.keys().all(|k| k == "b"));
    }

    #[test]
    fn test_no_overlap_is_empty() {
        let state = FeatureFlagState {
            default_config: tier(&[("a", true)]),
            ..Default::default()
        };
        assert!(state.resolve(&allowed(&["x"])).is_empty());
        assert!(state.resolve(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_from_init_state() {
        let init = json!({
            "featureSwitch": {
                "defaultConfig": {
                    "a": { "value": true },
                    "rate": { "value": 25 }
                },
                "user": { "a": { "value": false } },
                "customOverrides": {}
            },
            "other": {}
        });
        let state = FeatureFlagState::from_init_state(&init).unwrap();
        assert_eq!(state.default_config, tier(&[("a", true)]));
        assert_eq!(state.user, tier(&[("a", false)]));
        assert!(state.debug.is_empty());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_from_init_state_missing_switches() {
        let err = FeatureFlagState::from_init_state(&json!({})).unwrap_err();
        assert!(err.is_retryable());
    }
}
