//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered key/value blob persisted to inventory as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MtceInfo(IndexMap<String, String>);

impl MtceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or replace a key. Returns `true` when the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.0.insert(key.into(), value.clone()) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_owned())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_preserves_insertion_order() {
        let mut info = MtceInfo::new();
        info.set("mgmt_network", "enabled");
        info.set("bmc_protocol", "redfish");
        assert_eq!(
            info.to_json(),
            r#"{"mgmt_network":"enabled","bmc_protocol":"redfish"}"#
        );
        let back = MtceInfo::from_json(&info.to_json()).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn set_reports_changes() {
        let mut info = MtceInfo::new();
        assert!(info.set("a", "1"));
        assert!(!info.set("a", "1"));
        assert!(info.set("a", "2"));
        assert_eq!(info.remove("a").as_deref(), Some("2"));
        assert!(info.is_empty());
    }
}
