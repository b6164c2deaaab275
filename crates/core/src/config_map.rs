//! ConfigMap: a named string map used as an external disable gate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster-scoped key/value object, identified by name only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub name: String,

    /// Store-assigned version (0 = never stored)
    #[serde(default)]
    pub resource_version: u64,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create a ConfigMap with a single entry
    pub fn with_entry(name: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.into(), value.into());
        Self {
            name: name.into(),
            resource_version: 0,
            data,
        }
    }
}
