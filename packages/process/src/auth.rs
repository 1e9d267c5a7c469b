//! Per-invocation identity set by upstream guard layers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Exception, Value};

/// Data access constraints attached to an authorized identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConstraints {
    pub owner_only: bool,
    pub creator_only: bool,
    pub editor_only: bool,
    pub team_only: bool,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Identity record read by handlers. Handlers never mutate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizedInfo {
    pub subject: String,
    pub client_id: String,
    pub scope: String,
    pub session_id: String,
    pub user_id: String,
    pub team_id: String,
    pub tenant_id: String,
    pub remember_me: bool,
    pub constraints: DataConstraints,
}

impl AuthorizedInfo {
    /// Convert to a string-keyed mapping with snake_case field names.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(json) => match Value::from(json) {
                Value::Map(map) => map,
                _ => BTreeMap::new(),
            },
            Err(_) => BTreeMap::new(),
        }
    }

    /// Build from a string-keyed mapping; missing fields take defaults.
    pub fn from_map(map: &BTreeMap<String, Value>) -> Result<Self, Exception> {
        let json = Value::Map(map.clone()).to_json();
        serde_json::from_value(json)
            .map_err(|e| Exception::bad_request(format!("invalid authorized info: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_round_trip() {
        let info = AuthorizedInfo {
            subject: "sub-1".to_string(),
            user_id: "42".to_string(),
            team_id: "t-9".to_string(),
            remember_me: true,
            constraints: DataConstraints {
                owner_only: true,
                extra: BTreeMap::from([("region".to_string(), serde_json::json!("eu"))]),
                ..Default::default()
            },
            ..Default::default()
        };

        let map = info.to_map();
        assert_eq!(map.get("user_id"), Some(&Value::from("42")));
        assert_eq!(map.get("remember_me"), Some(&Value::Bool(true)));
        assert_eq!(
            map.get("constraints").and_then(|c| c.get("owner_only")),
            Some(&Value::Bool(true))
        );

        let back = AuthorizedInfo::from_map(&map).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn from_partial_map_uses_defaults() {
        let map = BTreeMap::from([("tenant_id".to_string(), Value::from("acme"))]);
        let info = AuthorizedInfo::from_map(&map).unwrap();
        assert_eq!(info.tenant_id, "acme");
        assert!(!info.constraints.team_only);
    }

    #[test]
    fn from_map_rejects_wrong_types() {
        let map = BTreeMap::from([("remember_me".to_string(), Value::from("yes"))]);
        assert_eq!(AuthorizedInfo::from_map(&map).unwrap_err().code, 400);
    }
}
