//! Template parameters.
//!
//! A spec is serialized to JSON and the `network`, `volume` and `server`
//! sections are converted into [`ParamValue`] trees. The projection is lossy
//! on purpose and template authors should rely only on the following:
//!
//! - JSON `null` (and a missing section) becomes [`ParamValue::Null`], which
//!   renders as the empty string.
//! - Numbers become integers; fractional parts are truncated.
//! - Mapping keys that are not text are dropped together with their value
//!   instead of failing the conversion. A JSON document only has text keys,
//!   so every key of a serialized spec is kept as is.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::resource::VirtualMachineSpec;

/// Spec sections exposed to templates.
pub const SECTIONS: [&str; 3] = ["network", "volume", "server"];

/// Parameters handed to the templates and to the backend, keyed by section.
pub type TemplateParams = BTreeMap<String, ParamValue>;

/// Generic parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Seq(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

#[cfg(test)]
impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key of a mapping value.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        match self {
            ParamValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<&JsonValue> for ParamValue {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => ParamValue::Null,
            JsonValue::Bool(b) => ParamValue::Bool(*b),
            JsonValue::Number(n) => ParamValue::Int(
                n.as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .unwrap_or_default(),
            ),
            JsonValue::String(s) => ParamValue::Str(s.clone()),
            JsonValue::Array(items) => ParamValue::Seq(items.iter().map(ParamValue::from).collect()),
            JsonValue::Object(map) => ParamValue::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), ParamValue::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Flatten a spec into template parameters.
///
/// Without a spec every section is `Null`.
pub fn flatten_spec(spec: Option<&VirtualMachineSpec>) -> Result<TemplateParams, serde_json::Error> {
    let doc = match spec {
        Some(spec) => serde_json::to_value(spec)?,
        None => JsonValue::Null,
    };
    Ok(flatten_document(&doc))
}

/// Flatten the template sections of an arbitrary JSON document.
pub fn flatten_document(doc: &JsonValue) -> TemplateParams {
    SECTIONS
        .iter()
        .map(|section| {
            let value = doc.get(section).map(ParamValue::from).unwrap_or(ParamValue::Null);
            (section.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{NetworkSpec, VolumeSpec};
    use serde_json::json;

    #[test]
    fn test_flatten_keeps_only_sections() {
        let spec = VirtualMachineSpec {
            network: NetworkSpec {
                name: "net".to_string(),
                cidr: "10.0.0.0/24".to_string(),
                ..Default::default()
            },
            volume: vec![VolumeSpec {
                volume_name: "data".to_string(),
                volume_type: "ssd".to_string(),
                volume_size: 20,
            }],
            software_config: b"#cloud-config".to_vec(),
            ..Default::default()
        };

        let params = flatten_spec(Some(&spec)).unwrap();
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["network", "server", "volume"]);
        assert_eq!(
            params["network"].get("cidr").and_then(ParamValue::as_str),
            Some("10.0.0.0/24")
        );
        let ParamValue::Seq(volumes) = &params["volume"] else {
            panic!("volume should be a sequence");
        };
        assert_eq!(volumes[0].get("volume_size"), Some(&ParamValue::Int(20)));
        assert_eq!(params["server"].get("key_name"), Some(&ParamValue::Null));
    }

    #[test]
    fn test_flatten_without_spec() {
        let params = flatten_spec(None).unwrap();
        assert_eq!(params.len(), 3);
        assert!(params.values().all(|v| *v == ParamValue::Null));
    }

    #[test]
    fn test_numbers_truncate_to_integers() {
        let params = flatten_document(&json!({"server": {"ratio": 2.9, "count": -3}}));
        assert_eq!(params["server"].get("ratio"), Some(&ParamValue::Int(2)));
        assert_eq!(params["server"].get("count"), Some(&ParamValue::Int(-3)));
    }

    #[test]
    fn test_every_text_key_is_kept() {
        let params = flatten_document(&json!({
            "network": {"": 1, "odd\u{0007}key": 2, "name": "net"}
        }));
        let ParamValue::Map(network) = &params["network"] else {
            panic!("network should be a mapping");
        };
        assert_eq!(network.len(), 3);
        assert_eq!(network[""], ParamValue::Int(1));
        assert_eq!(network["odd\u{0007}key"], ParamValue::Int(2));
        assert_eq!(network["name"], ParamValue::Str("net".to_string()));
    }

    #[test]
    fn test_serializes_untagged() {
        let params = flatten_document(&json!({"volume": [{"a": true}], "server": null}));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, json!({"network": null, "server": null, "volume": [{"a": true}]}));
    }
}
