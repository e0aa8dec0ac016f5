//! Deterministic callback identifiers.
//!
//! An id is the SHA-256 of the producer's identity plus its sorted trigger
//! dependencies, so declaring the same callback twice (or with its triggers in
//! a different order) always lands on the same registry entry.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::layout::STREAM_CONNECTOR_KIND;
use crate::types::{ComponentId, Dependency};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(String);

impl CallbackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pattern id of the stream connector element owned by this callback.
    pub fn connector_id(&self) -> ComponentId {
        ComponentId::pattern(STREAM_CONNECTOR_KIND, self.0.clone())
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallbackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CallbackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Derive the id for `identity` (fully qualified producer name) and its dependencies.
pub fn generate_callback_id(identity: &str, dependencies: &[Dependency]) -> CallbackId {
    let mut reprs: Vec<String> = dependencies.iter().map(ToString::to_string).collect();
    reprs.sort();
    let unique = format!("{identity}|{}", reprs.join(";"));
    CallbackId(format!("{:x}", Sha256::digest(unique.as_bytes())))
}

/// Recover a callback id from the value a client sent under the id key.
///
/// Accepts a bare id, a connector id object, or the connector id stringified.
pub fn parse_connector_reference(value: &Value) -> Option<CallbackId> {
    match value {
        Value::String(s) if s.starts_with('{') => {
            let parsed: Value = serde_json::from_str(s).ok()?;
            index_of(&parsed)
        }
        Value::String(s) if !s.is_empty() => Some(CallbackId(s.clone())),
        Value::Object(_) => index_of(value),
        _ => None,
    }
}

fn index_of(value: &Value) -> Option<CallbackId> {
    match value.get("index")? {
        Value::String(s) if !s.is_empty() => Some(CallbackId(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deps() -> Vec<Dependency> {
        vec![
            Dependency::input("stream-button", "n_clicks"),
            Dependency::state("chunk-size", "value"),
            Dependency::input("filter", "value"),
        ]
    }

    #[test]
    fn test_id_is_order_independent() {
        let forward = deps();
        let mut reversed = deps();
        reversed.reverse();
        assert_eq!(
            generate_callback_id("app::update_table", &forward),
            generate_callback_id("app::update_table", &reversed)
        );
    }

    #[test]
    fn test_distinct_identities_differ() {
        assert_ne!(
            generate_callback_id("app::update_table", &deps()),
            generate_callback_id("app::update_chart", &deps())
        );
    }

    #[test]
    fn test_distinct_dependencies_differ() {
        let a = generate_callback_id("app::f", &[Dependency::input("a", "value")]);
        let b = generate_callback_id("app::f", &[Dependency::state("a", "value")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_is_sha256_hex() {
        let id = generate_callback_id("app::f", &[]);
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // sha256("app::f|")
        let expected = format!("{:x}", Sha256::digest(b"app::f|"));
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn test_parse_connector_reference_forms() {
        let id = CallbackId::from("abc");
        let stringified = id.connector_id().to_key();
        assert_eq!(parse_connector_reference(&json!(stringified)), Some(id.clone()));
        assert_eq!(
            parse_connector_reference(&json!({"type": "streamback-event-stream", "index": "abc"})),
            Some(id.clone())
        );
        assert_eq!(parse_connector_reference(&json!("abc")), Some(id));
        assert_eq!(parse_connector_reference(&json!("")), None);
        assert_eq!(parse_connector_reference(&json!(12)), None);
        assert_eq!(parse_connector_reference(&json!("{not json")), None);
    }
}
