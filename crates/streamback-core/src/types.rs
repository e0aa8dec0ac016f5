use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{DONE_TOKEN, ERROR_TOKEN, INIT_TOKEN};

/// Open property set applied to a live component.
pub type PropMap = serde_json::Map<String, Value>;

/// Generator arguments: argument name -> value supplied by the client.
pub type TriggerPayload = serde_json::Map<String, Value>;

/// Baseline properties keyed by [`ComponentId::to_key`].
pub type ResetMap = BTreeMap<String, PropMap>;

/// Wildcard selectors accepted inside pattern ids.
const WILDCARDS: [&str; 2] = ["ALL", "MATCH"];

/// Identifier of a UI element.
///
/// Plain ids match exactly. Pattern ids are structured (`{"type": ..., "index": ...}`)
/// and match key-wise, with `["ALL"]` / `["MATCH"]` standing for any value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentId {
    Plain(String),
    Pattern(BTreeMap<String, Value>),
}

impl ComponentId {
    pub fn plain(id: impl Into<String>) -> Self {
        Self::Plain(id.into())
    }

    /// Build a `{"type": kind, "index": index}` pattern id.
    pub fn pattern(kind: impl Into<String>, index: impl Into<Value>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("type".to_string(), Value::String(kind.into()));
        map.insert("index".to_string(), index.into());
        Self::Pattern(map)
    }

    /// A selector matching every element of `kind`.
    pub fn all_of(kind: impl Into<String>) -> Self {
        Self::pattern(kind, Value::Array(vec![Value::String("ALL".into())]))
    }

    /// Lifecycle tokens occupy the target slot of a frame and can never name an element.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Plain(s) if s == INIT_TOKEN || s == DONE_TOKEN || s == ERROR_TOKEN)
    }

    /// Whether this id, used as a selector, addresses the live element `live`.
    pub fn matches(&self, live: &ComponentId) -> bool {
        match (self, live) {
            (Self::Plain(a), Self::Plain(b)) => a == b,
            (Self::Pattern(selector), Self::Pattern(actual)) => {
                selector.len() == actual.len()
                    && selector.iter().all(|(key, want)| match actual.get(key) {
                        Some(have) => is_wildcard(want) || want == have,
                        None => false,
                    })
            }
            _ => false,
        }
    }

    /// String form used as a map key (compact JSON with sorted keys for patterns).
    pub fn to_key(&self) -> String {
        match self {
            Self::Plain(s) => s.clone(),
            Self::Pattern(map) => serde_json::to_string(map).unwrap_or_default(),
        }
    }

    /// Inverse of [`ComponentId::to_key`].
    pub fn from_key(key: &str) -> Self {
        if key.starts_with('{') {
            if let Ok(map) = serde_json::from_str::<BTreeMap<String, Value>>(key) {
                return Self::Pattern(map);
            }
        }
        Self::Plain(key.to_string())
    }
}

fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::Array(items) => {
            items.len() == 1
                && items[0]
                    .as_str()
                    .is_some_and(|s| WILDCARDS.contains(&s))
        }
        _ => false,
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::Plain(id.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self::Plain(id)
    }
}

/// A (component, property) pair the client can watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub component: ComponentId,
    pub property: String,
}

impl PropertyRef {
    pub fn new(component: impl Into<ComponentId>, property: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.property)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Changes fire the callback.
    Input,
    /// Read when the callback fires, never fires it.
    State,
}

/// A declared trigger dependency of a streaming callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub component: ComponentId,
    pub property: String,
}

impl Dependency {
    pub fn input(component: impl Into<ComponentId>, property: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Input,
            component: component.into(),
            property: property.into(),
        }
    }

    pub fn state(component: impl Into<ComponentId>, property: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::State,
            component: component.into(),
            property: property.into(),
        }
    }

    pub fn source(&self) -> PropertyRef {
        PropertyRef {
            component: self.component.clone(),
            property: self.property.clone(),
        }
    }
}

/// Canonical rendering, hashed into callback ids.
impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DependencyKind::Input => "Input",
            DependencyKind::State => "State",
        };
        write!(f, "{kind}({}.{})", self.component, self.property)
    }
}
