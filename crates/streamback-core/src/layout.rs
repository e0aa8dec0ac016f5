//! Layout composition contract.
//!
//! The rendering framework is external; all streamback needs from it is a
//! tree of identified elements. Every registered callback gets one
//! always-present pair of elements: a stream connector (owns the transport
//! URL and the accumulated stream value) and a progress store.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::callback_id::CallbackId;
use crate::registry::StreamRegistry;
use crate::types::{ComponentId, PropMap};

pub const STREAM_CONNECTOR_KIND: &str = "streamback-event-stream";
pub const PROGRESS_STORE_KIND: &str = "streamback-event-stream-store";

/// A node of the rendered component tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentNode {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ComponentId>,
    #[serde(default)]
    pub props: PropMap,
    #[serde(default)]
    pub children: Vec<ComponentNode>,
}

impl ComponentNode {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            props: PropMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ComponentNode>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first, pre-order visit of this node and its descendants.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ComponentNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

pub struct ConnectorIds;

impl ConnectorIds {
    pub fn stream(callback_id: &CallbackId) -> ComponentId {
        callback_id.connector_id()
    }

    pub fn store(callback_id: &CallbackId) -> ComponentId {
        ComponentId::pattern(PROGRESS_STORE_KIND, callback_id.as_str())
    }
}

/// The connector + store pair for one callback. The connector starts idle
/// (`done`, no URL); triggering a callback points it at `endpoint`.
pub fn connector_pair(callback_id: &CallbackId, endpoint: &str) -> ComponentNode {
    let connector = ComponentNode::new("EventStream")
        .with_id(ConnectorIds::stream(callback_id))
        .with_prop("concat", true)
        .with_prop("done", true)
        .with_prop("url", Value::Null)
        .with_prop("endpoint", endpoint)
        .with_prop("value", Value::Null);
    let store = ComponentNode::new("Store")
        .with_id(ConnectorIds::store(callback_id))
        .with_prop("data", json!({}));
    ComponentNode::new("Div").with_children(vec![connector, store])
}

/// Prepend one connector pair per registered callback to `layout`.
pub fn inject_connectors(
    layout: Vec<ComponentNode>,
    registry: &StreamRegistry,
    endpoint: &str,
) -> Vec<ComponentNode> {
    let mut injected: Vec<ComponentNode> = registry
        .ids()
        .iter()
        .map(|id| connector_pair(id, endpoint))
        .collect();
    injected.extend(layout);
    injected
}
