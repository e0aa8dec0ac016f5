//! The live UI as the client sees it.

use serde_json::Value;
use tracing::{debug, warn};

use streamback_core::layout::ComponentNode;
use streamback_core::{ComponentId, PropMap};

/// Narrow contract onto the rendering framework: apply a property update to
/// every live element a target addresses, and surface a message to the user.
pub trait UiHandle {
    fn set_props(&mut self, target: &ComponentId, props: &PropMap);

    fn alert(&mut self, message: &str) {
        warn!(message, "Stream error");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveComponent {
    pub id: ComponentId,
    pub kind: String,
    pub props: PropMap,
}

/// In-memory live component table.
#[derive(Debug, Default)]
pub struct LiveComponents {
    components: Vec<LiveComponent>,
    alerts: Vec<String>,
}

impl LiveComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every identified node of a rendered layout.
    pub fn from_layout(layout: &[ComponentNode]) -> Self {
        let mut live = Self::new();
        for root in layout {
            root.walk(&mut |node| {
                if let Some(id) = &node.id {
                    live.insert(id.clone(), node.kind.clone(), node.props.clone());
                }
            });
        }
        live
    }

    pub fn insert(&mut self, id: ComponentId, kind: impl Into<String>, props: PropMap) {
        match self.components.iter_mut().find(|c| c.id == id) {
            Some(existing) => existing.props = props,
            None => self.components.push(LiveComponent {
                id,
                kind: kind.into(),
                props,
            }),
        }
    }

    pub fn get(&self, id: &ComponentId) -> Option<&LiveComponent> {
        self.components.iter().find(|c| &c.id == id)
    }

    /// Current value of `id.property`, `Null` if either is missing.
    pub fn prop(&self, id: &ComponentId, property: &str) -> Value {
        self.get(id)
            .and_then(|c| c.props.get(property))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Every live element `selector` addresses.
    pub fn matching<'a>(&'a self, selector: &'a ComponentId) -> impl Iterator<Item = &'a LiveComponent> {
        self.components.iter().filter(move |c| selector.matches(&c.id))
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl UiHandle for LiveComponents {
    fn set_props(&mut self, target: &ComponentId, props: &PropMap) {
        let mut applied = 0;
        for component in self.components.iter_mut().filter(|c| target.matches(&c.id)) {
            for (key, value) in props {
                component.props.insert(key.clone(), value.clone());
            }
            applied += 1;
        }
        if applied == 0 {
            debug!(%target, "Property update addressed no live component");
        }
    }

    fn alert(&mut self, message: &str) {
        warn!(message, "Stream error");
        self.alerts.push(message.to_string());
    }
}
