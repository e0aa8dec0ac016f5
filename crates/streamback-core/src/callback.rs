//! Streaming callback registration.
//!
//! A streaming callback is a generator function: called once per trigger with
//! the trigger payload, it returns a [`Producer`] the endpoint pulls frames
//! from until exhaustion. [`CallbackBuilder`] is the registration contract;
//! misconfiguration fails at registration time, never at request time.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::callback_id::{CallbackId, generate_callback_id};
use crate::codec::encode_frame;
use crate::error::{Result, StreamError};
use crate::protocol::Frame;
use crate::registry::StreamRegistry;
use crate::types::{
    ComponentId, Dependency, DependencyKind, PropMap, PropertyRef, ResetMap, TriggerPayload,
};

/// Pull-based source of pre-encoded frames.
///
/// `None` ends the stream. `Some(Ok(None))` is a stray empty yield: the
/// endpoint logs and skips it. `Some(Err(_))` is a runtime fault.
pub trait Producer: Send {
    fn next_item(&mut self) -> Option<anyhow::Result<Option<Bytes>>>;
}

impl<I> Producer for I
where
    I: Iterator<Item = anyhow::Result<Option<Bytes>>> + Send,
{
    fn next_item(&mut self) -> Option<anyhow::Result<Option<Bytes>>> {
        self.next()
    }
}

pub type BoxProducer = Box<dyn Producer>;

/// Generator function: trigger payload in, lazy frame sequence out.
pub type GeneratorFn =
    Arc<dyn Fn(TriggerPayload, Emitter) -> anyhow::Result<BoxProducer> + Send + Sync>;

/// Maps a runtime fault to a replacement frame.
pub type ErrorHandler = Arc<dyn Fn(&anyhow::Error, &Emitter) -> anyhow::Result<Bytes> + Send + Sync>;

/// Builds property-update frames for one session.
#[derive(Debug, Clone)]
pub struct Emitter {
    callback_id: CallbackId,
}

impl Emitter {
    pub fn new(callback_id: CallbackId) -> Self {
        Self { callback_id }
    }

    pub fn callback_id(&self) -> &CallbackId {
        &self.callback_id
    }

    /// Encode a property update for `target`.
    ///
    /// `props` goes through `serde::Serialize`, so any serializable value tree
    /// works; it must serialize to a JSON object.
    pub fn emit<P: Serialize>(&self, target: impl Into<ComponentId>, props: P) -> Result<Bytes> {
        let target = target.into();
        if target.is_reserved() {
            return Err(StreamError::Codec(format!(
                "`{target}` is a lifecycle token, not a component id"
            )));
        }
        let props = match serde_json::to_value(props)? {
            Value::Object(map) => map,
            other => {
                return Err(StreamError::Codec(format!(
                    "props for `{target}` must serialize to an object, got {other}"
                )));
            }
        };
        encode_frame(&Frame::update(self.callback_id.clone(), target, props))
    }
}

/// Cancels an in-flight stream when `source` holds `expected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelTrigger {
    pub source: PropertyRef,
    pub expected: Value,
}

/// A registered streaming callback.
pub struct CallbackRegistration {
    pub id: CallbackId,
    /// Fully qualified producer name, e.g. `app::update_table`.
    pub identity: String,
    pub dependencies: Vec<Dependency>,
    /// Argument name for each dependency, in declaration order.
    pub params: Vec<String>,
    pub generator: GeneratorFn,
    pub on_error: Option<ErrorHandler>,
    pub reset_props: ResetMap,
    pub cancel_triggers: Vec<CancelTrigger>,
    pub prevent_initial_call: bool,
}

impl CallbackRegistration {
    pub fn descriptor(&self) -> CallbackDescriptor {
        CallbackDescriptor {
            id: self.id.clone(),
            identity: self.identity.clone(),
            dependencies: self.dependencies.clone(),
            params: self.params.clone(),
            reset_props: self.reset_props.clone(),
            cancel_triggers: self.cancel_triggers.clone(),
            prevent_initial_call: self.prevent_initial_call,
        }
    }
}

impl fmt::Debug for CallbackRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistration")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("dependencies", &self.dependencies)
            .field("params", &self.params)
            .field("on_error", &self.on_error.is_some())
            .field("reset_props", &self.reset_props)
            .field("cancel_triggers", &self.cancel_triggers)
            .field("prevent_initial_call", &self.prevent_initial_call)
            .finish_non_exhaustive()
    }
}

/// Serializable summary of a registration, everything a client needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackDescriptor {
    pub id: CallbackId,
    pub identity: String,
    pub dependencies: Vec<Dependency>,
    pub params: Vec<String>,
    pub reset_props: ResetMap,
    pub cancel_triggers: Vec<CancelTrigger>,
    pub prevent_initial_call: bool,
}

/// Registration contract for streaming callbacks.
pub struct CallbackBuilder {
    identity: String,
    dependencies: Vec<Dependency>,
    params: Option<Vec<String>>,
    generator: Option<GeneratorFn>,
    on_error: Option<ErrorHandler>,
    resets: Vec<(ComponentId, Value)>,
    cancel_triggers: Vec<CancelTrigger>,
    prevent_initial_call: bool,
}

impl CallbackBuilder {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            dependencies: Vec::new(),
            params: None,
            generator: None,
            on_error: None,
            resets: Vec::new(),
            cancel_triggers: Vec::new(),
            prevent_initial_call: true,
        }
    }

    pub fn input(self, component: impl Into<ComponentId>, property: impl Into<String>) -> Self {
        self.dependency(Dependency::input(component, property))
    }

    pub fn state(self, component: impl Into<ComponentId>, property: impl Into<String>) -> Self {
        self.dependency(Dependency::state(component, property))
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Argument names, one per dependency. Defaults to the dependency property names.
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn generator<F, P>(mut self, generator: F) -> Self
    where
        F: Fn(TriggerPayload, Emitter) -> anyhow::Result<P> + Send + Sync + 'static,
        P: Producer + 'static,
    {
        self.generator = Some(Arc::new(move |payload, emitter| {
            Ok(Box::new(generator(payload, emitter)?) as BoxProducer)
        }));
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&anyhow::Error, &Emitter) -> anyhow::Result<Bytes> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Baseline props applied to `component` when the stream errors or is cancelled.
    pub fn reset_props(mut self, component: impl Into<ComponentId>, props: Value) -> Self {
        self.resets.push((component.into(), props));
        self
    }

    pub fn cancel_on(
        mut self,
        component: impl Into<ComponentId>,
        property: impl Into<String>,
        expected: impl Into<Value>,
    ) -> Self {
        self.cancel_triggers.push(CancelTrigger {
            source: PropertyRef::new(component, property),
            expected: expected.into(),
        });
        self
    }

    /// Fire on the initial render too, not only on user-driven changes.
    pub fn allow_initial_call(mut self) -> Self {
        self.prevent_initial_call = false;
        self
    }

    pub fn build(self) -> Result<CallbackRegistration> {
        let identity = self.identity.trim().to_string();
        if identity.is_empty() {
            return Err(StreamError::Config("callback identity must not be empty".into()));
        }

        let generator = self.generator.ok_or_else(|| {
            StreamError::Config(format!(
                "streaming callback `{identity}` must be a generator function"
            ))
        })?;

        if !self
            .dependencies
            .iter()
            .any(|d| d.kind == DependencyKind::Input)
        {
            return Err(StreamError::Config(format!(
                "streaming callback `{identity}` must declare at least one Input trigger"
            )));
        }

        if let Some(dep) = self.dependencies.iter().find(|d| d.component.is_reserved()) {
            return Err(StreamError::Config(format!(
                "`{}` is reserved and cannot be used as a dependency",
                dep.component
            )));
        }

        let params = match self.params {
            Some(params) => {
                if params.len() != self.dependencies.len() {
                    return Err(StreamError::Config(format!(
                        "streaming callback `{identity}` takes {} arguments but declares {} dependencies",
                        params.len(),
                        self.dependencies.len()
                    )));
                }
                params
            }
            None => self.dependencies.iter().map(|d| d.property.clone()).collect(),
        };

        let mut seen = HashSet::new();
        if let Some(dup) = params.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(StreamError::Config(format!(
                "streaming callback `{identity}` has duplicate argument `{dup}`; name them with params()"
            )));
        }

        let mut reset_props = ResetMap::new();
        for (component, props) in self.resets {
            if component.is_reserved() {
                return Err(StreamError::Config(format!(
                    "`{component}` is reserved and cannot be reset"
                )));
            }
            let Value::Object(props) = props else {
                return Err(StreamError::Config(format!(
                    "reset props for `{component}` must be an object"
                )));
            };
            reset_props
                .entry(component.to_key())
                .or_insert_with(PropMap::new)
                .extend(props);
        }

        if let Some(trigger) = self
            .cancel_triggers
            .iter()
            .find(|t| t.source.component.is_reserved())
        {
            return Err(StreamError::Config(format!(
                "`{}` is reserved and cannot be a cancel trigger",
                trigger.source.component
            )));
        }

        let id = generate_callback_id(&identity, &self.dependencies);

        Ok(CallbackRegistration {
            id,
            identity,
            dependencies: self.dependencies,
            params,
            generator,
            on_error: self.on_error,
            reset_props,
            cancel_triggers: self.cancel_triggers,
            prevent_initial_call: self.prevent_initial_call,
        })
    }

    /// Validate and upsert into `registry`, returning the callback id.
    pub fn register(self, registry: &StreamRegistry) -> Result<CallbackId> {
        let registration = self.build()?;
        let id = registration.id.clone();
        registry.upsert(registration);
        Ok(id)
    }
}
