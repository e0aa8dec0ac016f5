//! Client-side cancellation of in-flight streams.
//!
//! A coordinator watches the cancel trigger sources declared for one callback.
//! Once every declared source holds its expected value at the same time, it
//! closes the connector, empties the progress store, and applies the
//! baseline resets. The server-side generator is never told; it is abandoned
//! when the connection drops.

use serde_json::Value;
use tracing::info;

use streamback_core::callback::{CallbackDescriptor, CancelTrigger};
use streamback_core::types::PropertyRef;
use streamback_core::{ComponentId, ResetMap};

use crate::stream::CallbackStream;
use crate::ui::UiHandle;

#[derive(Debug, Clone)]
pub struct CancellationCoordinator {
    triggers: Vec<CancelTrigger>,
    reset_props: ResetMap,
    observed: Vec<(PropertyRef, Value)>,
}

impl CancellationCoordinator {
    pub fn new(triggers: Vec<CancelTrigger>, reset_props: ResetMap) -> Self {
        Self {
            triggers,
            reset_props,
            observed: Vec::new(),
        }
    }

    pub fn from_descriptor(descriptor: &CallbackDescriptor) -> Self {
        Self::new(descriptor.cancel_triggers.clone(), descriptor.reset_props.clone())
    }

    /// Whether `source` is one of the watched trigger sources.
    pub fn watches(&self, source: &PropertyRef) -> bool {
        self.triggers.iter().any(|t| &t.source == source)
    }

    /// Record a new value for `source`; cancel `stream` if every trigger now matches.
    ///
    /// Returns true when the stream was cancelled.
    pub fn observe(
        &mut self,
        source: &PropertyRef,
        value: Value,
        stream: &mut CallbackStream,
        ui: &mut dyn UiHandle,
    ) -> bool {
        if !self.watches(source) {
            return false;
        }
        match self.observed.iter_mut().find(|(s, _)| s == source) {
            Some((_, current)) => *current = value,
            None => self.observed.push((source.clone(), value)),
        }

        if !self.all_match() {
            return false;
        }
        info!(callback_id = %stream.callback_id(), trigger = %source, "Cancelling stream");
        self.cancel(stream, ui);
        true
    }

    fn all_match(&self) -> bool {
        !self.triggers.is_empty()
            && self.triggers.iter().all(|trigger| {
                self.observed
                    .iter()
                    .any(|(source, value)| source == &trigger.source && value == &trigger.expected)
            })
    }

    /// Close the connector, forget the stream's progress, and apply the baseline resets.
    pub fn cancel(&self, stream: &mut CallbackStream, ui: &mut dyn UiHandle) {
        stream.connector_mut().close();
        stream.progress_mut().clear();
        for (key, props) in &self.reset_props {
            ui.set_props(&ComponentId::from_key(key), props);
        }
    }
}
