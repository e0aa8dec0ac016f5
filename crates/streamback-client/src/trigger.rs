//! Packaging UI events into trigger requests.

use serde_json::{Value, json};
use tracing::debug;

use streamback_core::callback::CallbackDescriptor;
use streamback_core::types::PropertyRef;
use streamback_core::{DependencyKind, TriggerRequest};

use crate::ui::LiveComponents;

/// Build the request for `descriptor` after `triggered` sources changed.
///
/// An empty `triggered` list is the initial render; it yields nothing when the
/// callback prevents initial calls. Changes to sources that are not `Input`
/// dependencies of the callback yield nothing either.
pub fn package_trigger(
    descriptor: &CallbackDescriptor,
    ui: &LiveComponents,
    triggered: &[PropertyRef],
) -> Option<TriggerRequest> {
    let fired: Vec<&PropertyRef> = triggered
        .iter()
        .filter(|source| {
            descriptor
                .dependencies
                .iter()
                .any(|d| d.kind == DependencyKind::Input && &d.source() == *source)
        })
        .collect();

    if triggered.is_empty() {
        if descriptor.prevent_initial_call {
            debug!(callback = %descriptor.identity, "Initial call prevented");
            return None;
        }
    } else if fired.is_empty() {
        return None;
    }

    let mut request = TriggerRequest::new(descriptor.id.clone());
    for (param, dependency) in descriptor.params.iter().zip(&descriptor.dependencies) {
        request = request.with_input(param.clone(), ui.prop(&dependency.component, &dependency.property));
    }

    let triggered_inputs: Vec<Value> = fired
        .iter()
        .map(|source| {
            json!({
                "prop_id": source.to_string(),
                "value": ui.prop(&source.component, &source.property),
            })
        })
        .collect();
    Some(request.with_context(json!({ "triggered_inputs": triggered_inputs })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use streamback_core::{CallbackBuilder, Emitter, TriggerPayload};

    fn descriptor(allow_initial: bool) -> CallbackDescriptor {
        let mut builder = CallbackBuilder::new("tests::download")
            .input("stream-button", "n_clicks")
            .state("chunk-size", "value")
            .params(["n_clicks", "chunk_size"])
            .generator(|_: TriggerPayload, _: Emitter| {
                Ok(std::iter::empty::<anyhow::Result<Option<Bytes>>>())
            });
        if allow_initial {
            builder = builder.allow_initial_call();
        }
        builder.build().unwrap().descriptor()
    }

    fn ui() -> LiveComponents {
        let mut ui = LiveComponents::new();
        ui.insert(
            "stream-button".into(),
            "Button",
            json!({"n_clicks": 2}).as_object().cloned().unwrap(),
        );
        ui.insert(
            "chunk-size".into(),
            "NumberInput",
            json!({"value": 500}).as_object().cloned().unwrap(),
        );
        ui
    }

    #[test]
    fn test_packages_inputs_and_state() {
        let request = package_trigger(
            &descriptor(false),
            &ui(),
            &[PropertyRef::new("stream-button", "n_clicks")],
        )
        .unwrap();
        assert_eq!(request.inputs["n_clicks"], 2);
        assert_eq!(request.inputs["chunk_size"], 500);
        assert_eq!(request.context["triggered_inputs"][0]["prop_id"], "stream-button.n_clicks");

        let body = request.to_body();
        assert_eq!(body["content"]["chunk_size"], 500);
        assert!(body["content"]["sse_callback_id"].is_string());
    }

    #[test]
    fn test_initial_call_prevented_by_default() {
        assert!(package_trigger(&descriptor(false), &ui(), &[]).is_none());
        assert!(package_trigger(&descriptor(true), &ui(), &[]).is_some());
    }

    #[test]
    fn test_state_change_does_not_fire() {
        let request = package_trigger(
            &descriptor(false),
            &ui(),
            &[PropertyRef::new("chunk-size", "value")],
        );
        assert!(request.is_none());
    }
}
