//! Client-side stream reducer.
//!
//! Runs once per transport data event on the connector's accumulated value.
//! The progress store remembers how many frames of each stream have been
//! applied, so redelivered frames are skipped and nothing is applied twice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use streamback_core::codec::{decode_fragment, split_fragments};
use streamback_core::{CallbackId, ComponentId, FramePayload, FrameTarget};

use crate::connector::StreamConnector;
use crate::ui::UiHandle;

/// Applied frame count per callback id. Absent counts as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressStore {
    counts: BTreeMap<CallbackId, usize>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, callback_id: &CallbackId) -> usize {
        self.counts.get(callback_id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, callback_id: &CallbackId, count: usize) {
        self.counts.insert(callback_id.clone(), count);
    }

    /// Forget `callback_id`; it counts as zero again.
    pub fn remove(&mut self, callback_id: &CallbackId) {
        self.counts.remove(callback_id);
    }

    fn increment(&mut self, callback_id: &CallbackId) {
        *self.counts.entry(callback_id.clone()).or_insert(0) += 1;
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub struct StreamReducer;

impl StreamReducer {
    /// Apply every not-yet-applied frame of `message` and return the new progress.
    ///
    /// Frames are applied strictly in order. A malformed fragment ends the
    /// stream: its counter drops to zero, the connector is marked done, and
    /// the rest of the message is not applied.
    pub fn reduce(
        message: &str,
        prior: &ProgressStore,
        connector: &mut StreamConnector,
        ui: &mut dyn UiHandle,
    ) -> ProgressStore {
        let fragments = split_fragments(message);
        let Some(first) = fragments.first() else {
            return prior.clone();
        };

        let callback_id = match decode_fragment(first) {
            Ok(frame) => frame.callback_id,
            Err(e) => {
                error!(connector = %connector.id, error = %e, "Could not identify stream");
                connector.mark_done();
                return prior.clone();
            }
        };

        let mut progress = prior.clone();
        let start = progress.get(&callback_id);
        for fragment in fragments.iter().skip(start) {
            let frame = match decode_fragment(fragment) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(%callback_id, error = %e, "Malformed stream frame, stopping stream");
                    progress.set(&callback_id, 0);
                    connector.mark_done();
                    break;
                }
            };

            match frame.target {
                FrameTarget::Init => {
                    progress.set(&callback_id, 1);
                    connector.done = false;
                }
                FrameTarget::Done => {
                    debug!(%callback_id, "Stream done");
                    progress.set(&callback_id, 0);
                    connector.close();
                }
                FrameTarget::Error => {
                    progress.set(&callback_id, 0);
                    if let FramePayload::Error(payload) = frame.payload {
                        for (key, props) in &payload.reset_props {
                            ui.set_props(&ComponentId::from_key(key), props);
                        }
                        if payload.handle_error {
                            ui.alert(&payload.error);
                        }
                    }
                    connector.close();
                }
                FrameTarget::Component(target) => {
                    if let FramePayload::Update(props) = &frame.payload {
                        ui.set_props(&target, props);
                    }
                    progress.increment(&callback_id);
                }
            }
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use streamback_core::protocol::STREAM_SEPARATOR;
    use streamback_core::{ErrorPayload, Frame, PropMap, ResetMap};

    #[derive(Default)]
    struct RecordingUi {
        updates: Vec<(String, PropMap)>,
        alerts: Vec<String>,
    }

    impl UiHandle for RecordingUi {
        fn set_props(&mut self, target: &ComponentId, props: &PropMap) {
            self.updates.push((target.to_key(), props.clone()));
        }

        fn alert(&mut self, message: &str) {
            self.alerts.push(message.to_string());
        }
    }

    fn id() -> CallbackId {
        CallbackId::from("cb-1")
    }

    fn fragment(frame: &Frame) -> String {
        format!("{}{STREAM_SEPARATOR}", serde_json::to_string(frame).unwrap())
    }

    fn update(target: &str, value: i64) -> String {
        let props = json!({"value": value}).as_object().cloned().unwrap();
        fragment(&Frame::update(id(), target.into(), props))
    }

    fn open_connector() -> StreamConnector {
        let mut connector = StreamConnector::new(&id());
        connector.open("http://localhost/update_component_sse", json!({}));
        connector
    }

    #[test]
    fn test_full_stream_applies_in_order() {
        let message = [fragment(&Frame::init(id())), update("a", 1), update("b", 2), fragment(&Frame::done(id()))].concat();
        let mut connector = open_connector();
        let mut ui = RecordingUi::default();

        let progress = StreamReducer::reduce(&message, &ProgressStore::new(), &mut connector, &mut ui);

        let targets: Vec<&str> = ui.updates.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(targets, vec!["a", "b"]);
        assert_eq!(progress.get(&id()), 0);
        assert!(connector.done);
        assert!(connector.url.is_none());
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let message = [fragment(&Frame::init(id())), update("a", 1), update("a", 2)].concat();
        let mut connector = open_connector();
        let mut ui = RecordingUi::default();

        let first = StreamReducer::reduce(&message, &ProgressStore::new(), &mut connector, &mut ui);
        let second = StreamReducer::reduce(&message, &first, &mut connector, &mut ui);

        assert_eq!(first.get(&id()), 3);
        assert_eq!(second.get(&id()), 3);
        assert_eq!(ui.updates.len(), 2);
        assert!(!connector.done);
    }

    #[test]
    fn test_accumulated_chunks_resume_where_they_left_off() {
        let mut connector = open_connector();
        let mut ui = RecordingUi::default();

        connector.push_data(&[fragment(&Frame::init(id())), update("a", 1)].concat());
        let message = connector.value().to_owned();
        let progress = StreamReducer::reduce(&message, &ProgressStore::new(), &mut connector, &mut ui);
        assert_eq!(progress.get(&id()), 2);

        connector.push_data(&[update("a", 2), fragment(&Frame::done(id()))].concat());
        let message = connector.value().to_owned();
        let progress = StreamReducer::reduce(&message, &progress, &mut connector, &mut ui);

        let values: Vec<&Value> = ui.updates.iter().map(|(_, p)| &p["value"]).collect();
        assert_eq!(values, vec![&json!(1), &json!(2)]);
        assert_eq!(progress.get(&id()), 0);
        assert!(connector.done);
    }

    #[test]
    fn test_error_frame_resets_and_alerts() {
        let mut reset_props = ResetMap::new();
        reset_props.insert("button".into(), json!({"loading": false}).as_object().cloned().unwrap());
        let error = Frame::error(
            id(),
            ErrorPayload {
                error: "boom".into(),
                handle_error: true,
                reset_props,
            },
        );
        let message = [fragment(&Frame::init(id())), update("a", 1), fragment(&error)].concat();
        let mut connector = open_connector();
        let mut ui = RecordingUi::default();

        let progress = StreamReducer::reduce(&message, &ProgressStore::new(), &mut connector, &mut ui);

        assert_eq!(progress.get(&id()), 0);
        assert_eq!(ui.updates.last().unwrap().0, "button");
        assert_eq!(ui.alerts, vec!["boom"]);
        assert!(connector.done);
        assert!(connector.url.is_none());
    }

    #[test]
    fn test_handled_error_does_not_alert() {
        let error = Frame::error(
            id(),
            ErrorPayload {
                error: "boom".into(),
                handle_error: false,
                reset_props: ResetMap::new(),
            },
        );
        let message = [fragment(&Frame::init(id())), fragment(&error)].concat();
        let mut ui = RecordingUi::default();
        StreamReducer::reduce(&message, &ProgressStore::new(), &mut open_connector(), &mut ui);
        assert!(ui.alerts.is_empty());
    }

    #[test]
    fn test_malformed_fragment_stops_stream() {
        let message = [
            fragment(&Frame::init(id())),
            update("a", 1),
            format!("[not json{STREAM_SEPARATOR}"),
            update("a", 2),
        ]
        .concat();
        let mut connector = open_connector();
        let mut ui = RecordingUi::default();

        let progress = StreamReducer::reduce(&message, &ProgressStore::new(), &mut connector, &mut ui);

        assert_eq!(ui.updates.len(), 1);
        assert_eq!(progress.get(&id()), 0);
        assert!(connector.done);
    }

    #[test]
    fn test_unidentifiable_message_leaves_progress() {
        let mut prior = ProgressStore::new();
        prior.set(&id(), 4);
        let mut connector = open_connector();
        let progress = StreamReducer::reduce("garbage", &prior, &mut connector, &mut RecordingUi::default());
        assert_eq!(progress, prior);
        assert!(connector.done);
    }

    #[test]
    fn test_empty_message_is_noop() {
        let mut connector = open_connector();
        let progress = StreamReducer::reduce("", &ProgressStore::new(), &mut connector, &mut RecordingUi::default());
        assert!(progress.is_empty());
        assert!(!connector.done);
    }
}
