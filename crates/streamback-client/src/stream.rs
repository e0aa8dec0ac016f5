//! Per-callback client state: one connector and its progress store.

use serde_json::Value;

use streamback_core::CallbackId;

use crate::connector::StreamConnector;
use crate::reducer::{ProgressStore, StreamReducer};
use crate::ui::UiHandle;

#[derive(Debug, Clone)]
pub struct CallbackStream {
    callback_id: CallbackId,
    connector: StreamConnector,
    progress: ProgressStore,
}

impl CallbackStream {
    pub fn new(callback_id: CallbackId) -> Self {
        let connector = StreamConnector::new(&callback_id);
        Self {
            callback_id,
            connector,
            progress: ProgressStore::new(),
        }
    }

    pub fn callback_id(&self) -> &CallbackId {
        &self.callback_id
    }

    /// Start a new stream. Progress left by an earlier stream that ended
    /// without a terminal frame is dropped, so nothing of the new one is skipped.
    pub fn open(&mut self, url: impl Into<String>, options: Value) {
        self.progress.remove(&self.callback_id);
        self.connector.open(url, options);
    }

    /// Handle one transport payload. Returns whether the stream is still live.
    pub fn on_data(&mut self, data: &str, ui: &mut dyn UiHandle) -> bool {
        if !self.connector.push_data(data) {
            return false;
        }
        let message = self.connector.value().to_owned();
        self.progress = StreamReducer::reduce(&message, &self.progress, &mut self.connector, ui);
        !self.connector.done
    }

    pub fn is_live(&self) -> bool {
        self.connector.is_open() && !self.connector.done
    }

    pub fn connector(&self) -> &StreamConnector {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut StreamConnector {
        &mut self.connector
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressStore {
        &mut self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use streamback_core::codec::encode_frame;
    use streamback_core::{ComponentId, Frame, PropMap};

    use crate::ui::LiveComponents;

    fn data(frame: Frame) -> String {
        let record = encode_frame(&frame).unwrap();
        let text = String::from_utf8(record.to_vec()).unwrap();
        text.strip_prefix("data: ").unwrap().trim_end().to_string()
    }

    fn update(id: &CallbackId, value: i64) -> String {
        let props = json!({ "v": value }).as_object().cloned().unwrap();
        data(Frame::update(id.clone(), ComponentId::plain("label"), props))
    }

    #[test]
    fn test_reopen_after_unterminated_stream_applies_every_update() {
        let id = CallbackId::from("cb-reopen");
        let mut ui = LiveComponents::new();
        ui.insert(ComponentId::plain("label"), "Text", PropMap::new());
        let mut stream = CallbackStream::new(id.clone());

        stream.open("http://localhost/update_component_sse", json!({}));
        assert!(stream.on_data(&data(Frame::init(id.clone())), &mut ui));
        for v in 1..=3 {
            assert!(stream.on_data(&update(&id, v), &mut ui));
        }
        // Transport dropped without DONE or ERROR.
        stream.connector_mut().mark_done();
        assert_eq!(stream.progress().get(&id), 4);

        stream.open("http://localhost/update_component_sse", json!({}));
        assert_eq!(stream.progress().get(&id), 0);
        assert!(stream.on_data(&data(Frame::init(id.clone())), &mut ui));
        for v in [10, 20, 30] {
            assert!(stream.on_data(&update(&id, v), &mut ui));
            assert_eq!(ui.prop(&ComponentId::plain("label"), "v"), v);
        }
        assert!(!stream.on_data(&data(Frame::done(id.clone())), &mut ui));
        assert_eq!(stream.progress().get(&id), 0);
    }

    #[test]
    fn test_no_replay_after_malformed_fragment() {
        let id = CallbackId::from("cb-malformed");
        let mut ui = LiveComponents::new();
        ui.insert(ComponentId::plain("label"), "Text", PropMap::new());
        let mut stream = CallbackStream::new(id.clone());

        stream.open("http://localhost/update_component_sse", json!({}));
        assert!(stream.on_data(&data(Frame::init(id.clone())), &mut ui));
        assert!(stream.on_data(&update(&id, 1), &mut ui));
        assert!(!stream.on_data("not json__concatsep__", &mut ui));
        assert_eq!(stream.progress().get(&id), 0);

        // Further data for the dead stream is refused instead of replayed from the start.
        let reset = json!({"v": 0}).as_object().cloned().unwrap();
        ui.insert(ComponentId::plain("label"), "Text", reset);
        assert!(!stream.on_data(&update(&id, 2), &mut ui));
        assert_eq!(ui.prop(&ComponentId::plain("label"), "v"), 0);
        assert_eq!(stream.progress().get(&id), 0);
    }
}
