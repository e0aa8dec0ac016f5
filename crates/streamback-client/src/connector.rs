//! Client model of the stream connector element.
//!
//! The connector owns the transport: while it has a URL it is connected, and
//! every `data` payload the transport receives is appended to its value. The
//! reducer always works on the whole accumulated value.

use serde_json::Value;
use tracing::debug;

use streamback_core::layout::ConnectorIds;
use streamback_core::{CallbackId, ComponentId};

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConnector {
    pub id: ComponentId,
    pub url: Option<String>,
    /// Request body posted when the connection opened.
    pub options: Option<Value>,
    pub done: bool,
    /// Concatenate payloads instead of replacing the value with the latest one.
    pub concat: bool,
    value: String,
}

impl StreamConnector {
    /// An idle connector for `callback_id`: done, no URL.
    pub fn new(callback_id: &CallbackId) -> Self {
        Self {
            id: ConnectorIds::stream(callback_id),
            url: None,
            options: None,
            done: true,
            concat: true,
            value: String::new(),
        }
    }

    /// Point the connector at `url`, discarding the previous stream's value.
    pub fn open(&mut self, url: impl Into<String>, options: Value) {
        let url = url.into();
        debug!(connector = %self.id, %url, "Opening stream connector");
        self.url = Some(url);
        self.options = Some(options);
        self.done = false;
        self.value.clear();
    }

    /// Feed one transport payload. Returns false (and drops it) once the
    /// stream is closed or marked done.
    pub fn push_data(&mut self, data: &str) -> bool {
        if self.url.is_none() || self.done {
            return false;
        }
        if !self.concat {
            self.value.clear();
        }
        self.value.push_str(data);
        true
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_open(&self) -> bool {
        self.url.is_some()
    }

    /// Drop the connection and clear the URL so it never reconnects.
    pub fn close(&mut self) {
        if self.url.is_some() {
            debug!(connector = %self.id, "Closing stream connector");
        }
        self.url = None;
        self.done = true;
    }

    /// Mark the stream finished while leaving the URL in place.
    pub fn mark_done(&mut self) {
        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_connector_is_idle() {
        let connector = StreamConnector::new(&CallbackId::from("cb"));
        assert!(connector.done);
        assert!(!connector.is_open());
        assert_eq!(connector.id, ComponentId::pattern("streamback-event-stream", "cb"));
    }

    #[test]
    fn test_push_data_concatenates_until_closed() {
        let mut connector = StreamConnector::new(&CallbackId::from("cb"));
        assert!(!connector.push_data("ignored"));

        connector.open("http://localhost/update_component_sse", json!({"content": {}}));
        assert!(!connector.done);
        assert!(connector.push_data("a"));
        assert!(connector.push_data("b"));
        assert_eq!(connector.value(), "ab");

        connector.close();
        assert!(connector.done);
        assert!(!connector.push_data("c"));
        assert_eq!(connector.value(), "ab");
    }

    #[test]
    fn test_push_data_refused_after_mark_done() {
        let mut connector = StreamConnector::new(&CallbackId::from("cb"));
        connector.open("http://a", json!({}));
        assert!(connector.push_data("a"));

        connector.mark_done();
        assert!(connector.is_open());
        assert!(!connector.push_data("b"));
        assert_eq!(connector.value(), "a");
    }

    #[test]
    fn test_reopen_resets_value() {
        let mut connector = StreamConnector::new(&CallbackId::from("cb"));
        connector.open("http://a", json!({}));
        connector.push_data("old");
        connector.open("http://a", json!({}));
        assert_eq!(connector.value(), "");
    }

    #[test]
    fn test_non_concat_keeps_latest() {
        let mut connector = StreamConnector::new(&CallbackId::from("cb"));
        connector.concat = false;
        connector.open("http://a", json!({}));
        connector.push_data("a");
        connector.push_data("b");
        assert_eq!(connector.value(), "b");
    }
}
