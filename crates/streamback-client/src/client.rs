//! HTTP transport: posts trigger requests and feeds the response into a [`CallbackStream`].

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use streamback_core::TriggerRequest;
use streamback_core::types::PropertyRef;
use streamback_core::codec::SseEvent;
use streamback_core::protocol::{DEFAULT_ENDPOINT, EVENT_STREAM_MIME};

use crate::cancel::CancellationCoordinator;
use crate::sse::parse_event_stream;
use crate::stream::CallbackStream;
use crate::ui::UiHandle;

pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<SseEvent>> + Send>>;

pub struct StreamClient {
    pub base_url: String,
    endpoint: String,
    client: reqwest::Client,
}

impl StreamClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{endpoint}")
        };
        self
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint)
    }

    /// Open the connector and post the trigger. Returns the event stream of the response.
    pub async fn open(
        &self,
        request: &TriggerRequest,
        stream: &mut CallbackStream,
    ) -> anyhow::Result<EventStream> {
        let url = self.url();
        let body = request.to_body();
        stream.open(url.clone(), body.clone());

        let response = match self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, EVENT_STREAM_MIME)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                stream.connector_mut().close();
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            stream.connector_mut().close();
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Stream request failed {status}: {body}");
        }

        debug!(callback_id = %request.callback_id, %url, "Stream opened");
        Ok(Box::pin(parse_event_stream(response)))
    }

    /// Run one stream to completion: until a terminal frame arrives, the
    /// connector is closed, or the transport ends.
    pub async fn run(
        &self,
        request: &TriggerRequest,
        stream: &mut CallbackStream,
        ui: &mut dyn UiHandle,
    ) -> anyhow::Result<()> {
        let mut coordinator = CancellationCoordinator::new(Vec::new(), Default::default());
        let (_idle, mut triggers) = mpsc::channel(1);
        self.run_cancellable(request, stream, ui, &mut coordinator, &mut triggers)
            .await
            .map(|_| ())
    }

    /// Like [`run`](Self::run), but also listens for cancel trigger values.
    ///
    /// Every `(source, value)` received on `triggers` goes to `coordinator`
    /// as soon as it arrives, even while the server is between frames. When it
    /// cancels, the response is dropped, which disconnects the server session.
    /// Returns true if the stream was cancelled.
    pub async fn run_cancellable(
        &self,
        request: &TriggerRequest,
        stream: &mut CallbackStream,
        ui: &mut dyn UiHandle,
        coordinator: &mut CancellationCoordinator,
        triggers: &mut mpsc::Receiver<(PropertyRef, Value)>,
    ) -> anyhow::Result<bool> {
        let mut events = self.open(request, stream).await?;

        let mut received = 0usize;
        let mut cancelled = false;
        loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else { break };
                    let event = event?;
                    received += 1;
                    if !stream.on_data(&event.data, ui) {
                        break;
                    }
                }
                Some((source, value)) = triggers.recv() => {
                    if coordinator.observe(&source, value, stream, ui) {
                        cancelled = true;
                        break;
                    }
                }
            }
        }
        drop(events);

        if stream.is_live() {
            // Transport ended without a terminal frame.
            stream.connector_mut().mark_done();
        }
        info!(
            callback_id = %request.callback_id,
            events = received,
            cancelled,
            "Stream finished"
        );
        Ok(cancelled)
    }
}
