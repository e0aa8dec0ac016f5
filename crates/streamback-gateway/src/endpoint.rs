//! HTTP handlers: the streaming endpoint plus health and introspection routes.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use streamback_core::layout::inject_connectors;
use streamback_core::protocol::EVENT_STREAM_MIME;
use streamback_core::{StreamError, TriggerRequest};

use crate::session::StreamSession;
use crate::state::GatewayState;

/// Error returned by the HTTP handlers before a stream has started.
#[derive(Debug)]
pub struct EndpointError(pub StreamError);

impl From<StreamError> for EndpointError {
    fn from(err: StreamError) -> Self {
        Self(err)
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StreamError::NotAcceptable | StreamError::BadRequest(_) | StreamError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = status.as_u16(), kind = self.0.kind(), error = %self.0, "Rejected stream request");
        #[cfg(feature = "metrics")]
        crate::metrics::record_error(self.0.kind());
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Whether an `Accept` header admits `text/event-stream`.
///
/// Wildcards `*/*` and `text/*` count; a range with `q=0` does not.
pub fn accepts_event_stream(accept: Option<&str>) -> bool {
    let Some(accept) = accept else {
        return false;
    };
    accept.split(',').any(|range| {
        let mut parts = range.split(';');
        let media = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let quality = parts
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                (key.trim().eq_ignore_ascii_case("q")).then(|| value.trim().parse::<f32>().ok())?
            })
            .next()
            .unwrap_or(1.0);
        quality > 0.0 && matches!(media.as_str(), EVENT_STREAM_MIME | "text/*" | "*/*")
    })
}

/// `POST <endpoint>`: open one stream session.
pub async fn stream_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, EndpointError> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    if !accepts_event_stream(accept) {
        return Err(StreamError::NotAcceptable.into());
    }

    let body: Value = serde_json::from_slice(&body).map_err(StreamError::from)?;
    let request = TriggerRequest::from_body(body)?;
    debug!(
        callback_id = %request.callback_id,
        inputs = request.inputs.len(),
        context = %request.context,
        "Stream request received"
    );

    let (tx, rx) = mpsc::channel(state.settings.buffer_frames);
    let guard = state.begin_session();
    let registry = Arc::clone(&state.registry);
    let settings = state.settings.clone();
    let session = StreamSession::new(request.callback_id, request.inputs);

    tokio::spawn(async move {
        let _guard = guard;
        let started = Instant::now();
        let outcome = session.run(registry, &settings, tx).await;
        #[cfg(feature = "metrics")]
        crate::metrics::record_session_end(&outcome, started.elapsed().as_secs_f64());
        debug!(?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "Stream task finished");
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, EVENT_STREAM_MIME)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| EndpointError(StreamError::Other(e.into())))
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoint": state.endpoint,
        "callbacks": state.registry.len(),
        "active_sessions": state.active_sessions(),
        "sessions_total": state.sessions_total(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}

/// `GET /callbacks`: registered callbacks, everything a client needs to wire them up.
pub async fn callbacks_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.registry.descriptors())
}

/// `GET /layout`: the application layout with one connector pair per callback.
pub async fn layout_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(inject_connectors(
        state.layout.clone(),
        &state.registry,
        &state.endpoint,
    ))
}

/// `GET /metrics`
#[cfg(feature = "metrics")]
pub async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}
