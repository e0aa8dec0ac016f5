//! Prometheus instrumentation for stream sessions (`metrics` feature).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use streamback_core::FrameTarget;

use crate::session::SessionOutcome;

/// Install the global recorder. The handle renders `/metrics`.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Record a stream session starting.
pub fn record_session_start() {
    metrics::gauge!("stream_sessions_active").increment(1.0);
}

/// Record a stream session ending with its outcome and duration.
pub fn record_session_end(outcome: &SessionOutcome, duration_secs: f64) {
    metrics::gauge!("stream_sessions_active").decrement(1.0);
    let label = match outcome {
        SessionOutcome::Completed { .. } => "completed",
        SessionOutcome::Failed { .. } => "failed",
        SessionOutcome::UnknownCallback => "unknown_callback",
        SessionOutcome::Disconnected => "disconnected",
    };
    let labels = [("outcome", label.to_string())];
    metrics::counter!("stream_sessions_total", &labels).increment(1);
    metrics::histogram!("stream_session_duration_seconds", &labels).record(duration_secs);
    if let SessionOutcome::Failed { kind, .. } = outcome {
        record_error(kind);
    }
}

/// Label for a frame in `stream_frames_total`.
pub fn frame_kind(target: &FrameTarget) -> &'static str {
    match target {
        FrameTarget::Init => "init",
        FrameTarget::Done => "done",
        FrameTarget::Error => "error",
        FrameTarget::Component(_) => "update",
    }
}

/// Count one frame written to a stream.
pub fn record_frame(kind: &'static str) {
    metrics::counter!("stream_frames_total", "kind" => kind).increment(1);
}

/// Count a request or stream fault by `StreamError::kind`.
pub fn record_error(kind: &str) {
    metrics::counter!("stream_errors_total", "kind" => kind.to_string()).increment(1);
}
