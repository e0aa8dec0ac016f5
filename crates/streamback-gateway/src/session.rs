//! Stream sessions: one per request, drives one generator to completion.
//!
//! The generator is pulled on a blocking worker so a slow `next_item` never
//! stalls the runtime. The async side forwards frames, paces them, and owns
//! the wall-clock deadline: if the deadline passes while the worker is stuck,
//! the session reports a timeout and the worker is abandoned. It stops on
//! its own the next time it tries to hand over an item.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use streamback_core::codec::encode_frame;
use streamback_core::config::Config;
use streamback_core::{
    CallbackId, CallbackRegistration, Emitter, ErrorPayload, Frame, StreamError, StreamRegistry,
    TriggerPayload,
};

/// How long the closing frames of a failed session may wait on a client
/// that has stopped reading.
const FAULT_REPORT_GRACE: Duration = Duration::from_secs(1);

/// Per-session limits.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timeout: Duration,
    pub pacing: Duration,
    pub buffer_frames: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.stream_timeout(),
            pacing: config.stream_pacing(),
            buffer_frames: config.buffer_frames(),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Generator exhausted; `[DONE]` sent.
    Completed { frames: usize },
    /// Runtime fault; `[ERROR]` sent. `handled` is true when a custom handler ran.
    Failed { kind: &'static str, handled: bool },
    /// No registration for the id; `[ERROR]` sent.
    UnknownCallback,
    /// The client went away mid-stream.
    Disconnected,
}

enum Fault {
    Failed(anyhow::Error),
    Disconnected,
}

struct Disconnected;

pub struct StreamSession {
    pub session_id: Uuid,
    pub callback_id: CallbackId,
    pub trigger_payload: TriggerPayload,
    pub start_time: Instant,
}

impl StreamSession {
    pub fn new(callback_id: CallbackId, trigger_payload: TriggerPayload) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            callback_id,
            trigger_payload,
            start_time: Instant::now(),
        }
    }

    /// Run the session, writing encoded frames to `tx`.
    ///
    /// Always starts with `[INIT]` and, unless the client disconnects, ends with
    /// exactly one `[DONE]` or `[ERROR]`.
    pub async fn run(
        mut self,
        registry: Arc<StreamRegistry>,
        settings: &SessionSettings,
        tx: mpsc::Sender<Bytes>,
    ) -> SessionOutcome {
        let callback_id = self.callback_id.clone();
        let emitter = Emitter::new(callback_id.clone());

        if send_frame(&tx, &Frame::init(callback_id.clone())).await.is_err() {
            return SessionOutcome::Disconnected;
        }

        let Some(registration) = registry.get(&callback_id) else {
            let message = format!("Could not find function for stream id {callback_id}");
            warn!(session_id = %self.session_id, %callback_id, "Unknown streaming callback");
            let payload = ErrorPayload {
                error: message,
                handle_error: true,
                reset_props: Default::default(),
            };
            let _ = send_frame(&tx, &Frame::error(callback_id, payload)).await;
            return SessionOutcome::UnknownCallback;
        };

        info!(
            session_id = %self.session_id,
            %callback_id,
            callback = %registration.identity,
            "Stream session started"
        );

        let outcome = match self.drive(&registration, &emitter, settings, &tx).await {
            Ok(frames) => match send_frame(&tx, &Frame::done(callback_id.clone())).await {
                Ok(()) => SessionOutcome::Completed { frames },
                Err(Disconnected) => SessionOutcome::Disconnected,
            },
            Err(Fault::Disconnected) => SessionOutcome::Disconnected,
            Err(Fault::Failed(err)) => {
                let deadline = tokio::time::Instant::now() + FAULT_REPORT_GRACE;
                report_fault(&registration, &emitter, err, &tx, deadline).await
            }
        };

        let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
        match &outcome {
            SessionOutcome::Completed { frames } => {
                info!(session_id = %self.session_id, %callback_id, frames, elapsed_ms, "Stream session done")
            }
            SessionOutcome::Failed { kind, handled } => {
                warn!(session_id = %self.session_id, %callback_id, kind, handled, elapsed_ms, "Stream session failed")
            }
            SessionOutcome::Disconnected => {
                debug!(session_id = %self.session_id, %callback_id, elapsed_ms, "Client disconnected")
            }
            SessionOutcome::UnknownCallback => {}
        }
        outcome
    }

    /// Pull the generator dry, forwarding every item. Returns the number of frames forwarded.
    async fn drive(
        &mut self,
        registration: &CallbackRegistration,
        emitter: &Emitter,
        settings: &SessionSettings,
        tx: &mpsc::Sender<Bytes>,
    ) -> Result<usize, Fault> {
        let (item_tx, mut item_rx) = mpsc::channel::<anyhow::Result<Option<Bytes>>>(1);
        let generator = registration.generator.clone();
        let payload = std::mem::take(&mut self.trigger_payload);
        let worker_emitter = emitter.clone();

        let worker = tokio::task::spawn_blocking(move || {
            let mut producer = match generator(payload, worker_emitter) {
                Ok(producer) => producer,
                Err(e) => {
                    let _ = item_tx.blocking_send(Err(e));
                    return;
                }
            };
            while let Some(item) = producer.next_item() {
                let failed = item.is_err();
                if item_tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

        // The deadline counts from the generator's start, not the request's.
        self.start_time = Instant::now();
        let deadline = tokio::time::Instant::from_std(self.start_time + settings.timeout);
        let timeout = || -> Fault {
            Fault::Failed(
                StreamError::Timeout {
                    callback: registration.identity.clone(),
                    callback_id: registration.id.to_string(),
                }
                .into(),
            )
        };

        let mut frames = 0;
        loop {
            let next = tokio::time::timeout_at(deadline, item_rx.recv())
                .await
                .map_err(|_| timeout())?;

            match next {
                Some(Ok(Some(bytes))) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(timeout());
                    }
                    tokio::time::timeout_at(deadline, tx.send(bytes))
                        .await
                        .map_err(|_| timeout())?
                        .map_err(|_| Fault::Disconnected)?;
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_frame("update");
                    frames += 1;
                    tokio::time::sleep(settings.pacing).await;
                }
                Some(Ok(None)) => {
                    warn!(
                        callback = %registration.identity,
                        callback_id = %registration.id,
                        "Streaming generators should not yield empty values; skipping"
                    );
                }
                Some(Err(e)) => return Err(Fault::Failed(e)),
                None => {
                    return match worker.await {
                        Err(e) if e.is_panic() => Err(Fault::Failed(anyhow::anyhow!(
                            "generator for {} panicked",
                            registration.identity
                        ))),
                        _ => Ok(frames),
                    };
                }
            }
        }
    }
}

/// Route a runtime fault through the custom handler, then close with `[ERROR]`.
///
/// Both sends give up at `deadline`.
async fn report_fault(
    registration: &CallbackRegistration,
    emitter: &Emitter,
    err: anyhow::Error,
    tx: &mpsc::Sender<Bytes>,
    deadline: tokio::time::Instant,
) -> SessionOutcome {
    let kind = match err.downcast_ref::<StreamError>() {
        Some(stream_err) => stream_err.kind(),
        None => "producer",
    };
    let message = format!("{err:#}");
    let mut handle_error = true;

    if let Some(handler) = &registration.on_error {
        match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&err, emitter))) {
            Ok(Ok(bytes)) => {
                handle_error = false;
                if deliver(tx, bytes, Some(deadline)).await.is_err() {
                    return SessionOutcome::Disconnected;
                }
                #[cfg(feature = "metrics")]
                crate::metrics::record_frame("update");
            }
            Ok(Err(handler_err)) => {
                error!(callback = %registration.identity, error = %handler_err, "Error handler failed");
            }
            Err(_) => {
                error!(callback = %registration.identity, "Error handler panicked");
            }
        }
    }

    let payload = ErrorPayload {
        error: message,
        handle_error,
        reset_props: registration.reset_props.clone(),
    };
    let frame = Frame::error(registration.id.clone(), payload);
    match send_frame_by(tx, &frame, Some(deadline)).await {
        Ok(()) => SessionOutcome::Failed {
            kind,
            handled: !handle_error,
        },
        Err(Disconnected) => SessionOutcome::Disconnected,
    }
}

async fn send_frame(tx: &mpsc::Sender<Bytes>, frame: &Frame) -> Result<(), Disconnected> {
    send_frame_by(tx, frame, None).await
}

async fn send_frame_by(
    tx: &mpsc::Sender<Bytes>,
    frame: &Frame,
    deadline: Option<tokio::time::Instant>,
) -> Result<(), Disconnected> {
    let bytes = match encode_frame(frame) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to encode frame");
            return Ok(());
        }
    };
    deliver(tx, bytes, deadline).await?;
    #[cfg(feature = "metrics")]
    crate::metrics::record_frame(crate::metrics::frame_kind(&frame.target));
    Ok(())
}

async fn deliver(
    tx: &mpsc::Sender<Bytes>,
    bytes: Bytes,
    deadline: Option<tokio::time::Instant>,
) -> Result<(), Disconnected> {
    let Some(deadline) = deadline else {
        return tx.send(bytes).await.map_err(|_| Disconnected);
    };
    match tokio::time::timeout_at(deadline, tx.send(bytes)).await {
        Ok(sent) => sent.map_err(|_| Disconnected),
        Err(_) => {
            warn!("Client stopped reading; abandoning stream");
            Err(Disconnected)
        }
    }
}
