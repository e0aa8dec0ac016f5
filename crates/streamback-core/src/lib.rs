//! Core types, wire protocol, callback registry, config, and errors for streamback.
//!
//! Streamback lets a server-side producer push incremental property updates to
//! a browser UI over one long-lived `text/event-stream` response. This crate
//! holds everything both ends agree on: the frame format, the deterministic
//! callback ids, and the registry the endpoint resolves them against.

pub mod callback;
pub mod callback_id;
pub mod codec;
pub mod config;
pub mod error;
pub mod layout;
pub mod protocol;
pub mod registry;
pub mod types;

pub use callback::{
    BoxProducer, CallbackBuilder, CallbackRegistration, CancelTrigger, Emitter, ErrorHandler,
    GeneratorFn, Producer,
};
pub use callback_id::{CallbackId, generate_callback_id};
pub use error::{Result, StreamError};
pub use protocol::{ErrorPayload, Frame, FramePayload, FrameTarget, TriggerRequest};
pub use registry::StreamRegistry;
pub use types::{ComponentId, Dependency, DependencyKind, PropMap, ResetMap, TriggerPayload};
