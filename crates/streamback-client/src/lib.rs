//! Client side of streamback: the state machine that applies streamed frames
//! to a live UI, cancellation, trigger packaging, and the HTTP transport.

pub mod cancel;
pub mod client;
pub mod connector;
pub mod reducer;
pub mod sse;
pub mod stream;
pub mod trigger;
pub mod ui;

pub use cancel::CancellationCoordinator;
pub use client::StreamClient;
pub use connector::StreamConnector;
pub use reducer::{ProgressStore, StreamReducer};
pub use stream::CallbackStream;
pub use trigger::package_trigger;
pub use ui::{LiveComponents, UiHandle};
