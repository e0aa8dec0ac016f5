pub mod endpoint;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod session;
pub mod state;

pub use server::{router, start_server};
pub use session::{SessionOutcome, SessionSettings, StreamSession};
pub use state::GatewayState;
