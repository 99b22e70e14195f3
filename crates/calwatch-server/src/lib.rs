pub mod handlers;
pub mod outbound;
pub mod server;
pub mod ws;

pub use outbound::{BroadcastTransport, Confirmation};
pub use server::{build_router, start, AppState, ServerConfig, ServerError, ServerHandle};
