//! HTTP surface: identity resolution, the rate limit gate and the routes it guards.

mod gate;
mod identity;
mod routes;
mod server;

pub use gate::{rate_limit_gate, Gate, RejectionBody, REJECTION_MESSAGE};
pub use identity::{IdentityResolver, UNKNOWN_ADDRESS};
pub use routes::router;
pub use server::HttpServer;
