//! HTTP gateway — server assembly, routing, and cookie handling.

pub mod cookies;
pub mod router;
pub mod server;

pub use router::{AppState, create_router};
pub use server::Gateway;
