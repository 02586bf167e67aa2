//! Tenantline API crate - axum HTTP server and route handlers.
//!
//! Exposes the call engine over JSON: start a call, submit transcribed
//! utterances, read facts, hang up, reload the property registry, and follow
//! call events over SSE.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
