//! Operator HTTP surface
//!
//! - `GET /health` - liveness and component status
//! - `GET /metrics` - worker counters
//! - `POST /destinations/{destination}/messages` - broker ingress
//! - `GET /destinations/{destination}/messages` - drain queued messages
//! - `GET /dead-letters` - persisted dead letters

mod error;
pub mod routes;
pub mod state;
pub mod utils;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
