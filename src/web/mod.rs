//! HTTP surface: routing, request extraction, templates and the shared
//! response layer.

pub mod extract;
pub mod handlers;
pub mod respond;
pub mod router;
pub mod state;
pub mod templates;

pub use router::build_router;
pub use state::{AppState, SharedState};
pub use templates::Templates;
