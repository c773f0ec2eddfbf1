//! Ember Server - HTTP adapter for the ember agent
//!
//! Exposes an OpenAI-compatible `/v1/chat/completions` endpoint backed by the
//! tool-calling conversation loop, plus health, manifest and direct tool
//! endpoints.

pub mod error;
pub mod openai_types;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
