//! HTTP surface for the generation pipeline and batch runner.
//!
//! The binary in `main.rs` wires configured services into an [`AppState`]
//! and serves [`api::create_router`].

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
