//! Application state
//!
//! Shared handles every request handler works with.

pub mod app_state;

pub use app_state::AppState;
