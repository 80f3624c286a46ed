//! Chat History Backend Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod provider;
/// Application state management
///
/// Shared handles cloned into every request handler.
pub mod state;
