//! HTTP query surface: history, sources, enqueue and health.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
