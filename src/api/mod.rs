//! HTTP surface: wire models and axum handlers.

pub mod handlers;
pub mod models;
