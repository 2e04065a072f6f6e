//! Analytics server: HTTP transport over the analytics engine

pub mod api;
pub mod config;
pub mod validation;
