//! Account registration, login and bearer-token authentication over HTTP.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
