pub mod auth;
pub mod backend;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod server;
