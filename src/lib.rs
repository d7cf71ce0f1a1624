pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod intent;
pub mod middleware;
pub mod policy;
pub mod registry;
pub mod select;
pub mod store;
pub mod types;

pub use error::GatewayError;
