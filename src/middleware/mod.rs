pub mod auth;
pub mod logging;

pub use auth::{caller_middleware, AuthSettings};
pub use logging::{request_logging_middleware, REQUEST_ID_HEADER};
