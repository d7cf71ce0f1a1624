pub mod call;
pub mod intents;
pub mod server;
pub mod token;
