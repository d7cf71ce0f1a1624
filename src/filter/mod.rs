pub mod compile;
pub mod error;
pub mod eval;
pub mod types;

pub use compile::{compile, FilterCompiler};
pub use error::FilterError;
pub use eval::{loosely_equal, FieldResolver};
pub use types::*;
