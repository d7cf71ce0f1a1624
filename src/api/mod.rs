pub mod envelope;

pub use envelope::{DispatchResponse, ErrorBody, RequestBody, RequestEnvelope, ResponseEnvelope, ResponseMeta};
