//! HTTP/1.1 wire codec (§4.1): request serialization and response parsing.

pub mod request;
pub mod response;

pub use request::serialize_request;
pub use response::{parse_response, ParsedResponse};
