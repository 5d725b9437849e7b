//! Embeddable HTTP/1.1 engine core: pipeline executor, pooled transport,
//! retry, redirects, cookies, caching, and proxy tunneling, for embedding
//! into a higher-level HTTP client without depending on one.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod cookie;
pub mod error;
pub mod header;
pub mod method;
pub mod mock;
pub mod pipeline;
pub mod pool;
pub mod proxy;
pub mod redirect;
pub mod registry;
pub mod request;
pub mod response;
pub mod retry;
pub mod tls;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use context::RequestContext;
pub use error::{Error, ErrorKind, Result};
pub use header::HeaderMap;
pub use method::Method;
pub use request::{Request, RequestMetadata};
pub use response::Response;
