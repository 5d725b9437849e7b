//! Immutable request value type and its metadata map (§3 "Request").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::header::HeaderMap;
use crate::method::Method;

/// Recognized metadata keys (§3). Unrecognized entries are preserved in
/// `extra` so callers can thread their own request-scoped data through the
/// pipeline without the core needing to know about it (§9 DESIGN NOTES).
#[derive(Clone, Debug, Default)]
pub struct RequestMetadata {
	pub follow_redirects: Option<bool>,
	pub max_redirects: Option<u32>,
	pub allow_https_to_http_downgrade: Option<bool>,
	pub enforce_redirect_total_timeout: Option<bool>,
	pub is_cross_site_request: Option<bool>,
	pub extra: HashMap<String, serde_json::Value>,
}

/// Shared, never-mutated body buffer. Requests share ownership of their
/// body (§3 "Ownership"); responses exclusively own theirs.
pub type Body = Arc<Vec<u8>>;

#[derive(Clone, Debug)]
pub struct Request {
	pub method: Method,
	pub uri: Url,
	pub headers: HeaderMap,
	pub body: Option<Body>,
	pub timeout: Duration,
	pub metadata: RequestMetadata,
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl Request {
	/// Constructs a request, validating the URI scheme and defensively
	/// cloning the caller's headers (§3 "Request").
	pub fn new(method: Method, uri: Url, headers: HeaderMap) -> Result<Self, Error> {
		validate_scheme(&uri)?;
		Ok(Self {
			method,
			uri,
			headers,
			body: None,
			timeout: DEFAULT_REQUEST_TIMEOUT,
			metadata: RequestMetadata::default(),
		})
	}

	pub fn with_body(mut self, body: Vec<u8>) -> Self {
		self.body = Some(Arc::new(body));
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
		self.metadata = metadata;
		self
	}

	/// Builds a new request that is `self` retargeted at `uri`, per the
	/// redirect interceptor's "never mutated; replaced wholesale" rule.
	pub fn retargeted(&self, uri: Url) -> Self {
		Self {
			method: self.method,
			uri,
			headers: self.headers.clone(),
			body: self.body.clone(),
			timeout: self.timeout,
			metadata: self.metadata.clone(),
		}
	}
}

fn validate_scheme(uri: &Url) -> Result<(), Error> {
	match uri.scheme() {
		"http" | "https" => Ok(()),
		other => Err(Error::invalid_request(format!(
			"unsupported URI scheme: {other}"
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_non_http_scheme() {
		let uri = Url::parse("ftp://example.test/").unwrap();
		let err = Request::new(Method::Get, uri, HeaderMap::new()).unwrap_err();
		assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
	}

	#[test]
	fn retargeted_preserves_method_and_body() {
		let uri = Url::parse("https://example.test/a").unwrap();
		let req = Request::new(Method::Post, uri, HeaderMap::new())
			.unwrap()
			.with_body(b"hi".to_vec());
		let next = Url::parse("https://example.test/b").unwrap();
		let moved = req.retargeted(next.clone());
		assert_eq!(moved.uri, next);
		assert_eq!(moved.method, Method::Post);
		assert_eq!(moved.body.as_deref(), Some(&b"hi".to_vec()));
	}
}
