//! Response value type (§3 "Response").

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::header::HeaderMap;
use crate::request::Request;

#[derive(Clone, Debug)]
pub struct Response {
	pub status: u16,
	pub status_text: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
	pub elapsed: Duration,
	pub error: Option<Arc<Error>>,
	pub request: Arc<Request>,
}

impl Response {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn is_error(&self) -> bool {
		self.error.is_some()
	}

	/// Raises the carried error (if any) or a synthesized `invalidRequest`
	/// error for a non-2xx status, mirroring `ensureSuccess()` in §7.
	pub fn ensure_success(&self) -> Result<(), Error> {
		if let Some(e) = &self.error {
			return Err(Error::new(e.kind, e.message.clone()));
		}
		if !self.is_success() {
			return Err(Error::invalid_request(format!(
				"non-success status: {} {}",
				self.status, self.status_text
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::header::HeaderMap;
	use crate::method::Method;
	use url::Url;

	fn dummy_request() -> Arc<Request> {
		Arc::new(
			Request::new(
				Method::Get,
				Url::parse("https://example.test/").unwrap(),
				HeaderMap::new(),
			)
			.unwrap(),
		)
	}

	#[test]
	fn success_range_is_200_to_299() {
		let r = Response {
			status: 204,
			status_text: "No Content".into(),
			headers: HeaderMap::new(),
			body: vec![],
			elapsed: Duration::ZERO,
			error: None,
			request: dummy_request(),
		};
		assert!(r.is_success());
		assert!(r.ensure_success().is_ok());
	}

	#[test]
	fn ensure_success_raises_on_4xx() {
		let r = Response {
			status: 404,
			status_text: "Not Found".into(),
			headers: HeaderMap::new(),
			body: vec![],
			elapsed: Duration::ZERO,
			error: None,
			request: dummy_request(),
		};
		assert!(r.ensure_success().is_err());
	}
}
