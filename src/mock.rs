//! Test-only transport implementations: a deterministic queue for pipeline
//! unit tests and a recording wrapper for record/replay-style debugging
//! (§8 "Additional test-tooling requirements").

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::error::{Error, ErrorKind};
use crate::header::HeaderMap;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;

/// Hands back pre-seeded outcomes in FIFO order, one per call; never touches
/// the network. Used by interceptor unit tests to isolate the pipeline from
/// `HttpTransport`.
pub struct QueueTransport {
	queue: Mutex<VecDeque<Result<Response, Error>>>,
}

impl QueueTransport {
	pub fn new() -> Self {
		Self {
			queue: Mutex::new(VecDeque::new()),
		}
	}

	pub fn push(&self, outcome: Result<Response, Error>) {
		self.queue.lock().expect("queue lock poisoned").push_back(outcome);
	}
}

impl Default for QueueTransport {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Transport for QueueTransport {
	async fn send(&self, request: Request, _ctx: Arc<RequestContext>, _ct: CancellationToken) -> Result<Response, Error> {
		let queued = self.queue.lock().expect("queue lock poisoned").pop_front();
		match queued {
			Some(Ok(mut response)) => {
				response.request = Arc::new(request);
				Ok(response)
			},
			Some(Err(e)) => Err(e),
			None => Err(Error::new(ErrorKind::Network, "QueueTransport exhausted: no queued responses remain")),
		}
	}
}

/// Headers whose values are replaced with `<redacted>` before recording.
const REDACTED_HEADERS: &[&str] = &["Authorization", "Proxy-Authorization", "Cookie", "Set-Cookie"];

fn redact(headers: &HeaderMap) -> HeaderMap {
	let mut out = HeaderMap::new();
	for (name, value) in headers.iter() {
		if REDACTED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
			out.add(name, "<redacted>");
		} else {
			out.add(name, value);
		}
	}
	out
}

/// One recorded request/response (or request/error) pair, headers redacted.
#[derive(Clone, Debug)]
pub struct RecordedExchange {
	pub request_method: Method,
	pub request_uri: String,
	pub request_headers: HeaderMap,
	pub response_status: Option<u16>,
	pub response_headers: Option<HeaderMap>,
	pub error: Option<String>,
}

/// Wraps a real `Transport`, recording every exchange for later inspection.
pub struct RecordingTransport {
	inner: Arc<dyn Transport>,
	recordings: Mutex<Vec<RecordedExchange>>,
}

impl RecordingTransport {
	pub fn new(inner: Arc<dyn Transport>) -> Self {
		Self {
			inner,
			recordings: Mutex::new(Vec::new()),
		}
	}

	pub fn recordings(&self) -> Vec<RecordedExchange> {
		self.recordings.lock().expect("recordings lock poisoned").clone()
	}
}

#[async_trait]
impl Transport for RecordingTransport {
	async fn send(&self, request: Request, ctx: Arc<RequestContext>, ct: CancellationToken) -> Result<Response, Error> {
		let method = request.method;
		let uri = request.uri.to_string();
		let request_headers = redact(&request.headers);

		let result = self.inner.send(request, ctx, ct).await;

		let exchange = match &result {
			Ok(response) => RecordedExchange {
				request_method: method,
				request_uri: uri,
				request_headers,
				response_status: Some(response.status),
				response_headers: Some(redact(&response.headers)),
				error: None,
			},
			Err(e) => RecordedExchange {
				request_method: method,
				request_uri: uri,
				request_headers,
				response_status: None,
				response_headers: None,
				error: Some(e.to_string()),
			},
		};
		self.recordings.lock().expect("recordings lock poisoned").push(exchange);

		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use url::Url;

	fn dummy_request() -> Request {
		Request::new(Method::Get, Url::parse("https://example.test/").unwrap(), HeaderMap::new()).unwrap()
	}

	fn ok_response(request: &Request, status: u16) -> Response {
		Response {
			status,
			status_text: "".into(),
			headers: HeaderMap::new(),
			body: vec![],
			elapsed: Duration::ZERO,
			error: None,
			request: Arc::new(request.clone()),
		}
	}

	#[tokio::test]
	async fn queue_transport_replays_in_order() {
		let transport = QueueTransport::new();
		let req = dummy_request();
		transport.push(Ok(ok_response(&req, 200)));
		transport.push(Ok(ok_response(&req, 503)));

		let ctx = Arc::new(RequestContext::new(Arc::new(req.clone())));
		let first = transport.send(req.clone(), ctx.clone(), CancellationToken::new()).await.unwrap();
		assert_eq!(first.status, 200);
		let second = transport.send(req.clone(), ctx, CancellationToken::new()).await.unwrap();
		assert_eq!(second.status, 503);
	}

	#[tokio::test]
	async fn queue_transport_errors_when_exhausted() {
		let transport = QueueTransport::new();
		let req = dummy_request();
		let ctx = Arc::new(RequestContext::new(Arc::new(req.clone())));
		let err = transport.send(req, ctx, CancellationToken::new()).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::Network);
	}

	#[tokio::test]
	async fn recording_transport_redacts_sensitive_headers() {
		let inner = Arc::new(QueueTransport::new());
		let mut req = dummy_request();
		req.headers.set("Authorization", "Bearer secret");
		inner.push(Ok(ok_response(&req, 200)));

		let recorder = RecordingTransport::new(inner);
		let ctx = Arc::new(RequestContext::new(Arc::new(req.clone())));
		recorder.send(req, ctx, CancellationToken::new()).await.unwrap();

		let recordings = recorder.recordings();
		assert_eq!(recordings.len(), 1);
		assert_eq!(recordings[0].request_headers.get("Authorization"), Some("<redacted>"));
	}
}
