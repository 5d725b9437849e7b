//! Redirect interceptor: follows 3xx responses with method/body rewriting,
//! loop/cap/downgrade protection, and a shared total-timeout budget (§4.6).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::RedirectConfig;
use crate::context::RequestContext;
use crate::error::Error;
use crate::header::HeaderMap;
use crate::method::Method;
use crate::pipeline::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;

pub struct RedirectInterceptor {
	config: RedirectConfig,
}

impl RedirectInterceptor {
	pub fn new(config: RedirectConfig) -> Self {
		Self { config }
	}
}

fn canonical_key(uri: &Url) -> String {
	let scheme = uri.scheme().to_ascii_lowercase();
	let host = uri.host_str().unwrap_or("").to_ascii_lowercase();
	let port = uri.port_or_known_default().unwrap_or(0);
	let default_port = matches!((scheme.as_str(), port), ("http", 80) | ("https", 443));
	let port_part = if default_port { String::new() } else { format!(":{port}") };
	format!("{scheme}://{host}{port_part}{}{}", uri.path(), uri.query().map(|q| format!("?{q}")).unwrap_or_default())
}

fn is_cross_origin(a: &Url, b: &Url) -> bool {
	!a.scheme().eq_ignore_ascii_case(b.scheme())
		|| !a.host_str().unwrap_or("").eq_ignore_ascii_case(b.host_str().unwrap_or(""))
		|| a.port_or_known_default() != b.port_or_known_default()
}

/// Resolves `location` against `base`, inheriting the base fragment if the
/// new target has none (RFC 9110 §15.4).
fn resolve_location(base: &Url, location: &str) -> Result<Url, Error> {
	let mut target = base
		.join(location)
		.map_err(|e| Error::with_cause(crate::error::ErrorKind::InvalidRequest, "invalid Location header", e))?;
	if target.fragment().is_none() {
		if let Some(frag) = base.fragment() {
			target.set_fragment(Some(frag));
		}
	}
	Ok(target)
}

/// Applies the method/body rewrite rules for a given status code. Returns
/// the new method and whether the body (and body headers) should be
/// dropped.
fn rewrite_for_status(status: u16, method: Method) -> (Method, bool) {
	match status {
		301 | 302 if method == Method::Post => (Method::Get, true),
		303 if method != Method::Head => (Method::Get, true),
		307 | 308 => (method, false),
		_ => (method, false),
	}
}

fn strip_body_headers(headers: &mut HeaderMap) {
	headers.remove("Content-Length");
	headers.remove("Content-Type");
	headers.remove("Transfer-Encoding");
}

#[async_trait]
impl Interceptor for RedirectInterceptor {
	async fn intercept(
		&self,
		request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
		next: Next<'_>,
	) -> Result<Response, Error> {
		let follow = request.metadata.follow_redirects.unwrap_or(self.config.follow_redirects);
		if !follow {
			return next.call(request, ctx, ct).await;
		}

		let max_redirects = request.metadata.max_redirects.unwrap_or(self.config.max_redirects);
		let allow_downgrade = request
			.metadata
			.allow_https_to_http_downgrade
			.unwrap_or(self.config.allow_https_to_http_downgrade);
		let enforce_total_timeout = request
			.metadata
			.enforce_redirect_total_timeout
			.unwrap_or(self.config.enforce_redirect_total_timeout);

		let original_timeout = request.timeout;
		let start = Instant::now();

		let mut seen = HashSet::new();
		seen.insert(canonical_key(&request.uri));

		let mut current = request;
		let mut hop: u32 = 0;

		loop {
			let response = next.call(current.clone(), ctx.clone(), ct.clone()).await?;

			if !matches!(response.status, 301 | 302 | 303 | 307 | 308) {
				return Ok(response);
			}

			let Some(location) = response.headers.get("Location") else {
				return Ok(response);
			};

			hop += 1;
			if hop > max_redirects {
				return Err(Error::invalid_request("Redirect limit exceeded"));
			}

			let next_uri = resolve_location(&current.uri, location)?;

			if current.uri.scheme() == "https" && next_uri.scheme() == "http" && !allow_downgrade {
				return Err(Error::invalid_request("scheme downgrade from https to http is not permitted"));
			}

			let key = canonical_key(&next_uri);
			if !seen.insert(key) {
				return Err(Error::invalid_request("Redirect loop detected"));
			}

			if enforce_total_timeout {
				let remaining = original_timeout.saturating_sub(start.elapsed());
				if remaining == Duration::ZERO {
					return Err(Error::new(crate::error::ErrorKind::Timeout, "redirect total timeout budget exhausted"));
				}
			}

			let cross_origin = is_cross_origin(&current.uri, &next_uri);
			let (new_method, drop_body) = rewrite_for_status(response.status, current.method);

			let mut headers = current.headers.clone();
			headers.remove("Host");
			if drop_body {
				strip_body_headers(&mut headers);
			}
			if cross_origin {
				headers.remove("Authorization");
				headers.remove("Proxy-Authorization");
				headers.remove("Cookie");
			}

			let mut metadata = current.metadata.clone();
			metadata.is_cross_site_request = Some(cross_origin);

			let remaining_timeout = if enforce_total_timeout {
				original_timeout.saturating_sub(start.elapsed())
			} else {
				current.timeout
			};

			ctx.record_event(
				"redirectHop",
				vec![
					("from".into(), current.uri.to_string()),
					("to".into(), next_uri.to_string()),
					("status".into(), response.status.to_string()),
					("hop".into(), hop.to_string()),
				],
			);

			let mut rebuilt = current.retargeted(next_uri);
			rebuilt.method = new_method;
			rebuilt.headers = headers;
			rebuilt.metadata = metadata;
			rebuilt.timeout = remaining_timeout;
			if drop_body {
				rebuilt.body = None;
			}
			current = rebuilt;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::header::HeaderMap;
	use crate::transport::Transport;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct ScriptedTransport {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl Transport for ScriptedTransport {
		async fn send(&self, request: Request, _ctx: Arc<RequestContext>, _ct: CancellationToken) -> Result<Response, Error> {
			let n = self.calls.fetch_add(1, Ordering::SeqCst);
			let mut headers = HeaderMap::new();
			let (status, location) = match n {
				0 => (302, Some("/resource")),
				_ => (200, None),
			};
			if let Some(loc) = location {
				headers.set("Location", loc);
			}
			Ok(Response {
				status,
				status_text: "".into(),
				headers,
				body: b"resource-body".to_vec(),
				elapsed: Duration::ZERO,
				error: None,
				request: Arc::new(request),
			})
		}
	}

	fn dummy_request() -> Request {
		Request::new(Method::Get, Url::parse("https://example.test/start").unwrap(), HeaderMap::new()).unwrap()
	}

	#[tokio::test]
	async fn follows_single_redirect_to_final_response() {
		let transport = Arc::new(ScriptedTransport { calls: AtomicUsize::new(0) });
		let pipeline =
			crate::pipeline::Pipeline::new(vec![Arc::new(RedirectInterceptor::new(RedirectConfig::default()))], transport);
		let ctx = Arc::new(RequestContext::new(Arc::new(dummy_request())));
		let resp = pipeline.run(dummy_request(), ctx, CancellationToken::new()).await.unwrap();
		assert_eq!(resp.status, 200);
		assert_eq!(resp.body, b"resource-body");
	}

	#[tokio::test]
	async fn redirect_loop_is_rejected() {
		struct LoopTransport;
		#[async_trait]
		impl Transport for LoopTransport {
			async fn send(&self, request: Request, _ctx: Arc<RequestContext>, _ct: CancellationToken) -> Result<Response, Error> {
				let mut headers = HeaderMap::new();
				headers.set("Location", "/start");
				Ok(Response {
					status: 302,
					status_text: "".into(),
					headers,
					body: vec![],
					elapsed: Duration::ZERO,
					error: None,
					request: Arc::new(request),
				})
			}
		}
		let pipeline = crate::pipeline::Pipeline::new(
			vec![Arc::new(RedirectInterceptor::new(RedirectConfig::default()))],
			Arc::new(LoopTransport),
		);
		let ctx = Arc::new(RequestContext::new(Arc::new(dummy_request())));
		let err = pipeline.run(dummy_request(), ctx, CancellationToken::new()).await.unwrap_err();
		assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
	}

	#[test]
	fn post_302_rewrites_to_get_and_drops_body() {
		let (method, drop_body) = rewrite_for_status(302, Method::Post);
		assert_eq!(method, Method::Get);
		assert!(drop_body);
	}

	#[test]
	fn temporary_redirect_preserves_method_and_body() {
		let (method, drop_body) = rewrite_for_status(307, Method::Post);
		assert_eq!(method, Method::Post);
		assert!(!drop_body);
	}
}
