//! Cookie attachment and storage middleware (§4.7).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::error::Error;
use crate::pipeline::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;

use super::jar::CookieJar;
use super::parse::parse_set_cookie;

pub struct CookieInterceptor {
	jar: Arc<CookieJar>,
}

impl CookieInterceptor {
	pub fn new(jar: Arc<CookieJar>) -> Self {
		Self { jar }
	}
}

#[async_trait]
impl Interceptor for CookieInterceptor {
	async fn intercept(
		&self,
		mut request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
		next: Next<'_>,
	) -> Result<Response, Error> {
		let is_cross_site = request.metadata.is_cross_site_request.unwrap_or(false);
		if let Some(jar_cookies) = self.jar.header_for_request(&request.uri, request.method, is_cross_site).await {
			// Existing names take precedence over the jar's (§4.7 "Cookie attachment").
			match request.headers.get("Cookie") {
				Some(existing) => {
					let existing_names: std::collections::HashSet<&str> =
						existing.split(';').filter_map(|p| p.split_once('=').map(|(n, _)| n.trim())).collect();
					let merged: Vec<&str> = jar_cookies
						.split("; ")
						.filter(|pair| pair.split_once('=').map(|(n, _)| !existing_names.contains(n.trim())).unwrap_or(true))
						.collect();
					if !merged.is_empty() {
						let combined = format!("{existing}; {}", merged.join("; "));
						request.headers.set("Cookie", combined);
					}
				},
				None => {
					request.headers.set("Cookie", jar_cookies);
				},
			}
		}

		let response = next.call(request, ctx, ct).await?;

		let host = response.request.uri.host_str().map(|h| h.to_ascii_lowercase());
		if let Some(host) = host {
			let path = response.request.uri.path().to_string();
			let is_https = response.request.uri.scheme() == "https";
			let now = chrono::Utc::now();
			for raw in response.headers.get_all("Set-Cookie") {
				if let Some(record) = parse_set_cookie(raw, &host, &path, is_https, now) {
					self.jar.store(record).await;
				}
			}
		}

		Ok(response)
	}
}
