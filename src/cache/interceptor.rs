//! Cache interceptor: freshness check, conditional revalidation, `X-Cache`
//! stamping (§4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::CacheConfig;
use crate::context::RequestContext;
use crate::error::{Error, ErrorKind};
use crate::header::HeaderMap;
use crate::method::Method;
use crate::pipeline::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;

use super::storage::{parse_cache_control, CacheEntry, CacheKey, CacheStorage, Freshness};

pub struct CacheInterceptor {
	storage: Arc<dyn CacheStorage>,
	config: CacheConfig,
	/// Header names the stored response for a given (method, URI) varies on,
	/// learned from its `Vary` header; needed to compute the vary-key on
	/// the *next* lookup before the entry has been re-fetched (§4.8).
	vary_names: RwLock<HashMap<(Method, String), Vec<String>>>,
}

impl CacheInterceptor {
	pub fn new(storage: Arc<dyn CacheStorage>, config: CacheConfig) -> Self {
		Self {
			storage,
			config,
			vary_names: RwLock::new(HashMap::new()),
		}
	}

	async fn vary_key_for(&self, method: Method, canonical_uri: &str, headers: &HeaderMap) -> String {
		let names = self.vary_names.read().await;
		let Some(names) = names.get(&(method, canonical_uri.to_string())) else {
			return String::new();
		};
		names
			.iter()
			.map(|n| format!("{}={}", n.to_ascii_lowercase(), headers.get(n).unwrap_or("").trim()))
			.collect::<Vec<_>>()
			.join("&")
	}

	async fn remember_vary(&self, method: Method, canonical_uri: &str, response_headers: &HeaderMap) {
		let Some(vary) = response_headers.get("Vary") else {
			return;
		};
		let names: Vec<String> = vary.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
		if names.is_empty() {
			return;
		}
		self.vary_names.write().await.insert((method, canonical_uri.to_string()), names);
	}

	fn is_storable(&self, request: &Request, response: &Response) -> bool {
		if !request.method.is_safe() {
			return false;
		}
		if !response.is_success() {
			return false;
		}
		let cc = parse_cache_control(&response.headers);
		if cc.no_store {
			return false;
		}
		if response.headers.contains("Set-Cookie") && !self.config.allow_set_cookie_responses {
			return false;
		}
		if request.headers.contains("Authorization") && !self.config.allow_authorized_responses {
			return false;
		}
		true
	}

	fn compute_freshness(&self, headers: &HeaderMap) -> Freshness {
		let cc = parse_cache_control(headers);
		if cc.no_cache {
			return Freshness::MustRevalidate;
		}
		if let Some(max_age) = cc.s_maxage.or(cc.max_age) {
			return Freshness::Fresh { expires_at: Instant::now() + max_age };
		}
		if let Some(expires_raw) = headers.get("Expires") {
			if let Ok(expires) = chrono::DateTime::parse_from_rfc2822(expires_raw) {
				let now_utc = chrono::Utc::now();
				let delta = expires.with_timezone(&chrono::Utc) - now_utc;
				if let Ok(std_delta) = delta.to_std() {
					return Freshness::Fresh { expires_at: Instant::now() + std_delta };
				}
				return Freshness::MustRevalidate;
			}
		}
		if let Some(last_modified_raw) = headers.get("Last-Modified") {
			if let Ok(last_modified) = chrono::DateTime::parse_from_rfc2822(last_modified_raw) {
				let age = (chrono::Utc::now() - last_modified.with_timezone(&chrono::Utc))
					.to_std()
					.unwrap_or(Duration::ZERO);
				let heuristic = Duration::from_secs_f64(age.as_secs_f64() * 0.1).min(self.config.heuristic_max_age);
				return Freshness::Fresh { expires_at: Instant::now() + heuristic };
			}
		}
		Freshness::MustRevalidate
	}
}

#[async_trait]
impl Interceptor for CacheInterceptor {
	async fn intercept(
		&self,
		request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
		next: Next<'_>,
	) -> Result<Response, Error> {
		if !request.method.is_safe() {
			return next.call(request, ctx, ct).await;
		}

		let canonical_uri = request.uri.as_str().to_string();
		let vary_key = self.vary_key_for(request.method, &canonical_uri, &request.headers).await;
		let key = CacheKey::new(request.method, &canonical_uri, &vary_key);

		let stored = self.storage.get(&key).await;

		let Some(entry) = stored else {
			let response = next.call(request.clone(), ctx.clone(), ct.clone()).await?;
			self.remember_vary(request.method, &canonical_uri, &response.headers).await;
			if self.is_storable(&request, &response) {
				let freshness = self.compute_freshness(&response.headers);
				self
					.storage
					.put(
						key,
						CacheEntry {
							status: response.status,
							status_text: response.status_text.clone(),
							headers: response.headers.clone(),
							body: response.body.clone(),
							stored_at: Instant::now(),
							freshness,
						},
					)
					.await;
			}
			let mut response = response;
			response.headers.set("X-Cache", "MISS");
			return Ok(response);
		};

		if entry.is_fresh() {
			return Ok(Response {
				status: entry.status,
				status_text: entry.status_text.clone(),
				headers: {
					let mut h = entry.headers.clone();
					h.set("X-Cache", "HIT");
					h
				},
				body: entry.body.clone(),
				elapsed: ctx.elapsed(),
				error: None,
				request: Arc::new(request.clone()),
			});
		}

		let mut revalidation = request.clone();
		if let Some(etag) = entry.headers.get("ETag") {
			revalidation.headers.set("If-None-Match", etag);
		}
		if let Some(last_modified) = entry.headers.get("Last-Modified") {
			revalidation.headers.set("If-Modified-Since", last_modified);
		}

		match next.call(revalidation, ctx.clone(), ct.clone()).await {
			Ok(response) if response.status == 304 => {
				let mut headers = entry.headers.clone();
				for name in response.headers.names() {
					for value in response.headers.get_all(name) {
						headers.set(name, value);
					}
				}
				headers.set("X-Cache", "REVALIDATED");
				let merged = CacheEntry {
					status: entry.status,
					status_text: entry.status_text.clone(),
					headers: headers.clone(),
					body: entry.body.clone(),
					stored_at: Instant::now(),
					freshness: self.compute_freshness(&headers),
				};
				self.storage.put(key, merged).await;
				Ok(Response {
					status: entry.status,
					status_text: entry.status_text,
					headers,
					body: entry.body,
					elapsed: ctx.elapsed(),
					error: None,
					request: Arc::new(request),
				})
			},
			Ok(response) if response.is_success() => {
				self.remember_vary(request.method, &canonical_uri, &response.headers).await;
				if self.is_storable(&request, &response) {
					let freshness = self.compute_freshness(&response.headers);
					self
						.storage
						.put(
							key,
							CacheEntry {
								status: response.status,
								status_text: response.status_text.clone(),
								headers: response.headers.clone(),
								body: response.body.clone(),
								stored_at: Instant::now(),
								freshness,
							},
						)
						.await;
				} else {
					self.storage.invalidate(&key).await;
				}
				let mut response = response;
				response.headers.set("X-Cache", "MISS");
				Ok(response)
			},
			Ok(response) => Ok(response),
			Err(e) => {
				let is_network_failure = matches!(e.kind, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::ProxyConnectFailed);
				if self.config.serve_stale_on_network_failure && is_network_failure {
					debug!("serving stale cache entry after network failure");
					return Ok(Response {
						status: entry.status,
						status_text: entry.status_text.clone(),
						headers: {
							let mut h = entry.headers.clone();
							h.set("X-Cache", "STALE");
							h
						},
						body: entry.body.clone(),
						elapsed: ctx.elapsed(),
						error: None,
						request: Arc::new(request),
					});
				}
				Err(e)
			},
		}
	}
}
