//! Crate-level public API surface: a builder that wires the pipeline,
//! transport, and interceptor stack together (§6 "Crate-level public API
//! surface").
//!
//! Grounded on the teacher's construct-collaborators-then-assemble pattern
//! in `crates/hbone/src/pool.rs::WorkloadHBONEPool::new`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheInterceptor, CacheStorage, InMemoryCacheStorage};
use crate::config::{CacheConfig, ClientConfig, CookieConfig, PoolConfig, ProxyConfig, RedirectConfig, ResponseLimits, RetryConfig};
use crate::context::RequestContext;
use crate::cookie::{CookieInterceptor, CookieJar};
use crate::error::Error;
use crate::pipeline::{Interceptor, Pipeline};
use crate::pool::ConnectionPool;
use crate::redirect::RedirectInterceptor;
use crate::request::Request;
use crate::response::Response;
use crate::retry::RetryInterceptor;
use crate::tls::{RustlsConnector, TlsConnector};
use crate::transport::{HttpDialer, HttpTransport, Transport};

/// Builds a [`Client`] from a [`ClientConfig`], with per-collaborator
/// overrides (custom TLS connector, cache storage, or a whole transport
/// substitute for tests).
pub struct ClientBuilder {
	config: ClientConfig,
	tls: Option<Arc<dyn TlsConnector>>,
	cache_storage: Option<Arc<dyn CacheStorage>>,
	transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
	fn new() -> Self {
		Self {
			config: ClientConfig::default(),
			tls: None,
			cache_storage: None,
			transport: None,
		}
	}

	pub fn pool(mut self, cfg: PoolConfig) -> Self {
		self.config.pool = cfg;
		self
	}

	pub fn retry(mut self, cfg: RetryConfig) -> Self {
		self.config.retry = cfg;
		self
	}

	pub fn redirect(mut self, cfg: RedirectConfig) -> Self {
		self.config.redirect = cfg;
		self
	}

	pub fn cookies(mut self, cfg: CookieConfig) -> Self {
		self.config.cookie = cfg;
		self
	}

	pub fn cache(mut self, cfg: CacheConfig) -> Self {
		self.config.cache = cfg;
		self
	}

	pub fn cache_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
		self.cache_storage = Some(storage);
		self
	}

	pub fn proxy(mut self, cfg: ProxyConfig) -> Self {
		self.config.proxy = cfg;
		self
	}

	pub fn response_limits(mut self, limits: ResponseLimits) -> Self {
		self.config.response = limits;
		self
	}

	pub fn tls_connector(mut self, tls: Arc<dyn TlsConnector>) -> Self {
		self.tls = Some(tls);
		self
	}

	/// Escape hatch for tests: bypass the real transport entirely (e.g. with
	/// `mock::QueueTransport`). The interceptor stack still runs.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Assembles the interceptor stack in the fixed documented order — cache,
	/// cookie, redirect, retry, transport (outermost to innermost) — so a
	/// cache hit short-circuits before any network-affecting interceptor
	/// runs (§6).
	pub fn build(self) -> Result<Client, Error> {
		let transport: Arc<dyn Transport> = match self.transport {
			Some(t) => t,
			None => {
				let tls = match self.tls {
					Some(t) => t,
					None => Arc::new(RustlsConnector::new()?),
				};
				let dialer = Arc::new(HttpDialer::new(tls, self.config.proxy.clone(), self.config.response.clone()));
				let pool = Arc::new(ConnectionPool::new(self.config.pool.clone(), dialer));
				Arc::new(HttpTransport::new(pool, self.config.proxy.clone(), self.config.response.clone()))
			},
		};

		let cache_storage = self.cache_storage.unwrap_or_else(|| Arc::new(InMemoryCacheStorage::new()));
		let jar = Arc::new(CookieJar::new(self.config.cookie.clone()));

		let interceptors: Vec<Arc<dyn Interceptor>> = vec![
			Arc::new(CacheInterceptor::new(cache_storage, self.config.cache.clone())),
			Arc::new(CookieInterceptor::new(jar)),
			Arc::new(RedirectInterceptor::new(self.config.redirect.clone())),
			Arc::new(RetryInterceptor::new(self.config.retry.clone())),
		];

		Ok(Client {
			pipeline: Pipeline::new(interceptors, transport),
		})
	}
}

impl Default for ClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// The assembled request-execution engine: pipeline over transport, per
/// §4.4.
pub struct Client {
	pipeline: Pipeline,
}

impl Client {
	pub fn builder() -> ClientBuilder {
		ClientBuilder::new()
	}

	/// Executes `request` with a fresh, non-cancellable context.
	pub async fn send(&self, request: Request) -> Result<Response, Error> {
		self.send_with_cancellation(request, CancellationToken::new()).await
	}

	/// Executes `request`, honoring `ct` for cooperative cancellation
	/// (§4.10).
	pub async fn send_with_cancellation(&self, request: Request, ct: CancellationToken) -> Result<Response, Error> {
		let ctx = Arc::new(RequestContext::new(Arc::new(request.clone())));
		self.pipeline.run(request, ctx, ct).await
	}
}
