//! Transport: the pipeline's terminal link, owning connection dial, wire
//! serialization/parsing, the per-request deadline, and pool check-in
//! (§4.3).
//!
//! Grounded on the teacher's `crates/hbone/src/pool.rs` connect-and-serve
//! loop, generalized here from HTTP/2 stream multiplexing down to a single
//! HTTP/1.1 request/response per lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::codec::{self, request::TargetForm};
use crate::config::{ProxyConfig, ResponseLimits};
use crate::connection::{buffered, PooledConnection, Socket};
use crate::context::RequestContext;
use crate::error::{Error, ErrorKind};
use crate::pool::{ConnectionPool, Dialer, PoolKey};
use crate::proxy::{self, tunnel, ProxyDecision};
use crate::request::Request;
use crate::response::Response;
use crate::tls::TlsConnector;

/// The pipeline's terminal link (§4.4): `send(request, context, ct) ->
/// response`.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, request: Request, ctx: Arc<RequestContext>, ct: CancellationToken) -> Result<Response, Error>;
}

/// Dials new connections for the pool: DNS + TCP connect, TLS handshake if
/// `https`, proxy CONNECT tunnel or absolute-form forwarding if configured
/// (§4.9).
pub struct HttpDialer {
	tls: Arc<dyn TlsConnector>,
	proxy_cfg: ProxyConfig,
	limits: ResponseLimits,
}

impl HttpDialer {
	pub fn new(tls: Arc<dyn TlsConnector>, proxy_cfg: ProxyConfig, limits: ResponseLimits) -> Self {
		Self { tls, proxy_cfg, limits }
	}
}

async fn connect_tcp(host: &str, port: u16, ct: &CancellationToken) -> Result<TcpStream, Error> {
	let connect_fut = TcpStream::connect((host, port));
	tokio::select! {
		biased;
		_ = ct.cancelled() => Err(Error::new(ErrorKind::Cancelled, "cancelled while connecting")),
		res = connect_fut => res.map_err(|e| Error::with_cause(ErrorKind::Network, format!("failed to connect to {host}:{port}"), e)),
	}
}

#[async_trait]
impl Dialer for HttpDialer {
	async fn dial(&self, key: &PoolKey, ctx: &Arc<RequestContext>, ct: &CancellationToken) -> Result<PooledConnection, Error> {
		let decision = proxy::resolve(&key.scheme, &key.host, key.port, &self.proxy_cfg)?;

		ctx.record_event("tcpConnectStart", vec![("host".into(), key.host.clone())]);
		let raw = match &decision {
			ProxyDecision::Direct => connect_tcp(&key.host, key.port, ct).await?,
			ProxyDecision::Forward { proxy_host, proxy_port } => connect_tcp(proxy_host, *proxy_port, ct).await?,
			ProxyDecision::Tunnel { proxy_host, proxy_port } => {
				tunnel::connect_tunnel(proxy_host, *proxy_port, &key.host, key.port, &self.proxy_cfg, &self.limits, ct).await?
			},
		};
		ctx.record_event("tcpConnectEnd", vec![]);

		let socket = if key.scheme == "https" {
			ctx.record_event("tlsStart", vec![]);
			let wrapped = self.tls.wrap(raw, &key.host, &["http/1.1"]).await?;
			ctx.record_event("tlsEnd", vec![]);
			let mut conn = PooledConnection::new(key.host.clone(), key.port, buffered(Socket::Tls(Box::new(wrapped.stream))));
			conn.negotiated_alpn = wrapped.negotiated_alpn;
			conn.tls_version = wrapped.tls_version;
			conn
		} else {
			PooledConnection::new(key.host.clone(), key.port, buffered(Socket::Plain(raw)))
		};

		Ok(socket)
	}
}

/// The default `Transport` implementation: a connection pool plus proxy
/// awareness, executing the §4.3 algorithm.
pub struct HttpTransport {
	pool: Arc<ConnectionPool>,
	proxy_cfg: ProxyConfig,
	limits: ResponseLimits,
}

impl HttpTransport {
	pub fn new(pool: Arc<ConnectionPool>, proxy_cfg: ProxyConfig, limits: ResponseLimits) -> Self {
		Self { pool, proxy_cfg, limits }
	}

	fn target_host_port(request: &Request) -> Result<(String, u16), Error> {
		let host = request
			.uri
			.host_str()
			.ok_or_else(|| Error::invalid_request("request URI has no host"))?
			.to_string();
		let port = request
			.uri
			.port_or_known_default()
			.ok_or_else(|| Error::invalid_request("request URI has no resolvable port"))?;
		Ok((host, port))
	}

	/// Boxed because the stale-connection retry calls itself once more;
	/// an `async fn` cannot describe that self-referential future shape.
	fn send_once<'a>(
		&'a self,
		request: &'a Request,
		ctx: &'a Arc<RequestContext>,
		linked: &'a CancellationToken,
		allow_stale_retry: bool,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, Error>> + Send + 'a>> {
		Box::pin(async move {
			let (host, port) = Self::target_host_port(request)?;
			let scheme = request.uri.scheme();
			let decision = proxy::resolve(scheme, &host, port, &self.proxy_cfg)?;
			let key = PoolKey::new(scheme, &host, port, decision.identity());

			let mut lease = self.pool.acquire(&key, ctx, linked).await?;

			if lease.is_reused() {
				match lease.is_stale() {
					Ok(true) if allow_stale_retry && request.method.is_idempotent() => {
						debug!(host = %host, "discarding stale reused connection, retrying once");
						lease.dispose();
						return self.send_once(request, ctx, linked, false).await;
					},
					Ok(_) => {},
					Err(e) => return Err(Error::from(e)),
				}
			}

			let target_form = match &decision {
				ProxyDecision::Forward { .. } => TargetForm::Absolute,
				_ => TargetForm::Origin,
			};
			// A forward (plain-http) proxy never sees a CONNECT tunnel, so it
			// gets its own Proxy-Authorization directly on the forwarded
			// request, subject to the same plaintext-auth gate as the tunnel
			// (§4.9).
			let forward_auth_request;
			let request_to_send = if matches!(decision, ProxyDecision::Forward { .. }) {
				forward_auth_request = proxy::apply_forward_auth(request, &self.proxy_cfg)?;
				&forward_auth_request
			} else {
				request
			};
			let wire = codec::request::serialize_request(request_to_send, target_form)?;

			// Every blocking step below races `linked` so a fired deadline (or
			// an outer cancellation) interrupts a stalled peer instead of
			// waiting for it to close the socket (§4.3 step 2, §4.10). A
			// connection cut off mid-attempt is disposed, never returned to
			// the pool in an indeterminate state.
			let write_outcome = {
				let conn = lease.connection_mut();
				tokio::select! {
					biased;
					_ = linked.cancelled() => None,
					res = conn.stream.get_mut().write_all(&wire) => Some(res),
				}
			};

			let write_result = match write_outcome {
				None => {
					lease.dispose();
					return Err(Error::new(ErrorKind::Cancelled, "cancelled while writing request"));
				},
				Some(result) => result,
			};

			if let Err(e) = write_result {
				if lease.is_reused() && lease.connection_mut().bytes_written_this_attempt == 0 && request.method.is_idempotent() {
					lease.dispose();
					debug!(host = %host, "write failed with zero bytes sent on reused connection, retrying once");
					return self.send_once(request, ctx, linked, false).await;
				}
				lease.dispose();
				return Err(Error::with_cause(ErrorKind::Network, "failed to write request", e));
			}
			lease.connection_mut().bytes_written_this_attempt += wire.len() as u64;
			ctx.record_event("requestWritten", vec![]);

			let flush_outcome = {
				let conn = lease.connection_mut();
				tokio::select! {
					biased;
					_ = linked.cancelled() => None,
					res = conn.stream.get_mut().flush() => Some(res),
				}
			};
			match flush_outcome {
				None => {
					lease.dispose();
					return Err(Error::new(ErrorKind::Cancelled, "cancelled while flushing request"));
				},
				Some(Err(e)) => {
					lease.dispose();
					return Err(Error::with_cause(ErrorKind::Network, "failed to flush request", e));
				},
				Some(Ok(())) => {},
			}

			let parsed = {
				let conn = lease.connection_mut();
				tokio::select! {
					biased;
					_ = linked.cancelled() => None,
					res = codec::response::parse_response(&mut conn.stream, request.method, &self.limits) => Some(res),
				}
			};

			let parsed = match parsed {
				None => {
					lease.dispose();
					return Err(Error::new(ErrorKind::Cancelled, "cancelled while reading response"));
				},
				Some(Ok(p)) => p,
				Some(Err(e)) => {
					lease.dispose();
					return Err(e);
				},
			};
			ctx.record_event("firstByte", vec![]);
			ctx.record_event("responseComplete", vec![]);

			if parsed.keep_alive {
				lease.connection_mut().supports_keep_alive = true;
			} else {
				lease.dispose();
			}

			Ok(Response {
				status: parsed.status,
				status_text: parsed.status_text,
				headers: parsed.headers,
				body: parsed.body,
				elapsed: ctx.elapsed(),
				error: None,
				request: Arc::new(request.clone()),
			})
		})
	}
}

#[async_trait]
impl Transport for HttpTransport {
	#[instrument(skip_all, fields(method = %request.method, uri = %request.uri))]
	async fn send(&self, request: Request, ctx: Arc<RequestContext>, ct: CancellationToken) -> Result<Response, Error> {
		match request.uri.scheme() {
			"http" | "https" => {},
			other => return Err(Error::invalid_request(format!("unsupported URI scheme: {other}"))),
		}

		let linked = ct.child_token();
		let deadline_fired = Arc::new(AtomicBool::new(false));
		let timer_token = linked.clone();
		let timer_flag = deadline_fired.clone();
		let timeout = request.timeout;
		let timer = tokio::spawn(async move {
			tokio::time::sleep(timeout).await;
			timer_flag.store(true, Ordering::SeqCst);
			timer_token.cancel();
		});

		let result = self.send_once(&request, &ctx, &linked, true).await;
		timer.abort();

		result.map_err(|e| {
			if matches!(e.kind, ErrorKind::Cancelled) {
				if ct.is_cancelled() {
					Error::new(ErrorKind::Cancelled, "request cancelled")
				} else if deadline_fired.load(Ordering::SeqCst) {
					Error::new(ErrorKind::Timeout, "request timed out")
				} else {
					e
				}
			} else {
				e
			}
		})
	}
}
