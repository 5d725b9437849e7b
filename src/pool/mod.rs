//! Per-host pooled-connection manager (§4.2).
//!
//! Grounded on the teacher's `WorkloadHBONEPool` (`crates/hbone/src/pool.rs`):
//! a per-key state map behind a keyed lock, simplified here from HTTP/2
//! stream-multiplexed connections down to HTTP/1.1's one-request-at-a-time
//! connection model, which is why a simple semaphore + FIFO deque replaces
//! the teacher's `pingora_pool` + `flurry` machinery.

pub mod key;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::context::RequestContext;
use crate::error::{Error, ErrorKind};

pub use key::PoolKey;

/// Opens a brand-new connection for `key`: DNS resolve, TCP connect, TLS
/// handshake if `https`, proxy tunnel if configured. Implemented by
/// `transport::HttpDialer` once a proxy configuration and TLS connector are
/// in scope; kept as a trait so the pool has no knowledge of proxying or
/// TLS. Receives the request context so it can record the
/// `dnsStart`/`dnsEnd`/`tcpConnectStart`/`tcpConnectEnd`/`tlsStart`/`tlsEnd`
/// timeline events (§4.3).
#[async_trait]
pub trait Dialer: Send + Sync {
	async fn dial(
		&self,
		key: &PoolKey,
		ctx: &Arc<RequestContext>,
		ct: &CancellationToken,
	) -> Result<PooledConnection, Error>;
}

struct HostPool {
	permits: Arc<Semaphore>,
	idle: Mutex<VecDeque<PooledConnection>>,
}

impl HostPool {
	fn new(max_per_host: usize) -> Self {
		Self {
			permits: Arc::new(Semaphore::new(max_per_host)),
			idle: Mutex::new(VecDeque::new()),
		}
	}
}

pub struct ConnectionPool {
	config: PoolConfig,
	global_permits: Arc<Semaphore>,
	hosts: RwLock<HashMap<PoolKey, Arc<HostPool>>>,
	dialer: Arc<dyn Dialer>,
}

impl ConnectionPool {
	pub fn new(config: PoolConfig, dialer: Arc<dyn Dialer>) -> Self {
		let global_permits = Arc::new(Semaphore::new(config.max_total_connections));
		Self {
			config,
			global_permits,
			hosts: RwLock::new(HashMap::new()),
			dialer,
		}
	}

	async fn host_pool(&self, key: &PoolKey) -> Arc<HostPool> {
		if let Some(h) = self.hosts.read().await.get(key) {
			return h.clone();
		}
		let mut hosts = self.hosts.write().await;
		hosts
			.entry(key.clone())
			.or_insert_with(|| Arc::new(HostPool::new(self.config.max_connections_per_host)))
			.clone()
	}

	/// Acquires a connection lease for `key`: global permit first, then
	/// per-host permit (to prevent starvation of small hosts by large ones,
	/// §4.2). Reuses an idle connection (discarding any that have exceeded
	/// the idle timeout) or dials a new one.
	pub async fn acquire(
		&self,
		key: &PoolKey,
		ctx: &Arc<RequestContext>,
		ct: &CancellationToken,
	) -> Result<Lease, Error> {
		let global_permit = acquire_permit(&self.global_permits, ct).await?;

		let host_pool = self.host_pool(key).await;
		let host_permit = match acquire_permit(&host_pool.permits, ct).await {
			Ok(p) => p,
			Err(e) => {
				// Per-host acquisition failed/cancelled after the global
				// permit succeeded: release the global permit by dropping it.
				drop(global_permit);
				return Err(e);
			},
		};

		if let Some(conn) = self.take_fresh_idle(&host_pool).await {
			trace!(host = %key.host, port = key.port, "reusing pooled connection");
			return Ok(Lease {
				key: key.clone(),
				host_pool,
				global_permit: Some(global_permit),
				host_permit: Some(host_permit),
				connection: Some(conn),
				reused: true,
				disposed: false,
			});
		}

		debug!(host = %key.host, port = key.port, "dialing new connection");
		let conn = self.dialer.dial(key, ctx, ct).await?;
		Ok(Lease {
			key: key.clone(),
			host_pool,
			global_permit: Some(global_permit),
			host_permit: Some(host_permit),
			connection: Some(conn),
			reused: false,
			disposed: false,
		})
	}

	/// Pops idle connections FIFO (§5 "fair reuse"), discarding any whose
	/// idle duration exceeds the configured maximum (§4.2 invariant 3).
	async fn take_fresh_idle(&self, host_pool: &HostPool) -> Option<PooledConnection> {
		let mut idle = host_pool.idle.lock().await;
		while let Some(conn) = idle.pop_front() {
			if conn.idle_for() > self.config.idle_connection_timeout {
				debug!(host = %conn.remote_host, "discarding expired idle connection");
				continue;
			}
			return Some(conn);
		}
		None
	}
}

async fn acquire_permit(sem: &Arc<Semaphore>, ct: &CancellationToken) -> Result<OwnedSemaphorePermit, Error> {
	tokio::select! {
		biased;
		_ = ct.cancelled() => Err(Error::new(ErrorKind::Cancelled, "cancelled while acquiring connection pool permit")),
		res = sem.clone().acquire_owned() => res.map_err(|e| Error::with_cause(ErrorKind::Network, "connection pool semaphore closed", e)),
	}
}

/// A scoped handle representing exclusive use of a pooled connection.
/// Release is guaranteed on every exit path (`Drop`) and idempotent.
pub struct Lease {
	key: PoolKey,
	host_pool: Arc<HostPool>,
	global_permit: Option<OwnedSemaphorePermit>,
	host_permit: Option<OwnedSemaphorePermit>,
	connection: Option<PooledConnection>,
	reused: bool,
	disposed: bool,
}

impl Lease {
	pub fn is_reused(&self) -> bool {
		self.reused
	}

	pub fn key(&self) -> &PoolKey {
		&self.key
	}

	pub fn connection_mut(&mut self) -> &mut PooledConnection {
		self.connection.as_mut().expect("connection taken from an active lease")
	}

	/// Probes whether a reused connection's peer has already closed it
	/// (§4.2 "Stale detection"). Only meaningful before any bytes have been
	/// written on this attempt.
	pub fn is_stale(&self) -> std::io::Result<bool> {
		let conn = self.connection.as_ref().expect("connection taken from an active lease");
		conn.stream.get_ref().peek_readable()
	}

	/// Marks the connection for disposal instead of returning it to the
	/// pool (§4.11: stale detection, non-keepalive, or I/O error => Closing).
	pub fn dispose(&mut self) {
		self.disposed = true;
	}

	/// Consumes the lease's connection, e.g. to hand it to a retry attempt
	/// on a fresh dial while still releasing this lease's permits.
	pub fn take_connection(&mut self) -> PooledConnection {
		self.disposed = true;
		self.connection.take().expect("connection already taken")
	}
}

impl Drop for Lease {
	fn drop(&mut self) {
		if self.disposed {
			// Permits drop along with `self`, releasing exactly one global
			// and one per-host permit (§4.2 invariant 4); the connection, if
			// still present, is simply dropped (closed).
			return;
		}
		if let Some(conn) = self.connection.take() {
			if !conn.supports_keep_alive {
				return;
			}
			let host_pool = self.host_pool.clone();
			tokio::spawn(async move {
				let mut idle = host_pool.idle.lock().await;
				let mut conn = conn;
				conn.touch();
				idle.push_back(conn);
			});
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::{buffered, Socket};
	use crate::header::HeaderMap;
	use crate::method::Method;
	use crate::request::Request;
	use tokio::net::{TcpListener, TcpStream};
	use url::Url;

	fn dummy_request() -> Request {
		Request::new(Method::Get, Url::parse("http://example.test/").unwrap(), HeaderMap::new()).unwrap()
	}

	struct CountingDialer {
		calls: std::sync::atomic::AtomicUsize,
	}

	#[async_trait]
	impl Dialer for CountingDialer {
		async fn dial(
			&self,
			key: &PoolKey,
			_ctx: &Arc<RequestContext>,
			_ct: &CancellationToken,
		) -> Result<PooledConnection, Error> {
			self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
			let addr = listener.local_addr().unwrap();
			let client = TcpStream::connect(addr).await.unwrap();
			tokio::spawn(async move {
				let _ = listener.accept().await;
			});
			Ok(PooledConnection::new(
				key.host.clone(),
				key.port,
				buffered(Socket::Plain(client)),
			))
		}
	}

	#[tokio::test]
	async fn reuses_checked_in_connection() {
		let dialer = Arc::new(CountingDialer {
			calls: Default::default(),
		});
		let pool = ConnectionPool::new(PoolConfig::default(), dialer.clone());
		let key = PoolKey::new("http", "example.test", 80, None);
		let ct = CancellationToken::new();
		let ctx = Arc::new(RequestContext::new(Arc::new(dummy_request())));

		let lease = pool.acquire(&key, &ctx, &ct).await.unwrap();
		assert!(!lease.is_reused());
		drop(lease);
		// Give the spawned check-in task a chance to run.
		tokio::task::yield_now().await;
		tokio::time::sleep(Duration::from_millis(10)).await;

		let lease2 = pool.acquire(&key, &ctx, &ct).await.unwrap();
		assert!(lease2.is_reused());
		assert_eq!(dialer.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn respects_per_host_concurrency_limit() {
		let mut cfg = PoolConfig::default();
		cfg.max_connections_per_host = 2;
		let dialer = Arc::new(CountingDialer {
			calls: Default::default(),
		});
		let pool = Arc::new(ConnectionPool::new(cfg, dialer));
		let key = PoolKey::new("http", "example.test", 80, None);
		let ct = CancellationToken::new();
		let ctx = Arc::new(RequestContext::new(Arc::new(dummy_request())));

		let l1 = pool.acquire(&key, &ctx, &ct).await.unwrap();
		let l2 = pool.acquire(&key, &ctx, &ct).await.unwrap();

		let pool2 = pool.clone();
		let key2 = key.clone();
		let ct2 = ct.clone();
		let ctx2 = ctx.clone();
		let third = tokio::spawn(async move {
			tokio::time::timeout(Duration::from_millis(50), pool2.acquire(&key2, &ctx2, &ct2)).await
		});
		let result = third.await.unwrap();
		assert!(result.is_err(), "third acquire should not complete while 2 are held");
		drop(l1);
		drop(l2);
	}
}
