//! TLS collaborator contract (§6) and a default `rustls`-backed implementation.
//!
//! Grounded on the teacher's `CertificateFetcher<K>: Send + Sync` async
//! trait (`crates/hbone/src/pool.rs`) and its `tokio_rustls::TlsConnector`
//! usage pattern.

use std::sync::Arc;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector as RustlsTlsConnector;

use crate::error::{Error, ErrorKind};

/// The wrapped, negotiated secure stream handed back to the caller.
pub struct WrappedStream {
	pub stream: TlsStream<TcpStream>,
	pub negotiated_alpn: Option<String>,
	pub tls_version: Option<String>,
}

/// The TLS collaborator contract the core consumes (§6). Implementations
/// must fail fast on invalid certificates and must not silently proceed
/// past a failed handshake.
#[async_trait]
pub trait TlsConnector: Send + Sync {
	async fn wrap(
		&self,
		raw: TcpStream,
		host: &str,
		alpn_protocols: &[&str],
	) -> Result<WrappedStream, Error>;
}

/// Default connector built on `tokio-rustls`, trusting the platform's native
/// certificate roots via `rustls-native-certs`.
pub struct RustlsConnector {
	config: Arc<rustls::ClientConfig>,
}

impl RustlsConnector {
	/// Builds a connector that only ever offers `http/1.1` over ALPN. The
	/// core never speaks HTTP/2 itself (§1 Non-goals); a caller embedding a
	/// separate HTTP/2 implementation may supply their own `TlsConnector`
	/// that advertises `h2` and routes accordingly (§6).
	pub fn new() -> Result<Self, Error> {
		let mut roots = rustls::RootCertStore::empty();
		let native = rustls_native_certs::load_native_certs();
		for cert in native.certs {
			let _ = roots.add(cert);
		}
		let mut config = rustls::ClientConfig::builder()
			.with_root_certificates(roots)
			.with_no_client_auth();
		config.alpn_protocols = vec![b"http/1.1".to_vec()];
		Ok(Self {
			config: Arc::new(config),
		})
	}
}

#[async_trait]
impl TlsConnector for RustlsConnector {
	async fn wrap(
		&self,
		raw: TcpStream,
		host: &str,
		alpn_protocols: &[&str],
	) -> Result<WrappedStream, Error> {
		let mut config = (*self.config).clone();
		if !alpn_protocols.is_empty() {
			config.alpn_protocols = alpn_protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
		}
		let connector = RustlsTlsConnector::from(Arc::new(config));
		let server_name = ServerName::try_from(host.to_string())
			.map_err(|e| Error::with_cause(ErrorKind::Tls, format!("invalid server name: {host}"), e))?;
		let stream = connector
			.connect(server_name, raw)
			.await
			.map_err(|e| Error::with_cause(ErrorKind::Tls, "TLS handshake failed", e))?;

		let (_, session) = stream.get_ref();
		let negotiated_alpn = session
			.alpn_protocol()
			.map(|p| String::from_utf8_lossy(p).to_string());
		let tls_version = session.protocol_version().map(|v| format!("{v:?}"));

		Ok(WrappedStream {
			stream,
			negotiated_alpn,
			tls_version,
		})
	}
}
