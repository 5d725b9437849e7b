//! End-to-end HTTPS-through-proxy with Basic auth: the client must retry
//! the `CONNECT` once after a 407, then complete a TLS handshake with the
//! origin over the tunneled socket.

use std::sync::Arc;

use async_trait::async_trait;
use corewire::config::{ProxyConfig, ProxyCredentials};
use corewire::tls::{TlsConnector, WrappedStream};
use corewire::{Client, HeaderMap, Method, Request};
use rustls_pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use url::Url;

/// Trusts only the self-signed certificate minted for this test, instead of
/// the platform's native roots (`RustlsConnector`'s default).
struct TestTlsConnector {
	config: Arc<rustls::ClientConfig>,
}

#[async_trait]
impl TlsConnector for TestTlsConnector {
	async fn wrap(
		&self,
		raw: TcpStream,
		host: &str,
		_alpn_protocols: &[&str],
	) -> Result<WrappedStream, corewire::Error> {
		let connector = tokio_rustls::TlsConnector::from(self.config.clone());
		let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
			.map_err(|e| corewire::Error::with_cause(corewire::ErrorKind::Tls, "invalid server name", e))?;
		let stream = connector
			.connect(server_name, raw)
			.await
			.map_err(|e| corewire::Error::with_cause(corewire::ErrorKind::Tls, "TLS handshake failed", e))?;
		Ok(WrappedStream {
			stream,
			negotiated_alpn: None,
			tls_version: None,
		})
	}
}

#[tokio::test]
async fn https_through_proxy_retries_407_then_tunnels_tls() {
	let cert_key = rcgen::generate_simple_self_signed(vec!["origin.test".to_string()]).unwrap();
	let cert_der = cert_key.cert.der().clone();
	let key_der = PrivatePkcs8KeyDer::from(cert_key.key_pair.serialize_der());

	let mut client_roots = rustls::RootCertStore::empty();
	client_roots.add(cert_der.clone()).unwrap();
	let client_tls_config = rustls::ClientConfig::builder()
		.with_root_certificates(client_roots)
		.with_no_client_auth();

	let server_tls_config = rustls::ServerConfig::builder()
		.with_no_client_auth()
		.with_single_cert(vec![cert_der], key_der.into())
		.unwrap();
	let acceptor = TlsAcceptor::from(Arc::new(server_tls_config));

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let proxy_addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		// First CONNECT: no credentials yet, proxy demands auth.
		let (mut sock, _) = listener.accept().await.unwrap();
		let mut buf = vec![0u8; 4096];
		let n = sock.read(&mut buf).await.unwrap();
		let req = String::from_utf8_lossy(&buf[..n]);
		assert!(req.starts_with("CONNECT origin.test:"));
		assert!(!req.contains("Proxy-Authorization"));
		sock.write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await.unwrap();
		drop(sock);

		// Second CONNECT: credentials present, tunnel established, then a
		// real TLS handshake with the origin's certificate.
		let (mut sock, _) = listener.accept().await.unwrap();
		let mut buf = vec![0u8; 4096];
		let n = sock.read(&mut buf).await.unwrap();
		let req = String::from_utf8_lossy(&buf[..n]);
		assert!(req.contains("Proxy-Authorization: Basic"));
		sock.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await.unwrap();

		let mut tls = acceptor.accept(sock).await.unwrap();
		let mut buf = vec![0u8; 4096];
		let n = tls.read(&mut buf).await.unwrap();
		let req = String::from_utf8_lossy(&buf[..n]);
		assert!(req.starts_with("GET /secret HTTP/1.1\r\n"));
		tls
			.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nsecret")
			.await
			.unwrap();
	});

	let proxy_cfg = ProxyConfig {
		address: Some(format!("http://{proxy_addr}")),
		credentials: Some(ProxyCredentials {
			user: "alice".into(),
			password: "wonderland".into(),
		}),
		use_environment_variables: false,
		allow_plaintext_auth: true,
		..Default::default()
	};

	let client = Client::builder()
		.proxy(proxy_cfg)
		.tls_connector(Arc::new(TestTlsConnector {
			config: Arc::new(client_tls_config),
		}))
		.build()
		.unwrap();

	let uri = Url::parse(&format!("https://origin.test:{}/secret", proxy_addr.port())).unwrap();
	let response = client
		.send(Request::new(Method::Get, uri, HeaderMap::new()).unwrap())
		.await
		.unwrap();

	assert_eq!(response.status, 200);
	assert_eq!(response.body, b"secret");

	server.await.unwrap();
}
