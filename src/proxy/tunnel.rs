//! HTTP `CONNECT` tunnel with optional Basic authentication (§4.9).

use base64::Engine;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::codec::response::read_status_and_headers;
use crate::config::{ProxyConfig, ResponseLimits};
use crate::error::{Error, ErrorKind};

/// Opens a TCP connection to the proxy and establishes a tunnel to
/// `target_host:target_port` via `CONNECT`. On success, returns the raw
/// `TcpStream` positioned right after the proxy's response headers, ready
/// for a TLS handshake with the origin.
pub async fn connect_tunnel(
	proxy_host: &str,
	proxy_port: u16,
	target_host: &str,
	target_port: u16,
	proxy_cfg: &ProxyConfig,
	limits: &ResponseLimits,
	ct: &CancellationToken,
) -> Result<TcpStream, Error> {
	let first_attempt = connect_and_send(proxy_host, proxy_port, target_host, target_port, None, ct).await?;

	let status = first_attempt.0;
	if (200..300).contains(&status) {
		return Ok(first_attempt.1);
	}

	let Some(creds) = &proxy_cfg.credentials else {
		return Err(Error::new(
			ErrorKind::ProxyTunnelFailed,
			format!("proxy CONNECT failed with status {status}"),
		));
	};

	if status != 407 {
		return Err(Error::new(
			ErrorKind::ProxyTunnelFailed,
			format!("proxy CONNECT failed with status {status}"),
		));
	}

	if !proxy_cfg.allow_plaintext_auth {
		return Err(Error::invalid_request(
			"refusing to send Basic proxy auth over a plaintext connection; set allowPlaintextAuth to permit it",
		));
	}
	warn!("sending Basic proxy authentication over a plaintext CONNECT tunnel");

	// Retry exactly once on a fresh connection with credentials (§4.9).
	let auth_value = format!(
		"Basic {}",
		base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", creds.user, creds.password))
	);
	let second_attempt = connect_and_send(
		proxy_host,
		proxy_port,
		target_host,
		target_port,
		Some(&auth_value),
		ct,
	)
	.await?;

	match second_attempt.0 {
		s if (200..300).contains(&s) => Ok(second_attempt.1),
		407 => Err(Error::new(ErrorKind::ProxyAuthRequired, "proxy rejected credentials")),
		s => Err(Error::new(
			ErrorKind::ProxyTunnelFailed,
			format!("proxy CONNECT failed with status {s}"),
		)),
	}
}

async fn connect_and_send(
	proxy_host: &str,
	proxy_port: u16,
	target_host: &str,
	target_port: u16,
	proxy_authorization: Option<&str>,
	ct: &CancellationToken,
) -> Result<(u16, TcpStream), Error> {
	let connect_fut = TcpStream::connect((proxy_host, proxy_port));
	let mut stream = tokio::select! {
		biased;
		_ = ct.cancelled() => return Err(Error::new(ErrorKind::Cancelled, "cancelled connecting to proxy")),
		res = connect_fut => res.map_err(|e| Error::with_cause(ErrorKind::ProxyConnectFailed, "failed to connect to proxy", e))?,
	};

	let authority = format!("{target_host}:{target_port}");
	let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
	if let Some(auth) = proxy_authorization {
		request.push_str("Proxy-Authorization: ");
		request.push_str(auth);
		request.push_str("\r\n");
	}
	request.push_str("\r\n");

	stream
		.write_all(request.as_bytes())
		.await
		.map_err(|e| Error::with_cause(ErrorKind::ProxyConnectFailed, "failed to write CONNECT request", e))?;

	let mut reader = BufReader::new(stream);
	let limits = ResponseLimits::default();
	let (status, _text, _headers) = read_status_and_headers(&mut reader, &limits).await?;
	Ok((status, reader.into_inner()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, BufReader as TokioBufReader};
	use tokio::net::TcpListener;

	#[tokio::test]
	async fn successful_connect_returns_200_and_stream() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let server = tokio::spawn(async move {
			let (mut sock, _) = listener.accept().await.unwrap();
			let mut buf = vec![0u8; 1024];
			let mut reader = TokioBufReader::new(&mut sock);
			let n = reader.read(&mut buf).await.unwrap();
			let req = String::from_utf8_lossy(&buf[..n]);
			assert!(req.starts_with("CONNECT origin.test:443 HTTP/1.1\r\n"));
			assert!(req.contains("Host: origin.test:443\r\n"));
			assert!(!req.contains("Proxy-Authorization"));
			sock.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await.unwrap();
		});

		let cfg = ProxyConfig::default();
		let limits = ResponseLimits::default();
		let ct = CancellationToken::new();
		let stream = connect_tunnel(
			&addr.ip().to_string(),
			addr.port(),
			"origin.test",
			443,
			&cfg,
			&limits,
			&ct,
		)
		.await
		.unwrap();
		drop(stream);
		server.await.unwrap();
	}

	#[tokio::test]
	async fn retries_once_on_407_then_succeeds() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let server = tokio::spawn(async move {
			for expect_auth in [false, true] {
				let (mut sock, _) = listener.accept().await.unwrap();
				let mut buf = vec![0u8; 1024];
				let mut reader = TokioBufReader::new(&mut sock);
				let n = reader.read(&mut buf).await.unwrap();
				let req = String::from_utf8_lossy(&buf[..n]);
				if expect_auth {
					assert!(req.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
					sock.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await.unwrap();
				} else {
					assert!(!req.contains("Proxy-Authorization"));
					sock.write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await.unwrap();
				}
			}
		});

		let mut cfg = ProxyConfig::default();
		cfg.credentials = Some(crate::config::ProxyCredentials {
			user: "user".into(),
			password: "pass".into(),
		});
		cfg.allow_plaintext_auth = true;
		let limits = ResponseLimits::default();
		let ct = CancellationToken::new();
		let stream = connect_tunnel(
			&addr.ip().to_string(),
			addr.port(),
			"origin.test",
			443,
			&cfg,
			&limits,
			&ct,
		)
		.await
		.unwrap();
		drop(stream);
		server.await.unwrap();
	}
}
