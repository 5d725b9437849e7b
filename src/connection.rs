//! Pooled connection value type and its lifecycle state machine (§3, §4.11).

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Unifies a plaintext and a TLS-wrapped stream behind one `AsyncRead +
/// AsyncWrite` type, mirroring the teacher's `crate::stream::Socket` enum
/// (`agent-proxy/src/hbone.rs` wraps both a raw `TcpStream` and an upgraded
/// tunnel stream behind one `Socket`).
pub enum Socket {
	Plain(TcpStream),
	Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Socket {
	fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_read(cx, buf),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
		}
	}
}

impl AsyncWrite for Socket {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_write(cx, buf),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_flush(cx),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
		}
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_shutdown(cx),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
		}
	}
}

impl Socket {
	/// Probes the raw fd for zero-timeout readability without consuming any
	/// bytes, used by the pool's stale-connection detection (§4.2). Returns
	/// `true` if the peer has data pending or has closed the connection
	/// (both observable as "readable"), `false` if nothing is pending.
	pub fn peek_readable(&self) -> std::io::Result<bool> {
		let tcp = match self {
			Socket::Plain(s) => s,
			Socket::Tls(s) => s.get_ref().0,
		};
		let mut buf = [0u8; 1];
		match tcp.try_read(&mut buf) {
			Ok(_) => Ok(true),
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
			Err(e) => Err(e),
		}
	}
}

/// Minimum buffered-read capacity required by §4.1.
pub const MIN_READ_BUFFER: usize = 4096;

pub type BufferedSocket = BufReader<Socket>;

pub fn buffered(socket: Socket) -> BufferedSocket {
	BufReader::with_capacity(MIN_READ_BUFFER, socket)
}

/// Connection lifecycle (§4.11): `Opening -> Handshaking -> Idle <-> InUse
/// -> {Returning, Closing} -> Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
	Opening,
	Handshaking,
	Idle,
	InUse,
	Returning,
	Closing,
	Closed,
}

pub struct PooledConnection {
	pub remote_host: String,
	pub remote_port: u16,
	pub stream: BufferedSocket,
	pub supports_keep_alive: bool,
	pub created_at: Instant,
	pub last_used_at: Instant,
	pub negotiated_alpn: Option<String>,
	pub tls_version: Option<String>,
	/// Set once any byte of a request has been written to this connection on
	/// the current attempt; used to gate the "zero bytes written" retry rule.
	pub bytes_written_this_attempt: u64,
}

impl PooledConnection {
	pub fn new(remote_host: String, remote_port: u16, stream: BufferedSocket) -> Self {
		let now = Instant::now();
		Self {
			remote_host,
			remote_port,
			stream,
			supports_keep_alive: true,
			created_at: now,
			last_used_at: now,
			negotiated_alpn: None,
			tls_version: None,
			bytes_written_this_attempt: 0,
		}
	}

	pub fn touch(&mut self) {
		self.last_used_at = Instant::now();
		self.bytes_written_this_attempt = 0;
	}

	pub fn idle_for(&self) -> std::time::Duration {
		self.last_used_at.elapsed()
	}
}
