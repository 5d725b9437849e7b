//! Error taxonomy (§7): exhaustive error kinds plus a retryability classifier.

use std::fmt;

/// The exhaustive set of ways a request can fail, per §3/§7 of the design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	Network,
	Timeout,
	Cancelled,
	Tls,
	InvalidRequest,
	ResponseTooLarge,
	ProxyAuthRequired,
	ProxyConnectFailed,
	ProxyTunnelFailed,
	DecodeError,
}

impl ErrorKind {
	/// Whether an error of this kind is, on its own (independent of method
	/// idempotency), eligible for retry by the retry interceptor.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ErrorKind::Network | ErrorKind::Timeout | ErrorKind::ProxyConnectFailed
		)
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ErrorKind::Network => "network",
			ErrorKind::Timeout => "timeout",
			ErrorKind::Cancelled => "cancelled",
			ErrorKind::Tls => "tls",
			ErrorKind::InvalidRequest => "invalidRequest",
			ErrorKind::ResponseTooLarge => "responseTooLarge",
			ErrorKind::ProxyAuthRequired => "proxyAuthRequired",
			ErrorKind::ProxyConnectFailed => "proxyConnectFailed",
			ErrorKind::ProxyTunnelFailed => "proxyTunnelFailed",
			ErrorKind::DecodeError => "decodeError",
		};
		f.write_str(s)
	}
}

/// The error record carried by a failed request (§3 "Error record").
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
	pub kind: ErrorKind,
	pub message: String,
	#[source]
	pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
			cause: None,
		}
	}

	pub fn with_cause(
		kind: ErrorKind,
		message: impl Into<String>,
		cause: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		Self {
			kind,
			message: message.into(),
			cause: Some(Box::new(cause)),
		}
	}

	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::InvalidRequest, message)
	}

	pub fn is_retryable(&self) -> bool {
		self.kind.is_retryable()
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::with_cause(ErrorKind::Network, e.to_string(), e)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
