//! Response parsing (§4.1 "Response parsing" and "Body framing").

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::config::ResponseLimits;
use crate::error::{Error, ErrorKind};
use crate::header::HeaderMap;
use crate::method::Method;

const MAX_INFORMATIONAL_RESPONSES: usize = 10;
const MIN_READ_BUFFER: usize = 4096;

#[derive(Debug)]
pub struct ParsedResponse {
	pub status: u16,
	pub status_text: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
	pub keep_alive: bool,
}

/// Parses a full HTTP/1.1 response (status line, headers, framed body,
/// trailers) from a buffered reader. `request_method` and whether this is a
/// response to a HEAD request determine if the body is known-empty.
pub async fn parse_response<R>(
	reader: &mut R,
	request_method: Method,
	limits: &ResponseLimits,
) -> Result<ParsedResponse, Error>
where
	R: AsyncBufRead + Unpin,
{
	let (status, status_text, http_minor) = read_status_line_skipping_informational(reader, limits).await?;
	let headers = read_headers(reader, limits).await?;

	let is_head = request_method == Method::Head;
	let body_known_empty =
		is_head || matches!(status, 100..=199 | 204 | 304);

	let body = if body_known_empty {
		Vec::new()
	} else {
		read_body(reader, &headers, limits).await?
	};

	let keep_alive = compute_keep_alive(http_minor, &headers, body_known_empty);

	Ok(ParsedResponse {
		status,
		status_text,
		headers,
		body,
		keep_alive,
	})
}

/// Reads just the status line and header block, without consuming or
/// framing any body. Used by the proxy tunnel (§4.9), whose CONNECT
/// responses are immediately followed by opaque tunneled bytes on success.
pub(crate) async fn read_status_and_headers<R>(
	reader: &mut R,
	limits: &ResponseLimits,
) -> Result<(u16, String, HeaderMap), Error>
where
	R: AsyncBufRead + Unpin,
{
	let (status, text, _minor) = read_status_line_skipping_informational(reader, limits).await?;
	let headers = read_headers(reader, limits).await?;
	Ok((status, text, headers))
}

async fn read_status_line_skipping_informational<R>(
	reader: &mut R,
	limits: &ResponseLimits,
) -> Result<(u16, String, u8), Error>
where
	R: AsyncBufRead + Unpin,
{
	for _ in 0..MAX_INFORMATIONAL_RESPONSES {
		let line = read_line(reader, limits.max_line_bytes).await?;
		let (status, text, minor) = parse_status_line(&line)?;
		if (100..200).contains(&status) {
			// Consume (and discard) this informational response's headers,
			// then loop to read the next status line.
			let _ = read_headers(reader, limits).await?;
			continue;
		}
		return Ok((status, text, minor));
	}
	Err(Error::new(
		ErrorKind::DecodeError,
		"too many 1xx informational responses",
	))
}

fn parse_status_line(line: &str) -> Result<(u16, String, u8), Error> {
	// "HTTP/1." DIGIT SP 3DIGIT [SP reason-phrase]
	let rest = line
		.strip_prefix("HTTP/1.")
		.ok_or_else(|| Error::new(ErrorKind::DecodeError, "malformed status line"))?;
	let mut chars = rest.char_indices();
	let (idx, c) = chars
		.next()
		.ok_or_else(|| Error::new(ErrorKind::DecodeError, "malformed status line"))?;
	let minor = c
		.to_digit(10)
		.ok_or_else(|| Error::new(ErrorKind::DecodeError, "malformed HTTP version"))? as u8;
	let after_version = &rest[idx + 1..];
	let after_version = after_version
		.strip_prefix(' ')
		.ok_or_else(|| Error::new(ErrorKind::DecodeError, "malformed status line"))?;
	if after_version.len() < 3 {
		return Err(Error::new(ErrorKind::DecodeError, "malformed status code"));
	}
	let (code_str, remainder) = after_version.split_at(3);
	let status: u16 = code_str
		.parse()
		.map_err(|_| Error::new(ErrorKind::DecodeError, "malformed status code"))?;
	let text = remainder.trim_start_matches(' ').to_string();
	Ok((status, text, minor))
}

async fn read_headers<R>(reader: &mut R, limits: &ResponseLimits) -> Result<HeaderMap, Error>
where
	R: AsyncBufRead + Unpin,
{
	let mut headers = HeaderMap::new();
	let mut accumulated: u64 = 0;
	loop {
		let line = read_line(reader, limits.max_line_bytes).await?;
		accumulated += line.len() as u64 + 2;
		if accumulated > limits.max_header_block_bytes {
			return Err(Error::new(ErrorKind::ResponseTooLarge, "header block too large"));
		}
		if line.is_empty() {
			break;
		}
		let (name, value) = split_header_line(&line)?;
		headers.add(name, value);
	}
	validate_content_length_headers(&headers)?;
	Ok(headers)
}

fn split_header_line(line: &str) -> Result<(&str, &str), Error> {
	let idx = line
		.find(':')
		.ok_or_else(|| Error::new(ErrorKind::DecodeError, "malformed header line"))?;
	let name = &line[..idx];
	let value = line[idx + 1..].trim();
	Ok((name, value))
}

fn validate_content_length_headers(headers: &HeaderMap) -> Result<(), Error> {
	let values = headers.get_all("Content-Length");
	if values.len() > 1 {
		let first = values[0];
		if !values.iter().all(|v| *v == first) {
			return Err(Error::new(
				ErrorKind::DecodeError,
				"conflicting Content-Length headers",
			));
		}
	}
	Ok(())
}

/// Reads a single CRLF-terminated line (without the CRLF), enforcing
/// `max_line_bytes` (§4.1). Uses the buffered reader's own `read_until` so a
/// run of header/chunk-line reads is served out of one filled buffer instead
/// of a syscall per line (let alone per byte).
async fn read_line<R>(reader: &mut R, max_line_bytes: u64) -> Result<String, Error>
where
	R: AsyncBufRead + Unpin,
{
	let mut buf = Vec::new();
	let n = reader.read_until(b'\n', &mut buf).await?;
	if n == 0 {
		return Err(Error::new(ErrorKind::Network, "connection closed mid-line"));
	}
	if buf.last() == Some(&b'\n') {
		buf.pop();
		if buf.last() == Some(&b'\r') {
			buf.pop();
		}
	}
	if buf.len() as u64 > max_line_bytes {
		return Err(Error::new(ErrorKind::ResponseTooLarge, "line too long"));
	}
	String::from_utf8(buf).map_err(|_| Error::new(ErrorKind::DecodeError, "non-UTF-8 line"))
}

fn is_chunked(headers: &HeaderMap) -> Result<bool, Error> {
	// Transfer-Encoding takes precedence over Content-Length (RFC 9112 §6.1).
	let Some(te) = headers.get("Transfer-Encoding") else {
		return Ok(false);
	};
	let last_coding = te.split(',').next_back().unwrap_or("").trim().to_ascii_lowercase();
	if last_coding == "identity" || last_coding.is_empty() {
		return Ok(false);
	}
	if last_coding != "chunked" {
		return Err(Error::new(
			ErrorKind::DecodeError,
			format!("unsupported final transfer-coding: {last_coding}"),
		));
	}
	Ok(true)
}

async fn read_body<R>(reader: &mut R, headers: &HeaderMap, limits: &ResponseLimits) -> Result<Vec<u8>, Error>
where
	R: AsyncBufRead + Unpin,
{
	if is_chunked(headers)? {
		return read_chunked_body(reader, limits).await;
	}
	if let Some(len) = headers.get("Content-Length") {
		let len: u64 = len
			.parse()
			.map_err(|_| Error::new(ErrorKind::DecodeError, "invalid Content-Length"))?;
		if len > limits.max_body_bytes {
			return Err(Error::new(ErrorKind::ResponseTooLarge, "Content-Length exceeds limit"));
		}
		let mut body = vec![0u8; len as usize];
		reader.read_exact(&mut body).await?;
		return Ok(body);
	}
	// Close-delimited: read until EOF. Caller forces keep_alive=false for this case.
	let mut body = Vec::new();
	let mut chunk = [0u8; 8192];
	loop {
		let n = reader.read(&mut chunk).await?;
		if n == 0 {
			break;
		}
		if body.len() as u64 + n as u64 > limits.max_body_bytes {
			return Err(Error::new(ErrorKind::ResponseTooLarge, "close-delimited body exceeds limit"));
		}
		body.extend_from_slice(&chunk[..n]);
	}
	Ok(body)
}

async fn read_chunked_body<R>(reader: &mut R, limits: &ResponseLimits) -> Result<Vec<u8>, Error>
where
	R: AsyncBufRead + Unpin,
{
	let mut body = Vec::new();
	loop {
		let size_line = read_line(reader, limits.max_line_bytes).await?;
		let size_str = size_line.split(';').next().unwrap_or("").trim();
		let size = u64::from_str_radix(size_str, 16)
			.map_err(|_| Error::new(ErrorKind::DecodeError, "invalid chunk size"))?;
		if size == 0 {
			// Trailers until an empty line, then done.
			loop {
				let trailer_line = read_line(reader, limits.max_line_bytes).await?;
				if trailer_line.is_empty() {
					break;
				}
			}
			break;
		}
		if body.len() as u64 + size > limits.max_body_bytes {
			return Err(Error::new(ErrorKind::ResponseTooLarge, "chunked body exceeds limit"));
		}
		let mut chunk = vec![0u8; size as usize];
		reader.read_exact(&mut chunk).await?;
		body.extend_from_slice(&chunk);
		// Each chunk's data is followed by a trailing CRLF.
		let trailing = read_line(reader, limits.max_line_bytes).await?;
		if !trailing.is_empty() {
			return Err(Error::new(ErrorKind::DecodeError, "malformed chunk terminator"));
		}
	}
	Ok(body)
}

fn compute_keep_alive(http_minor: u8, headers: &HeaderMap, body_known_empty: bool) -> bool {
	let connection = headers
		.get("Connection")
		.map(|v| v.to_ascii_lowercase())
		.unwrap_or_default();
	let explicit_close = connection.split(',').any(|t| t.trim() == "close");
	let explicit_keep_alive = connection.split(',').any(|t| t.trim() == "keep-alive");

	if explicit_close {
		return false;
	}

	// Close-delimited framing (no length, not chunked, body not known-empty)
	// forces close regardless of what Connection says.
	let chunked = is_chunked(headers).unwrap_or(false);
	let has_length = headers.contains("Content-Length");
	if !body_known_empty && !chunked && !has_length {
		return false;
	}

	match http_minor {
		1 => true,
		_ => explicit_keep_alive,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;
	use tokio::io::BufReader;

	fn limits() -> ResponseLimits {
		ResponseLimits::default()
	}

	async fn parse(bytes: &[u8], method: Method) -> Result<ParsedResponse, Error> {
		let mut reader = BufReader::new(Cursor::new(bytes.to_vec()));
		parse_response(&mut reader, method, &limits()).await
	}

	#[tokio::test]
	async fn parses_simple_length_delimited_response() {
		let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
		let resp = parse(raw, Method::Get).await.unwrap();
		assert_eq!(resp.status, 200);
		assert_eq!(resp.status_text, "OK");
		assert_eq!(resp.body, b"hello");
		assert!(resp.keep_alive);
	}

	#[tokio::test]
	async fn parses_chunked_body_in_order() {
		let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
		let resp = parse(raw, Method::Get).await.unwrap();
		assert_eq!(resp.body, b"hello world");
	}

	#[tokio::test]
	async fn skips_100_continue() {
		let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
		let resp = parse(raw, Method::Get).await.unwrap();
		assert_eq!(resp.status, 200);
		assert_eq!(resp.body, b"ok");
	}

	#[tokio::test]
	async fn head_response_body_is_empty_even_with_content_length() {
		let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
		let resp = parse(raw, Method::Head).await.unwrap();
		assert!(resp.body.is_empty());
	}

	#[tokio::test]
	async fn conflicting_content_length_is_decode_error() {
		let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\nhello";
		let err = parse(raw, Method::Get).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::DecodeError);
	}

	#[tokio::test]
	async fn identical_duplicate_content_length_is_allowed() {
		let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\nhello";
		let resp = parse(raw, Method::Get).await.unwrap();
		assert_eq!(resp.body, b"hello");
	}

	#[tokio::test]
	async fn connection_close_overrides_keepalive_default() {
		let raw = b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok";
		let resp = parse(raw, Method::Get).await.unwrap();
		assert!(!resp.keep_alive);
	}

	#[tokio::test]
	async fn body_exceeding_max_fails_with_response_too_large() {
		let mut limits = ResponseLimits::default();
		limits.max_body_bytes = 3;
		let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
		let mut reader = BufReader::new(Cursor::new(raw.to_vec()));
		let err = parse_response(&mut reader, Method::Get, &limits).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::ResponseTooLarge);
	}

	#[tokio::test]
	async fn rejects_transfer_encoding_not_ending_in_chunked() {
		let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n";
		let err = parse(raw, Method::Get).await.unwrap_err();
		assert_eq!(err.kind, ErrorKind::DecodeError);
	}
}
