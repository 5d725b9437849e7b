//! Request serialization (§4.1 "Request serialization").

use url::Url;

use crate::error::Error;
use crate::request::Request;

/// Whether the request line uses origin-form (`/path?query`) or
/// absolute-form (`scheme://host[:port]/path?query`), per RFC 9112 §3.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetForm {
	Origin,
	Absolute,
}

/// Serializes `req` into on-the-wire bytes: request line, headers, and body.
/// `form` selects origin- vs absolute-form request targets (absolute-form is
/// required when sending to a forward HTTP proxy, RFC 9112 §3.2.2).
pub fn serialize_request(req: &Request, form: TargetForm) -> Result<Vec<u8>, Error> {
	req.headers.validate_for_wire()?;

	let mut out = Vec::with_capacity(256 + req.body.as_ref().map_or(0, |b| b.len()));

	let target = request_target(&req.uri, form);
	out.extend_from_slice(req.method.as_str().as_bytes());
	out.push(b' ');
	out.extend_from_slice(target.as_bytes());
	out.extend_from_slice(b" HTTP/1.1\r\n");

	// Host is always written first, derived from the URI authority (§4.1).
	out.extend_from_slice(b"Host: ");
	out.extend_from_slice(host_header_value(&req.uri).as_bytes());
	out.extend_from_slice(b"\r\n");

	let has_transfer_encoding = req.headers.contains("Transfer-Encoding");
	let has_content_length = req.headers.contains("Content-Length");

	for (name, value) in req.headers.iter() {
		if name.eq_ignore_ascii_case("Host") {
			// Already written above; caller-supplied Host would be redundant
			// and is intentionally superseded by the URI-derived value.
			continue;
		}
		out.extend_from_slice(name.as_bytes());
		out.extend_from_slice(b": ");
		out.extend_from_slice(value.as_bytes());
		out.extend_from_slice(b"\r\n");
	}

	if let Some(body) = &req.body {
		if !has_content_length && !has_transfer_encoding {
			out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
		}
	}

	out.extend_from_slice(b"\r\n");

	if let Some(body) = &req.body {
		out.extend_from_slice(body);
	}

	Ok(out)
}

fn request_target(uri: &Url, form: TargetForm) -> String {
	match form {
		TargetForm::Origin => origin_form(uri),
		TargetForm::Absolute => absolute_form(uri),
	}
}

fn origin_form(uri: &Url) -> String {
	let path = if uri.path().is_empty() { "/" } else { uri.path() };
	match uri.query() {
		Some(q) => format!("{path}?{q}"),
		None => path.to_string(),
	}
}

fn absolute_form(uri: &Url) -> String {
	// `Url`'s own serialization already renders scheme://host[:port]/path?query,
	// which is exactly RFC 9112 absolute-form.
	uri.as_str().to_string()
}

/// `Host` header value: authority without a default port (§4.1).
fn host_header_value(uri: &Url) -> String {
	let host = uri.host_str().unwrap_or_default();
	let default_port = match uri.scheme() {
		"https" => 443,
		_ => 80,
	};
	match uri.port() {
		Some(p) if p != default_port => format!("{host}:{p}"),
		_ => host.to_string(),
	}
}
