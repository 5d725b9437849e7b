//! Environment-variable proxy discovery (§4.9).

use std::env;

/// Reads `HTTPS_PROXY`/`https_proxy` for https requests, `HTTP_PROXY`/
/// `http_proxy` for http requests. Does not fall back from one scheme to
/// the other.
pub fn discover(scheme: &str) -> Option<String> {
	let (upper, lower) = match scheme {
		"https" => ("HTTPS_PROXY", "https_proxy"),
		_ => ("HTTP_PROXY", "http_proxy"),
	};
	env::var(upper).ok().or_else(|| env::var(lower).ok())
}

/// Reads `NO_PROXY`/`no_proxy` as a comma-separated bypass list.
pub fn no_proxy() -> Vec<String> {
	env::var("NO_PROXY")
		.or_else(|_| env::var("no_proxy"))
		.map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
		.unwrap_or_default()
}
