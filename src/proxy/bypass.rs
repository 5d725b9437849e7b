//! Bypass pattern matching (§4.9).

/// Returns whether `host[:port]` should bypass the configured proxy,
/// matching against exact hostnames, `.suffix`, `*.suffix`, and `host:port`
/// patterns, case-insensitively on the host portion.
pub fn matches_bypass(patterns: &[String], host: &str, port: u16) -> bool {
	let host = host.to_ascii_lowercase();
	patterns.iter().any(|raw| matches_one(raw, &host, port))
}

fn matches_one(pattern: &str, host: &str, port: u16) -> bool {
	let pattern = pattern.trim();
	let (host_pattern, pattern_port) = match pattern.rsplit_once(':') {
		Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
			(h, p.parse::<u16>().ok())
		},
		_ => (pattern, None),
	};
	if let Some(p) = pattern_port {
		if p != port {
			return false;
		}
	}
	let host_pattern = host_pattern.to_ascii_lowercase();

	if let Some(suffix) = host_pattern.strip_prefix("*.") {
		return host.ends_with(suffix) && host.len() > suffix.len() && host.as_bytes()[host.len() - suffix.len() - 1] == b'.';
	}
	if let Some(suffix) = host_pattern.strip_prefix('.') {
		return host.ends_with(suffix) && host.len() > suffix.len();
	}
	host == host_pattern
}
