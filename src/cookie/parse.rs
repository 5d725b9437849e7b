//! `Set-Cookie` parsing (§4.7).

use std::time::Instant;

use chrono::{DateTime, Utc};

use super::{CookieRecord, SameSite};

/// Known multi-label public suffixes the heuristic recognizes outright.
/// Approximation only — a real public-suffix-list provider is out of scope
/// (see DESIGN.md).
const KNOWN_SUFFIXES: &[&str] = &[
	"co.uk", "org.uk", "gov.uk", "ac.uk", "com.au", "net.au", "org.au", "ac.jp", "co.jp", "ne.jp",
	"com.br", "co.in", "co.nz", "co.za",
];

/// Two-label domains whose left label is one of these generic tokens are
/// treated as public suffixes when the right label is exactly 2 characters
/// (a ccTLD), per §4.7.
const GENERIC_LEFT_LABELS: &[&str] = &["co", "com", "edu", "gov", "net", "org", "ne", "or", "go", "mil", "ac"];

fn is_public_suffix(domain: &str) -> bool {
	let d = domain.trim_start_matches('.');
	if KNOWN_SUFFIXES.iter().any(|s| d.eq_ignore_ascii_case(s)) {
		return true;
	}
	let labels: Vec<&str> = d.split('.').collect();
	if labels.len() == 2 {
		let left = labels[0].to_ascii_lowercase();
		let right = labels[1];
		if GENERIC_LEFT_LABELS.contains(&left.as_str()) && right.len() == 2 {
			return true;
		}
	}
	false
}

fn domain_matches(cookie_domain: &str, request_host: &str) -> bool {
	let host = request_host.to_ascii_lowercase();
	host == cookie_domain || host.ends_with(&format!(".{cookie_domain}"))
}

/// Default path per §4.7: the directory portion of the request path, up to
/// and including the last `/`, trailing slash dropped, defaulting to `/`.
fn default_path(request_path: &str) -> String {
	match request_path.rfind('/') {
		Some(0) => "/".to_string(),
		Some(i) => request_path[..i].to_string(),
		None => "/".to_string(),
	}
}

fn strip_quotes(value: &str) -> &str {
	let v = value.trim();
	if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
		&v[1..v.len() - 1]
	} else {
		v
	}
}

/// Parses one `Set-Cookie` header value in the context of the request that
/// produced it. Returns `None` if the cookie must be dropped (malformed,
/// targets a public suffix, `Secure` over a non-https request, etc).
pub fn parse_set_cookie(
	header_value: &str,
	request_host: &str,
	request_path: &str,
	request_is_https: bool,
	now: DateTime<Utc>,
) -> Option<CookieRecord> {
	let mut segments = header_value.split(';');
	let first = segments.next()?.trim();
	let (name, value) = first.split_once('=')?;
	let name = name.trim();
	if name.is_empty() {
		return None;
	}
	let value = strip_quotes(value);

	let mut domain = request_host.to_ascii_lowercase();
	let mut host_only = true;
	let mut path: Option<String> = None;
	let mut expires: Option<DateTime<Utc>> = None;
	let mut max_age: Option<i64> = None;
	let mut secure = false;
	let mut http_only = false;
	let mut same_site = SameSite::Unspecified;

	for segment in segments {
		let segment = segment.trim();
		if segment.is_empty() {
			continue;
		}
		let (attr, attr_value) = match segment.split_once('=') {
			Some((a, v)) => (a.trim(), Some(v.trim())),
			None => (segment, None),
		};

		match attr.to_ascii_lowercase().as_str() {
			"domain" => {
				let Some(v) = attr_value else { continue };
				let candidate = v.trim().trim_start_matches('.').to_ascii_lowercase();
				if candidate.is_empty() {
					continue;
				}
				if is_public_suffix(&candidate) {
					return None;
				}
				if !domain_matches(&candidate, request_host) {
					return None;
				}
				domain = candidate;
				host_only = false;
			},
			"path" => {
				if let Some(v) = attr_value {
					if v.starts_with('/') {
						path = Some(v.to_string());
					}
				}
			},
			"expires" => {
				if let Some(v) = attr_value {
					if let Ok(parsed) = DateTime::parse_from_rfc2822(v) {
						expires = Some(parsed.with_timezone(&Utc));
					}
				}
			},
			"max-age" => {
				if let Some(v) = attr_value {
					if let Ok(n) = v.parse::<i64>() {
						max_age = Some(n);
					}
				}
			},
			"secure" => secure = true,
			"httponly" => http_only = true,
			"samesite" => {
				same_site = match attr_value.map(|v| v.to_ascii_lowercase()) {
					Some(ref v) if v == "strict" => SameSite::Strict,
					Some(ref v) if v == "lax" => SameSite::Lax,
					Some(ref v) if v == "none" => SameSite::None,
					_ => SameSite::Unspecified,
				};
			},
			_ => {},
		}
	}

	if secure && !request_is_https {
		return None;
	}

	// Max-Age wins over Expires when both are present (§4.7).
	if let Some(n) = max_age {
		expires = Some(if n <= 0 {
			DateTime::<Utc>::from_timestamp(0, 0).unwrap_or(now)
		} else {
			now + chrono::Duration::seconds(n.min(10_000_000_000))
		});
	}

	let now_instant = Instant::now();
	Some(CookieRecord {
		name: name.to_string(),
		value: value.to_string(),
		domain,
		host_only,
		path: path.unwrap_or_else(|| default_path(request_path)),
		expires,
		secure,
		http_only,
		same_site,
		created_at: now_instant,
		last_accessed_at: now_instant,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn now() -> DateTime<Utc> {
		DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
	}

	#[test]
	fn parses_name_value_and_path() {
		let rec = parse_set_cookie("sid=abc; Path=/; HttpOnly", "example.test", "/a/b", true, now()).unwrap();
		assert_eq!(rec.name, "sid");
		assert_eq!(rec.value, "abc");
		assert_eq!(rec.path, "/");
		assert!(rec.http_only);
	}

	#[test]
	fn default_path_is_request_directory() {
		let rec = parse_set_cookie("sid=abc", "example.test", "/a/b/c", true, now()).unwrap();
		assert_eq!(rec.path, "/a/b");
	}

	#[test]
	fn secure_over_plaintext_is_rejected() {
		assert!(parse_set_cookie("sid=abc; Secure", "example.test", "/", false, now()).is_none());
	}

	#[test]
	fn domain_targeting_public_suffix_is_rejected() {
		assert!(parse_set_cookie("sid=abc; Domain=co.uk", "example.co.uk", "/", true, now()).is_none());
	}

	#[test]
	fn domain_not_matching_request_host_is_rejected() {
		assert!(parse_set_cookie("sid=abc; Domain=evil.test", "example.test", "/", true, now()).is_none());
	}

	#[test]
	fn max_age_wins_over_expires() {
		let rec = parse_set_cookie(
			"sid=abc; Expires=Sun, 06 Nov 2094 08:49:37 GMT; Max-Age=60",
			"example.test",
			"/",
			true,
			now(),
		)
		.unwrap();
		let expires = rec.expires.unwrap();
		assert_eq!(expires, now() + chrono::Duration::seconds(60));
	}

	#[test]
	fn non_positive_max_age_expires_immediately() {
		let rec = parse_set_cookie("sid=abc; Max-Age=0", "example.test", "/", true, now()).unwrap();
		assert!(rec.is_expired(now()));
	}
}
