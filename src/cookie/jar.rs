//! Cookie storage with domain/path/SameSite selection and bounded eviction
//! (§4.7).

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;
use url::Url;

use crate::config::CookieConfig;
use crate::method::Method;

use super::{CookieRecord, SameSite};

type CookieKey = (String, String, String);

pub struct CookieJar {
	config: CookieConfig,
	records: RwLock<HashMap<CookieKey, CookieRecord>>,
}

impl CookieJar {
	pub fn new(config: CookieConfig) -> Self {
		Self {
			config,
			records: RwLock::new(HashMap::new()),
		}
	}

	/// Stores `record`, opportunistically sweeping expired entries for the
	/// same domain and enforcing the per-domain and total caps (§4.7
	/// "Storage").
	pub async fn store(&self, record: CookieRecord) {
		let now = chrono::Utc::now();
		let mut records = self.records.write().await;

		records.retain(|_, r| !r.is_expired(now));
		records.insert(record.key(), record.clone());

		let per_domain: Vec<CookieKey> = records
			.values()
			.filter(|r| r.domain == record.domain)
			.map(|r| r.key())
			.collect();
		if per_domain.len() > self.config.max_cookies_per_domain {
			evict_oldest(&mut records, &record.domain, per_domain.len() - self.config.max_cookies_per_domain);
		}

		if records.len() > self.config.max_total_cookies {
			let overflow = records.len() - self.config.max_total_cookies;
			evict_oldest_global(&mut records, overflow);
		}
	}

	/// Builds the `Cookie:` header value for `uri`/`method`, or `None` if no
	/// stored cookie applies (§4.7 "Cookie attachment").
	pub async fn header_for_request(&self, uri: &Url, method: Method, is_cross_site: bool) -> Option<String> {
		let now = chrono::Utc::now();
		let host = uri.host_str()?.to_ascii_lowercase();
		let path = uri.path();
		let is_https = uri.scheme() == "https";

		let mut records = self.records.write().await;
		records.retain(|_, r| !r.is_expired(now));

		let mut matched: Vec<CookieKey> = Vec::new();
		for (key, r) in records.iter() {
			if !domain_selects(r, &host) {
				continue;
			}
			if !path_selects(&r.path, path) {
				continue;
			}
			if r.secure && !is_https {
				continue;
			}
			if !same_site_allows(r.same_site, is_cross_site, method) {
				continue;
			}
			matched.push(key.clone());
		}

		if matched.is_empty() {
			return None;
		}

		matched.sort_by(|a, b| {
			let ra = &records[a];
			let rb = &records[b];
			rb.path
				.len()
				.cmp(&ra.path.len())
				.then(ra.created_at.cmp(&rb.created_at))
				.then(ra.name.cmp(&rb.name))
		});

		let touched_at = Instant::now();
		let mut parts = Vec::with_capacity(matched.len());
		for key in &matched {
			if let Some(r) = records.get_mut(key) {
				r.last_accessed_at = touched_at;
				parts.push(format!("{}={}", r.name, r.value));
			}
		}

		Some(parts.join("; "))
	}
}

fn domain_selects(record: &CookieRecord, host: &str) -> bool {
	if record.host_only {
		record.domain == host
	} else {
		host == record.domain || host.ends_with(&format!(".{}", record.domain))
	}
}

fn path_selects(cookie_path: &str, request_path: &str) -> bool {
	if request_path == cookie_path {
		return true;
	}
	if let Some(rest) = request_path.strip_prefix(cookie_path) {
		if cookie_path.ends_with('/') || rest.starts_with('/') {
			return true;
		}
	}
	false
}

fn same_site_allows(same_site: SameSite, is_cross_site: bool, method: Method) -> bool {
	if !is_cross_site {
		return true;
	}
	match same_site {
		SameSite::Strict => false,
		SameSite::Lax => matches!(method, Method::Get | Method::Head | Method::Options),
		SameSite::None | SameSite::Unspecified => true,
	}
}

fn evict_oldest(records: &mut HashMap<CookieKey, CookieRecord>, domain: &str, count: usize) {
	let mut candidates: Vec<CookieKey> = records
		.iter()
		.filter(|(_, r)| r.domain == domain)
		.map(|(k, _)| k.clone())
		.collect();
	sort_eviction_order(records, &mut candidates);
	for key in candidates.into_iter().take(count) {
		records.remove(&key);
	}
}

fn evict_oldest_global(records: &mut HashMap<CookieKey, CookieRecord>, count: usize) {
	let mut candidates: Vec<CookieKey> = records.keys().cloned().collect();
	sort_eviction_order(records, &mut candidates);
	for key in candidates.into_iter().take(count) {
		records.remove(&key);
	}
}

/// Oldest `last_accessed_at` first, tie-broken by oldest `created_at`, then
/// by key (§4.7 "Eviction policy").
fn sort_eviction_order(records: &HashMap<CookieKey, CookieRecord>, keys: &mut [CookieKey]) {
	keys.sort_by(|a, b| {
		let ra = &records[a];
		let rb = &records[b];
		ra.last_accessed_at
			.cmp(&rb.last_accessed_at)
			.then(ra.created_at.cmp(&rb.created_at))
			.then(a.cmp(b))
	});
}
