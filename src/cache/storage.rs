//! Pluggable cache storage contract (§6 "Storage collaborators") and an
//! in-memory default.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::header::HeaderMap;
use crate::method::Method;

/// `(method, canonical URI, vary-key)`, pre-joined into one opaque string so
/// storage collaborators need not know the cache's composition rules (§4.8).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
	pub fn new(method: Method, canonical_uri: &str, vary_key: &str) -> Self {
		Self(format!("{method}|{canonical_uri}|{vary_key}"))
	}
}

#[derive(Clone, Copy, Debug)]
pub enum Freshness {
	/// Fresh until the given deadline; serve straight from cache until then.
	Fresh { expires_at: Instant },
	/// Always revalidate before serving (`Cache-Control: no-cache`).
	MustRevalidate,
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
	pub status: u16,
	pub status_text: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
	pub stored_at: Instant,
	pub freshness: Freshness,
}

impl CacheEntry {
	pub fn is_fresh(&self) -> bool {
		match self.freshness {
			Freshness::Fresh { expires_at } => Instant::now() < expires_at,
			Freshness::MustRevalidate => false,
		}
	}
}

/// Storage collaborator contract (§6): `get`/`put`/`invalidate`. Semantics
/// are pluggable — in-memory here, disk-backed or distributed elsewhere.
#[async_trait]
pub trait CacheStorage: Send + Sync {
	async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;
	async fn put(&self, key: CacheKey, entry: CacheEntry);
	async fn invalidate(&self, key: &CacheKey);
}

pub struct InMemoryCacheStorage {
	entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryCacheStorage {
	pub fn new() -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
		}
	}
}

impl Default for InMemoryCacheStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CacheStorage for InMemoryCacheStorage {
	async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
		self.entries.read().await.get(key).cloned()
	}

	async fn put(&self, key: CacheKey, entry: CacheEntry) {
		self.entries.write().await.insert(key, entry);
	}

	async fn invalidate(&self, key: &CacheKey) {
		self.entries.write().await.remove(key);
	}
}

/// Parses `Cache-Control` directives relevant to freshness computation.
#[derive(Debug, Default)]
pub struct CacheControl {
	pub no_store: bool,
	pub no_cache: bool,
	pub max_age: Option<Duration>,
	pub s_maxage: Option<Duration>,
}

pub fn parse_cache_control(headers: &HeaderMap) -> CacheControl {
	let mut cc = CacheControl::default();
	for raw in headers.get_all("Cache-Control") {
		for directive in raw.split(',') {
			let directive = directive.trim();
			let (name, value) = match directive.split_once('=') {
				Some((n, v)) => (n.trim(), Some(v.trim().trim_matches('"'))),
				None => (directive, None),
			};
			match name.to_ascii_lowercase().as_str() {
				"no-store" => cc.no_store = true,
				"no-cache" => cc.no_cache = true,
				"max-age" => cc.max_age = value.and_then(|v| v.parse::<u64>().ok()).map(Duration::from_secs),
				"s-maxage" => cc.s_maxage = value.and_then(|v| v.parse::<u64>().ok()).map(Duration::from_secs),
				_ => {},
			}
		}
	}
	cc
}
