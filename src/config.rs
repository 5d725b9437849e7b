//! Configuration surface (§6), serde-backed like the teacher's `src/config.rs`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
	pub max_connections_per_host: usize,
	pub max_total_connections: usize,
	#[serde(with = "humantime_secs")]
	pub idle_connection_timeout: Duration,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_connections_per_host: 6,
			max_total_connections: 64,
			idle_connection_timeout: Duration::from_secs(90),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
	pub max_retries: u32,
	#[serde(with = "humantime_millis")]
	pub initial_delay: Duration,
	#[serde(with = "humantime_secs")]
	pub max_delay: Duration,
	pub jitter_fraction: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			initial_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(30),
			jitter_fraction: 0.2,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedirectConfig {
	pub follow_redirects: bool,
	pub max_redirects: u32,
	pub allow_https_to_http_downgrade: bool,
	pub enforce_redirect_total_timeout: bool,
}

impl Default for RedirectConfig {
	fn default() -> Self {
		Self {
			follow_redirects: true,
			max_redirects: 10,
			allow_https_to_http_downgrade: false,
			enforce_redirect_total_timeout: true,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieConfig {
	pub max_cookies_per_domain: usize,
	pub max_total_cookies: usize,
}

impl Default for CookieConfig {
	fn default() -> Self {
		Self {
			max_cookies_per_domain: 50,
			max_total_cookies: 3000,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
	pub allow_set_cookie_responses: bool,
	pub allow_authorized_responses: bool,
	#[serde(with = "humantime_secs")]
	pub heuristic_max_age: Duration,
	pub serve_stale_on_network_failure: bool,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			allow_set_cookie_responses: false,
			allow_authorized_responses: false,
			heuristic_max_age: Duration::from_secs(24 * 3600),
			// Default kept conservative: never serve stale on failure
			// unless explicitly opted in (see DESIGN.md).
			serve_stale_on_network_failure: false,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyCredentials {
	pub user: String,
	pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
	pub address: Option<String>,
	pub credentials: Option<ProxyCredentials>,
	pub bypass: Vec<String>,
	pub use_environment_variables: bool,
	pub allow_plaintext_auth: bool,
}

impl Default for ProxyConfig {
	fn default() -> Self {
		Self {
			address: None,
			credentials: None,
			bypass: Vec::new(),
			// §6 default: environment-variable discovery (HTTP_PROXY /
			// HTTPS_PROXY / NO_PROXY) is on unless a caller opts out.
			use_environment_variables: true,
			allow_plaintext_auth: false,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseLimits {
	pub max_body_bytes: u64,
	pub max_header_block_bytes: u64,
	pub max_line_bytes: u64,
}

impl Default for ResponseLimits {
	fn default() -> Self {
		Self {
			max_body_bytes: 100 * 1024 * 1024,
			max_header_block_bytes: 64 * 1024,
			max_line_bytes: 8 * 1024,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
	pub pool: PoolConfig,
	pub retry: RetryConfig,
	pub redirect: RedirectConfig,
	pub cookie: CookieConfig,
	pub cache: CacheConfig,
	pub proxy: ProxyConfig,
	pub response: ResponseLimits,
}

mod humantime_secs {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_secs(u64::deserialize(d)?))
	}
}

mod humantime_millis {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_millis(u64::deserialize(d)?))
	}
}
