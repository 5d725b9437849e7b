//! Proxy selection: bypass matching, environment discovery, and tunneling
//! composed into one per-request decision (§4.9).

pub mod bypass;
pub mod env;
pub mod tunnel;

use base64::Engine;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::Error;
use crate::request::Request;

/// What the transport should do to reach `target_host:target_port`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProxyDecision {
	/// No proxy in play; connect straight to the origin.
	Direct,
	/// Plain `http` request: send it to the proxy verbatim, absolute-form
	/// request target, no tunnel (§4.9).
	Forward { proxy_host: String, proxy_port: u16 },
	/// `https` request: establish a `CONNECT` tunnel to the proxy first,
	/// then TLS-handshake with the origin over the tunneled socket.
	Tunnel { proxy_host: String, proxy_port: u16 },
}

impl ProxyDecision {
	/// A stable identity distinguishing pool buckets that go through
	/// different proxies (§4.2 pool key).
	pub fn identity(&self) -> Option<String> {
		match self {
			ProxyDecision::Direct => None,
			ProxyDecision::Forward { proxy_host, proxy_port } | ProxyDecision::Tunnel { proxy_host, proxy_port } => {
				Some(format!("{proxy_host}:{proxy_port}"))
			},
		}
	}
}

/// Resolves the proxy decision for one request, given its scheme and
/// origin. `cfg.address` takes precedence over environment discovery;
/// bypass patterns (explicit plus, if enabled, `NO_PROXY`) are checked
/// before the decision is finalized.
pub fn resolve(
	scheme: &str,
	target_host: &str,
	target_port: u16,
	cfg: &ProxyConfig,
) -> Result<ProxyDecision, Error> {
	let address = match &cfg.address {
		Some(addr) => Some(addr.clone()),
		None if cfg.use_environment_variables => env::discover(scheme),
		None => None,
	};

	let Some(address) = address else {
		return Ok(ProxyDecision::Direct);
	};

	let mut bypass_patterns = cfg.bypass.clone();
	if cfg.use_environment_variables {
		bypass_patterns.extend(env::no_proxy());
	}
	if bypass::matches_bypass(&bypass_patterns, target_host, target_port) {
		return Ok(ProxyDecision::Direct);
	}

	let url = Url::parse(&address)
		.map_err(|e| Error::with_cause(crate::error::ErrorKind::InvalidRequest, "invalid proxy address", e))?;
	let proxy_host = url
		.host_str()
		.ok_or_else(|| Error::invalid_request("proxy address has no host"))?
		.to_string();
	let proxy_port = url.port_or_known_default().unwrap_or(80);

	Ok(match scheme {
		"https" => ProxyDecision::Tunnel { proxy_host, proxy_port },
		_ => ProxyDecision::Forward { proxy_host, proxy_port },
	})
}

/// Attaches `Proxy-Authorization` to a request forwarded (not tunneled)
/// through a proxy, when credentials are configured (§4.9). Gated by the
/// same `allowPlaintextAuth` check as the `CONNECT` tunnel, since a forward
/// request carries Basic credentials over the wire just as plainly.
pub fn apply_forward_auth(request: &Request, cfg: &ProxyConfig) -> Result<Request, Error> {
	let Some(creds) = &cfg.credentials else {
		return Ok(request.clone());
	};
	if !cfg.allow_plaintext_auth {
		return Err(Error::invalid_request(
			"refusing to send Basic proxy auth over a plaintext forward proxy request; set allowPlaintextAuth to permit it",
		));
	}
	let mut forwarded = request.clone();
	let value = format!(
		"Basic {}",
		base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", creds.user, creds.password))
	);
	forwarded.headers.set("Proxy-Authorization", value);
	Ok(forwarded)
}
