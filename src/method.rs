//! The fixed method enumeration (§3 "Method").

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	Get,
	Head,
	Options,
	Post,
	Put,
	Patch,
	Delete,
}

impl Method {
	/// RFC 9110 idempotent set: GET, HEAD, OPTIONS, PUT, DELETE.
	pub fn is_idempotent(&self) -> bool {
		matches!(
			self,
			Method::Get | Method::Head | Method::Options | Method::Put | Method::Delete
		)
	}

	/// Methods considered "safe" for default cacheability (§4.8): GET, HEAD.
	pub fn is_safe(&self) -> bool {
		matches!(self, Method::Get | Method::Head)
	}

	/// Methods that carry a body by default.
	pub fn carries_body_by_default(&self) -> bool {
		matches!(
			self,
			Method::Post | Method::Put | Method::Patch | Method::Delete
		)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Head => "HEAD",
			Method::Options => "OPTIONS",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Method {
	type Err = crate::error::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"GET" => Ok(Method::Get),
			"HEAD" => Ok(Method::Head),
			"OPTIONS" => Ok(Method::Options),
			"POST" => Ok(Method::Post),
			"PUT" => Ok(Method::Put),
			"PATCH" => Ok(Method::Patch),
			"DELETE" => Ok(Method::Delete),
			other => Err(crate::error::Error::invalid_request(format!(
				"unsupported method: {other}"
			))),
		}
	}
}
