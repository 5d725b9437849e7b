//! Case-insensitive, multi-value, CRLF-safe header container (§3 "Header map").

use std::collections::HashMap;

use crate::error::{Error, ErrorKind};

/// Lowercased lookup key for a header name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct HeaderKey(String);

impl HeaderKey {
	fn new(name: &str) -> Self {
		Self(name.to_ascii_lowercase())
	}
}

#[derive(Clone, Debug, Default)]
struct HeaderSlot {
	/// Original case as first written, preserved for wire output.
	original_name: String,
	values: Vec<String>,
}

/// A header map with case-insensitive names, ordered multi-values, and
/// stable iteration order (insertion order of distinct names).
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
	slots: HashMap<HeaderKey, HeaderSlot>,
	order: Vec<HeaderKey>,
}

impl HeaderMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces all values for `name` with a single `value`.
	pub fn set(&mut self, name: &str, value: impl Into<String>) {
		let key = HeaderKey::new(name);
		if !self.slots.contains_key(&key) {
			self.order.push(key.clone());
		}
		self.slots.insert(
			key,
			HeaderSlot {
				original_name: name.to_string(),
				values: vec![value.into()],
			},
		);
	}

	/// Appends `value`, preserving any existing values for `name`.
	pub fn add(&mut self, name: &str, value: impl Into<String>) {
		let key = HeaderKey::new(name);
		match self.slots.get_mut(&key) {
			Some(slot) => slot.values.push(value.into()),
			None => {
				self.order.push(key.clone());
				self.slots.insert(
					key,
					HeaderSlot {
						original_name: name.to_string(),
						values: vec![value.into()],
					},
				);
			},
		}
	}

	/// Returns the first value for `name`, if present.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.slots
			.get(&HeaderKey::new(name))
			.and_then(|slot| slot.values.first())
			.map(String::as_str)
	}

	/// Returns every value for `name`, in insertion order.
	pub fn get_all(&self, name: &str) -> Vec<&str> {
		self.slots
			.get(&HeaderKey::new(name))
			.map(|slot| slot.values.iter().map(String::as_str).collect())
			.unwrap_or_default()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.slots.contains_key(&HeaderKey::new(name))
	}

	/// Removes all values for `name`, returning whether anything was removed.
	pub fn remove(&mut self, name: &str) -> bool {
		let key = HeaderKey::new(name);
		if self.slots.remove(&key).is_some() {
			self.order.retain(|k| k != &key);
			true
		} else {
			false
		}
	}

	/// Stable-ordered list of distinct header names (original case of first write).
	pub fn names(&self) -> Vec<&str> {
		self.order
			.iter()
			.filter_map(|k| self.slots.get(k))
			.map(|slot| slot.original_name.as_str())
			.collect()
	}

	/// Iterates `(original_name, value)` pairs in wire order: names in
	/// insertion order, each name's values in the order they were added.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.order.iter().flat_map(move |k| {
			let slot = &self.slots[k];
			slot
				.values
				.iter()
				.map(move |v| (slot.original_name.as_str(), v.as_str()))
		})
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	/// Validates every header name and value for CRLF injection and token
	/// rules, as required before writing onto the wire (§4.1). This is the
	/// defense-in-depth check: the serializer calls it right before writing.
	pub fn validate_for_wire(&self) -> Result<(), Error> {
		for (name, value) in self.iter() {
			validate_name(name)?;
			validate_value(value)?;
		}
		Ok(())
	}
}

fn validate_name(name: &str) -> Result<(), Error> {
	if name.is_empty() {
		return Err(Error::invalid_request("empty header name"));
	}
	for b in name.bytes() {
		let is_separator = matches!(
			b,
			b'(' | b')'
				| b'<' | b'>' | b'@'
				| b',' | b';' | b':'
				| b'\\' | b'"' | b'/'
				| b'[' | b']' | b'?'
				| b'=' | b'{' | b'}'
				| b' ' | b'\t'
		);
		if is_separator || b.is_ascii_control() || b > 0x7e {
			return Err(Error::invalid_request(format!(
				"invalid character in header name: {name:?}"
			)));
		}
	}
	Ok(())
}

fn validate_value(value: &str) -> Result<(), Error> {
	if value.contains('\r') || value.contains('\n') {
		return Err(Error::new(
			ErrorKind::InvalidRequest,
			"header value contains CR or LF",
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn set_replaces_all_values() {
		let mut h = HeaderMap::new();
		h.add("X-Foo", "a");
		h.add("X-Foo", "b");
		h.set("X-Foo", "c");
		assert_eq!(h.get_all("x-foo"), vec!["c"]);
	}

	#[test]
	fn case_insensitive_lookup_preserves_original_case() {
		let mut h = HeaderMap::new();
		h.set("Content-Type", "text/plain");
		assert_eq!(h.get("content-type"), Some("text/plain"));
		assert_eq!(h.names(), vec!["Content-Type"]);
	}

	#[test]
	fn multi_value_preserved_in_order() {
		let mut h = HeaderMap::new();
		h.add("Set-Cookie", "a=1");
		h.add("Set-Cookie", "b=2");
		assert_eq!(h.get_all("Set-Cookie"), vec!["a=1", "b=2"]);
	}

	#[test]
	fn rejects_crlf_in_value() {
		let mut h = HeaderMap::new();
		h.set("X-Foo", "bar\r\nInjected: true");
		assert!(h.validate_for_wire().is_err());
	}

	#[test]
	fn rejects_empty_name() {
		let mut h = HeaderMap::new();
		h.set("", "value");
		assert!(h.validate_for_wire().is_err());
	}

	#[test]
	fn remove_drops_from_order() {
		let mut h = HeaderMap::new();
		h.set("A", "1");
		h.set("B", "2");
		assert!(h.remove("a"));
		assert_eq!(h.names(), vec!["B"]);
	}
}
