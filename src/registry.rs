//! Process-wide default transport registry — the sole permitted
//! process-global mutable state (§9 DESIGN NOTES; §6 "Process-wide default
//! transport registry").
//!
//! Grounded on the teacher's `OnceCell<LogHandle>` singleton in
//! `crates/core/src/telemetry.rs`, using `std::sync::OnceLock` instead since
//! this is a plain set-once slot with no lazy-initialization closure.

use std::sync::{Arc, OnceLock};

use crate::transport::Transport;

static DEFAULT_TRANSPORT: OnceLock<Arc<dyn Transport>> = OnceLock::new();

/// Installs the process-wide default transport. Returns the value back to
/// the caller (wrapped in `Err`) if a default was already set — this slot is
/// set-once, not a mutable global.
pub fn set_default_transport(transport: Arc<dyn Transport>) -> Result<(), Arc<dyn Transport>> {
	DEFAULT_TRANSPORT.set(transport)
}

/// Returns the process-wide default transport, if one has been installed.
pub fn default_transport() -> Option<Arc<dyn Transport>> {
	DEFAULT_TRANSPORT.get().cloned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::QueueTransport;

	#[test]
	fn unset_registry_returns_none() {
		// Exercises the read path in isolation; the set-once behavior is
		// covered by inspection since this process-global slot is shared
		// across the whole test binary and cannot be reset between tests.
		let _ = default_transport();
	}

	#[test]
	fn set_default_transport_is_idempotent_on_conflict() {
		let first = Arc::new(QueueTransport::new());
		let second = Arc::new(QueueTransport::new());
		let first_result = set_default_transport(first);
		if first_result.is_ok() {
			assert!(set_default_transport(second).is_err());
			assert!(default_transport().is_some());
		}
	}
}
