//! Per-execution request context: timeline, opaque state, stopwatch (§3).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::request::Request;

#[derive(Clone, Debug)]
pub struct TimelineEvent {
	pub name: String,
	pub elapsed: Duration,
	pub attributes: Vec<(String, String)>,
}

/// Thread-safe, per-execution state shared by every interceptor invocation
/// for a single logical request (including all of its redirect hops, per
/// §4.6 "All hops share one execution context").
pub struct RequestContext {
	request: Mutex<Arc<Request>>,
	timeline: Mutex<Vec<TimelineEvent>>,
	state: RwLock<HashMap<String, Value>>,
	started_at: Instant,
}

impl RequestContext {
	pub fn new(request: Arc<Request>) -> Self {
		Self {
			request: Mutex::new(request),
			timeline: Mutex::new(Vec::new()),
			state: RwLock::new(HashMap::new()),
			started_at: Instant::now(),
		}
	}

	pub fn current_request(&self) -> Arc<Request> {
		self.request.lock().expect("request lock poisoned").clone()
	}

	pub fn set_current_request(&self, request: Arc<Request>) {
		*self.request.lock().expect("request lock poisoned") = request;
	}

	pub fn record_event(&self, name: impl Into<String>, attributes: Vec<(String, String)>) {
		let event = TimelineEvent {
			name: name.into(),
			elapsed: self.elapsed(),
			attributes,
		};
		tracing::trace!(event = %event.name, elapsed_ms = event.elapsed.as_millis() as u64, "timeline event");
		self
			.timeline
			.lock()
			.expect("timeline lock poisoned")
			.push(event);
	}

	pub fn timeline(&self) -> Vec<TimelineEvent> {
		self.timeline.lock().expect("timeline lock poisoned").clone()
	}

	pub fn set_state(&self, key: impl Into<String>, value: Value) {
		self
			.state
			.write()
			.expect("state lock poisoned")
			.insert(key.into(), value);
	}

	pub fn get_state(&self, key: &str) -> Option<Value> {
		self.state.read().expect("state lock poisoned").get(key).cloned()
	}

	pub fn elapsed(&self) -> Duration {
		self.started_at.elapsed()
	}

	pub fn elapsed_ms(&self) -> u128 {
		self.elapsed().as_millis()
	}
}
