//! Retry interceptor: idempotency-aware exponential backoff with jitter
//! (§4.5).
//!
//! Grounded on the teacher's `backoff`/retry helpers used around its proxy
//! dial loops (`crates/hbone/src/pool.rs` retries connect attempts with a
//! capped exponential schedule); generalized here to the full
//! request/response pipeline with explicit jitter and cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryConfig;
use crate::context::RequestContext;
use crate::error::Error;
use crate::pipeline::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;

pub struct RetryInterceptor {
	config: RetryConfig,
}

impl RetryInterceptor {
	pub fn new(config: RetryConfig) -> Self {
		Self { config }
	}

	/// `delay_k = min(maxDelay, initialDelay * 2^k)`, then scaled by a
	/// uniform jitter factor in `[1 - jitterFraction, 1 + jitterFraction]`.
	fn backoff_delay(&self, attempt: u32) -> Duration {
		let base = self.config.initial_delay.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
		let capped = base.min(self.config.max_delay);
		let jitter = self.config.jitter_fraction.clamp(0.0, 1.0);
		let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
		capped.mul_f64(factor.max(0.0))
	}
}

#[async_trait]
impl Interceptor for RetryInterceptor {
	async fn intercept(
		&self,
		request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
		next: Next<'_>,
	) -> Result<Response, Error> {
		let idempotent = request.method.is_idempotent();
		let mut attempt: u32 = 0;

		loop {
			let outcome = next.call(request.clone(), ctx.clone(), ct.clone()).await;

			let should_retry = idempotent
				&& attempt < self.config.max_retries
				&& match &outcome {
					Ok(response) => (500..600).contains(&response.status),
					Err(e) => e.is_retryable(),
				};

			if !should_retry {
				return outcome;
			}

			let delay = self.backoff_delay(attempt);
			debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying request");
			ctx.record_event("retryDelay", vec![("attempt".into(), attempt.to_string())]);

			tokio::select! {
				biased;
				_ = ct.cancelled() => return outcome,
				_ = tokio::time::sleep(delay) => {},
			}

			attempt += 1;
		}
	}
}
