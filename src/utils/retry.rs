//! Bounded retry for eventually-consistent network calls.
//!
//! Wraps `backoff::future::retry_notify` with a fixed-delay backoff that gives up after a
//! set number of attempts. Operations classify their own failures with
//! `backoff::Error::transient` (retry) or `backoff::Error::permanent` (stop now).

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt count and spacing for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Fixed wait between attempts.
	pub delay: Duration,
}

impl RetryPolicy {
	/// Transaction detail lookups against the explorer: 10 attempts, 2s apart.
	pub const NETWORK_FETCH: RetryPolicy = RetryPolicy::new(10, Duration::from_secs(2));
	/// Re-tracking addresses on the UTXO context.
	pub const UTXO_RESUBSCRIBE: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(1));

	pub const fn new(max_attempts: u32, delay: Duration) -> Self {
		Self {
			max_attempts,
			delay,
		}
	}

	fn backoff(&self) -> BoundedBackoff {
		let retries = self.max_attempts.saturating_sub(1);
		BoundedBackoff {
			delay: self.delay,
			retries,
			remaining: retries,
		}
	}
}

struct BoundedBackoff {
	delay: Duration,
	retries: u32,
	remaining: u32,
}

impl Backoff for BoundedBackoff {
	fn reset(&mut self) {
		self.remaining = self.retries;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.remaining == 0 {
			return None;
		}
		self.remaining -= 1;
		Some(self.delay)
	}
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts `policy`.
///
/// The last transient error is returned once attempts run out.
pub async fn retry_bounded<T, E, F, Fut>(
	policy: RetryPolicy,
	label: &str,
	operation: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, backoff::Error<E>>>,
	E: std::fmt::Display,
{
	let mut failures = 0u32;
	backoff::future::retry_notify(policy.backoff(), operation, |err: E, wait: Duration| {
		failures += 1;
		warn!(
			"{} failed (attempt {}/{}): {}; retrying in {:?}",
			label, failures, policy.max_attempts, err, wait
		);
	})
	.await
}
