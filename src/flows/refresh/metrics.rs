// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshCounts {
	/// Refresh exchanges attempted.
	pub attempts: u64,
	/// Exchanges that returned tokens, duplicates included.
	pub successes: u64,
	/// Exchanges that returned an error.
	pub failures: u64,
	/// Rotated-out tokens answered with the live token inside the leeway.
	pub duplicates: u64,
	/// Replays that revoked a session.
	pub replays: u64,
}

/// Lock-free counters for refresh exchanges, shared by every clone of a broker.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	duplicates: AtomicU64,
	replays: AtomicU64,
}
impl RefreshMetrics {
	/// Total refresh attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Successful exchanges, including duplicates inside the leeway.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Failed exchanges.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// How often a rotated-out token was answered with the session's live token.
	pub fn duplicates(&self) -> u64 {
		self.duplicates.load(Ordering::Relaxed)
	}

	/// How often a replayed token took its session down.
	pub fn replays(&self) -> u64 {
		self.replays.load(Ordering::Relaxed)
	}

	/// Reads every counter at once.
	pub fn snapshot(&self) -> RefreshCounts {
		RefreshCounts {
			attempts: self.attempts(),
			successes: self.successes(),
			failures: self.failures(),
			duplicates: self.duplicates(),
			replays: self.replays(),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome(&self, ok: bool) {
		let counter = if ok { &self.successes } else { &self.failures };

		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_duplicate(&self) {
		self.duplicates.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_replay(&self) {
		self.replays.fetch_add(1, Ordering::Relaxed);
	}
}
