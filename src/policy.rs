//! Expiry policy and clock sources.
//!
//! Every lifetime the broker hands out is derived here from a configured [`ExpiryPolicy`]
//! and an instant supplied by a [`Clock`]. The functions are pure so grant flows can be
//! driven deterministically with [`ManualClock`] in tests.

// crates.io
use serde::{Deserializer, Serializer};
// self
use crate::{
	_prelude::*,
	error::{ClientError, ConfigError},
};

/// Source of the current instant.
pub trait Clock
where
	Self: Debug + Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<OffsetDateTime>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Mutex::new(start))
	}

	/// Moves the clock forward (or backward, for negative durations).
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

/// Lifetimes and tolerances applied by the grant engine.
///
/// Durations are whole seconds on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryPolicy {
	/// Absolute session lifetime when the caller does not ask for a custom one.
	#[serde(with = "secs")]
	pub session_ttl: Duration,
	/// Sliding refresh window for browser sessions.
	#[serde(with = "secs")]
	pub refresh_ttl: Duration,
	/// Access-token lifetime.
	#[serde(with = "secs")]
	pub access_ttl: Duration,
	/// How long an authorization code stays redeemable.
	#[serde(with = "secs")]
	pub authorization_ttl: Duration,
	/// Grace period in which a rotated-out refresh token is treated as a duplicate request.
	#[serde(with = "secs")]
	pub replay_leeway: Duration,
	/// Subtracted from `expires_in` so clients refresh before the token really expires.
	#[serde(with = "secs")]
	pub clock_skew_margin: Duration,
	/// Longest lifetime an API-key session may ask for.
	#[serde(with = "secs")]
	pub max_custom_ttl: Duration,
}
impl ExpiryPolicy {
	/// Default absolute session lifetime (60 days).
	pub const DEFAULT_SESSION_TTL: Duration = Duration::days(60);
	/// Default sliding refresh window (72 hours).
	pub const DEFAULT_REFRESH_TTL: Duration = Duration::hours(72);
	/// Default access-token lifetime (18 seconds).
	pub const DEFAULT_ACCESS_TTL: Duration = Duration::seconds(18);
	/// Default authorization-code lifetime (10 minutes).
	pub const DEFAULT_AUTHORIZATION_TTL: Duration = Duration::minutes(10);
	/// Default replay leeway (2 seconds).
	pub const DEFAULT_REPLAY_LEEWAY: Duration = Duration::seconds(2);
	/// Default clock-skew margin (3 seconds).
	pub const DEFAULT_CLOCK_SKEW_MARGIN: Duration = Duration::seconds(3);
	/// Default ceiling for custom session lifetimes (10 years).
	pub const DEFAULT_MAX_CUSTOM_TTL: Duration = Duration::days(3_650);

	/// Overrides the default session lifetime.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.session_ttl = ttl;

		self
	}

	/// Overrides the sliding refresh window.
	pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
		self.refresh_ttl = ttl;

		self
	}

	/// Overrides the access-token lifetime.
	pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
		self.access_ttl = ttl;

		self
	}

	/// Overrides the authorization-code lifetime.
	pub fn with_authorization_ttl(mut self, ttl: Duration) -> Self {
		self.authorization_ttl = ttl;

		self
	}

	/// Overrides the replay leeway.
	pub fn with_replay_leeway(mut self, leeway: Duration) -> Self {
		self.replay_leeway = leeway;

		self
	}

	/// Overrides the clock-skew margin.
	pub fn with_clock_skew_margin(mut self, margin: Duration) -> Self {
		self.clock_skew_margin = margin;

		self
	}

	/// Overrides the ceiling for custom session lifetimes.
	pub fn with_max_custom_ttl(mut self, ttl: Duration) -> Self {
		self.max_custom_ttl = ttl;

		self
	}

	/// Checks the policy invariants.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let lifetimes = [
			(self.session_ttl, "session_ttl must be positive"),
			(self.refresh_ttl, "refresh_ttl must be positive"),
			(self.access_ttl, "access_ttl must be positive"),
			(self.authorization_ttl, "authorization_ttl must be positive"),
			(self.max_custom_ttl, "max_custom_ttl must be positive"),
		];

		for (ttl, reason) in lifetimes {
			if !ttl.is_positive() {
				return Err(ConfigError::InvalidPolicy { reason });
			}
		}

		if self.replay_leeway.is_negative() {
			return Err(ConfigError::InvalidPolicy { reason: "replay_leeway cannot be negative" });
		}
		if self.clock_skew_margin.is_negative() || self.clock_skew_margin >= self.access_ttl {
			return Err(ConfigError::InvalidPolicy {
				reason: "clock_skew_margin must be non-negative and shorter than access_ttl",
			});
		}

		Ok(())
	}

	/// Rejects a requested session lifetime above [`ExpiryPolicy::max_custom_ttl`].
	pub fn check_custom_lifetime(&self, custom: Duration) -> Result<(), ClientError> {
		if custom > self.max_custom_ttl {
			return Err(ClientError::LifetimeTooLong { max_seconds: self.max_custom_ttl.whole_seconds() });
		}

		Ok(())
	}

	/// Absolute session expiry; `custom` wins when supplied.
	pub fn session_expiry(
		&self,
		instant: OffsetDateTime,
		custom: Option<Duration>,
	) -> Result<OffsetDateTime, ClientError> {
		self.offset(instant, custom.unwrap_or(self.session_ttl))
	}

	/// Sliding refresh expiry for browser sessions.
	pub fn refresh_expiry(&self, instant: OffsetDateTime) -> Result<OffsetDateTime, ClientError> {
		self.offset(instant, self.refresh_ttl)
	}

	/// Access-token expiry.
	pub fn access_expiry(&self, instant: OffsetDateTime) -> Result<OffsetDateTime, ClientError> {
		self.offset(instant, self.access_ttl)
	}

	/// Authorization-code expiry.
	pub fn authorization_expiry(
		&self,
		instant: OffsetDateTime,
	) -> Result<OffsetDateTime, ClientError> {
		self.offset(instant, self.authorization_ttl)
	}

	fn offset(&self, instant: OffsetDateTime, ttl: Duration) -> Result<OffsetDateTime, ClientError> {
		instant
			.checked_add(ttl)
			.ok_or(ClientError::LifetimeTooLong { max_seconds: self.max_custom_ttl.whole_seconds() })
	}

	/// `expires_in` reported to clients, in whole seconds.
	pub fn expires_in(&self) -> i64 {
		(self.access_ttl - self.clock_skew_margin).whole_seconds().max(0)
	}

	/// Returns `true` when a token rotated out at `invalid_since` is being replayed at `instant`.
	pub fn is_replay(&self, invalid_since: OffsetDateTime, instant: OffsetDateTime) -> bool {
		instant - invalid_since > self.replay_leeway
	}
}
impl Default for ExpiryPolicy {
	fn default() -> Self {
		Self {
			session_ttl: Self::DEFAULT_SESSION_TTL,
			refresh_ttl: Self::DEFAULT_REFRESH_TTL,
			access_ttl: Self::DEFAULT_ACCESS_TTL,
			authorization_ttl: Self::DEFAULT_AUTHORIZATION_TTL,
			replay_leeway: Self::DEFAULT_REPLAY_LEEWAY,
			clock_skew_margin: Self::DEFAULT_CLOCK_SKEW_MARGIN,
			max_custom_ttl: Self::DEFAULT_MAX_CUSTOM_TTL,
		}
	}
}

mod secs {
	// self
	use super::*;

	pub(super) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}
