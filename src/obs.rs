//! Optional observability helpers for broker grants.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `middlecat_broker.grant` with the `grant`
//!   and `stage` (call site) fields, a `warn` event for every session revocation, and a `debug`
//!   event when a sweep removes sessions.
//! - Enable `metrics` to increment `middlecat_broker_grant_total` for every
//!   attempt/success/failure, labeled by `grant` + `outcome`, and
//!   `middlecat_broker_revocation_total`, labeled by `reason`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, auth::SessionId};

/// Grant operations observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantKind {
	/// Session creation (OAuth front channel or direct API key).
	CreateSession,
	/// Authorization code + PKCE exchange.
	AuthorizationCode,
	/// Refresh token exchange.
	Refresh,
	/// Kill-session request.
	KillSession,
	/// Expiry sweep.
	Sweep,
	/// Server-token issuance.
	ServerToken,
}
impl GrantKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantKind::CreateSession => "create_session",
			GrantKind::AuthorizationCode => "authorization_code",
			GrantKind::Refresh => "refresh_token",
			GrantKind::KillSession => "kill_session",
			GrantKind::Sweep => "sweep",
			GrantKind::ServerToken => "server_token",
		}
	}
}
impl Display for GrantKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a grant operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Why the broker deleted a delegation session on its own initiative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RevocationReason {
	/// An authorization code failed validation.
	RejectedAuthorizationCode,
	/// A second exchange raced the first for the same code.
	AuthorizationCodeRace,
	/// A rotated-out refresh token was presented after the leeway.
	RefreshTokenReplay,
	/// The session expired before the request was served.
	Expired,
}
impl RevocationReason {
	/// Returns a stable label suitable for log or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RevocationReason::RejectedAuthorizationCode => "rejected_authorization_code",
			RevocationReason::AuthorizationCodeRace => "authorization_code_race",
			RevocationReason::RefreshTokenReplay => "refresh_token_replay",
			RevocationReason::Expired => "expired",
		}
	}
}
impl Display for RevocationReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Logs and counts a broker-initiated revocation.
pub fn record_revocation(session_id: &SessionId, reason: RevocationReason) {
	log_revocation(session_id, reason);
	count_revocation(reason);
}
