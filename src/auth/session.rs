//! Delegation sessions: the grant record binding a user, a client, and one resource server.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, FederatedSessionId, SessionId, TokenSecret, UserId},
	error::{AuthError, ClientError},
};

/// Kind of delegation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
	/// Tied to a live federated session; refresh expiry slides on use.
	Browser,
	/// Standalone, longer-lived key bounded only by its absolute expiry.
	ApiKey,
}
impl SessionType {
	/// Returns the wire label (`browser` or `apiKey`).
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionType::Browser => "browser",
			SessionType::ApiKey => "apiKey",
		}
	}
}
impl Display for SessionType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for SessionType {
	type Err = ClientError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"browser" => Ok(Self::Browser),
			"apiKey" => Ok(Self::ApiKey),
			other => Err(ClientError::UnknownSessionType { value: other.to_owned() }),
		}
	}
}

/// Lifecycle status for a delegation session at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
	/// Created through the OAuth front channel; the authorization code is still unredeemed.
	AwaitingExchange,
	/// Tokens have been (or can be) issued.
	Active,
	/// Absolute or sliding expiry has passed; the next sweep removes it.
	Expired,
}

/// PKCE binding carried by sessions created through the authorization-code front channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceBinding {
	/// `base64url(SHA256(code_verifier))` supplied by the client.
	pub code_challenge: String,
	/// One-time authorization secret; the second half of the authorization code.
	pub secret: TokenSecret,
	/// Set once the code has been redeemed. Never reset.
	pub used: bool,
	/// Instant after which the code can no longer be redeemed.
	pub expires_at: OffsetDateTime,
}
impl PkceBinding {
	/// Checks a presented secret + derived challenge against the binding.
	pub fn verify(
		&self,
		secret: &str,
		code_challenge: &str,
		instant: OffsetDateTime,
	) -> Result<(), AuthError> {
		if !self.secret.matches(secret) {
			return Err(AuthError::AuthorizationCodeRejected { reason: "secret mismatch" });
		}
		if self.code_challenge != code_challenge {
			return Err(AuthError::AuthorizationCodeRejected { reason: "code verifier mismatch" });
		}
		if self.used {
			return Err(AuthError::AuthorizationCodeRejected { reason: "code already redeemed" });
		}
		if self.expires_at < instant {
			return Err(AuthError::AuthorizationCodeRejected { reason: "code expired" });
		}

		Ok(())
	}
}

/// The unit of delegated trust between a user, a client application, and a resource server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationSession {
	/// Server-generated identifier.
	pub id: SessionId,
	/// Browser or API-key session.
	pub session_type: SessionType,
	/// Owner of the grant.
	pub user_id: UserId,
	/// Client application the grant was issued to.
	pub client_id: ClientId,
	/// Resource server URL; copied verbatim into every access token.
	pub resource: String,
	/// Opaque scope string.
	pub scope: String,
	/// Human-readable label.
	pub label: String,
	/// Description of the device or agent that created the session.
	pub created_on: String,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Federated session whose sign-out cascades here (browser sessions only).
	pub federated_session_id: Option<FederatedSessionId>,
	/// PKCE binding; absent for sessions issued without the OAuth front channel.
	pub pkce: Option<PkceBinding>,
	/// Whether refresh tokens rotate on every use.
	pub refresh_rotate: bool,
	/// Absolute expiry; the grant dies here regardless of activity.
	pub expires_at: OffsetDateTime,
	/// Sliding expiry, pushed forward on every refresh (browser sessions only).
	pub refresh_expires_at: Option<OffsetDateTime>,
}
impl DelegationSession {
	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> SessionStatus {
		if self.is_expired_at(instant) {
			return SessionStatus::Expired;
		}
		if self.pkce.as_ref().is_some_and(|pkce| !pkce.used) {
			return SessionStatus::AwaitingExchange;
		}

		SessionStatus::Active
	}

	/// Returns `true` when either expiry has passed (inclusive) at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at <= instant || self.refresh_expires_at.is_some_and(|at| at <= instant)
	}

	/// Returns `true` for browser sessions.
	pub fn is_browser(&self) -> bool {
		matches!(self.session_type, SessionType::Browser)
	}
}
