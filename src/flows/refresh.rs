//! Refresh-token exchange with rotation, replay detection, and sliding expiry.
//!
//! Rotation is a single [`rotate_refresh_token`](crate::store::SessionStore::rotate_refresh_token)
//! call, so at most one live token exists per session even when clients race. A rotated-out
//! token presented inside the replay leeway is treated as a duplicate request and answered with
//! the session's live token; past the leeway it is a replay and the whole session is revoked.

mod metrics;

pub use metrics::{RefreshCounts, RefreshMetrics};

// self
use crate::{
	_prelude::*,
	auth::{OpaqueCredential, RefreshTokenId, RefreshTokenRecord, RefreshTokenStatus, SessionId},
	error::AuthError,
	flows::{Broker, TokenResponse, common},
	obs::{GrantKind, RevocationReason},
	store::{RefreshGrant, RotationOutcome},
};

impl Broker {
	/// Exchanges a refresh token for a new token pair.
	pub async fn refresh_session(&self, refresh_token: &str) -> Result<TokenResponse> {
		common::observe(GrantKind::Refresh, "refresh_session", async move {
			self.refresh_metrics.record_attempt();

			let result = self.refresh_inner(refresh_token).await;

			self.refresh_metrics.record_outcome(result.is_ok());

			result
		})
		.await
	}

	async fn refresh_inner(&self, refresh_token: &str) -> Result<TokenResponse> {
		let now = self.now();
		let policy = *self.policy();
		let credential = OpaqueCredential::parse(refresh_token)?;
		let token_id =
			RefreshTokenId::new(credential.id).map_err(|_| AuthError::UnknownRefreshToken)?;
		let RefreshGrant { token, mut session, user } = self
			.store
			.fetch_refresh_grant(&token_id, credential.secret)
			.await?
			.ok_or(AuthError::UnknownRefreshToken)?;

		if token.status_at(now, policy.replay_leeway) == RefreshTokenStatus::Replayed {
			return self.revoke_replayed(&session.id).await;
		}
		if session.is_expired_at(now) {
			self.revoke(&session.id, RevocationReason::Expired).await?;

			return Err(AuthError::SessionExpired.into());
		}

		let live = if session.refresh_rotate {
			let replacement = RefreshTokenRecord::issue(session.id.clone(), now);

			match self.store.rotate_refresh_token(&token.id, replacement.clone(), now).await? {
				RotationOutcome::Rotated => replacement,
				RotationOutcome::AlreadyRotated { invalid_since, current } => {
					if policy.is_replay(invalid_since, now) {
						return self.revoke_replayed(&session.id).await;
					}

					self.refresh_metrics.record_duplicate();

					current.ok_or(AuthError::LostRace { operation: "refresh_token" })?
				},
				RotationOutcome::Missing => return Err(AuthError::UnknownRefreshToken.into()),
			}
		} else {
			token
		};

		if session.is_browser() {
			let until = policy.refresh_expiry(now)?;

			self.store.slide_refresh_expiry(&session.id, until).await?;
			session.refresh_expires_at = Some(until);
		}

		self.issue_tokens(&session, user.as_ref(), &live, now)
	}

	async fn revoke_replayed(&self, session_id: &SessionId) -> Result<TokenResponse> {
		self.revoke(session_id, RevocationReason::RefreshTokenReplay).await?;
		self.refresh_metrics.record_replay();

		Err(AuthError::RefreshTokenReplayed.into())
	}
}
