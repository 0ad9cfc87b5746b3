//! Authorization code + PKCE exchange.
//!
//! A code is single use. Every rejected attempt (wrong secret, wrong verifier, replay, or
//! expiry) deletes the session it names, so a leaked code cannot be brute-forced or replayed.

// self
use crate::{
	_prelude::*,
	auth::{OpaqueCredential, RefreshTokenRecord, SessionId},
	error::AuthError,
	flows::{Broker, TokenResponse, common},
	obs::{GrantKind, RevocationReason},
	store::CompareAndSwapOutcome,
};

impl Broker {
	/// Exchanges a one-time authorization code plus its PKCE verifier for a token pair.
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		code_verifier: &str,
	) -> Result<TokenResponse> {
		common::observe(GrantKind::AuthorizationCode, "exchange_authorization_code", async move {
			let now = self.now();
			let credential = OpaqueCredential::parse(code)?;
			let session_id =
				SessionId::new(credential.id).map_err(|_| AuthError::UnknownAuthorizationCode)?;
			let session = self
				.store
				.fetch_session(&session_id)
				.await?
				.ok_or(AuthError::UnknownAuthorizationCode)?;
			let checked = match &session.pkce {
				Some(pkce) => pkce.verify(
					credential.secret,
					&common::compute_pkce_challenge(code_verifier),
					now,
				),
				None => Err(AuthError::AuthorizationCodeRejected {
					reason: "session was not issued an authorization code",
				}),
			};

			if let Err(e) = checked {
				self.revoke(&session.id, RevocationReason::RejectedAuthorizationCode).await?;

				return Err(e.into());
			}

			match self.store.mark_authorization_used(&session.id).await? {
				CompareAndSwapOutcome::Updated => {},
				CompareAndSwapOutcome::Conflict => {
					self.revoke(&session.id, RevocationReason::AuthorizationCodeRace).await?;

					return Err(AuthError::LostRace { operation: "authorization_code" }.into());
				},
				CompareAndSwapOutcome::Missing =>
					return Err(AuthError::UnknownAuthorizationCode.into()),
			}

			let refresh = RefreshTokenRecord::issue(session.id.clone(), now);

			if self.store.insert_refresh_token(refresh.clone()).await?
				!= CompareAndSwapOutcome::Updated
			{
				return Err(AuthError::UnknownAuthorizationCode.into());
			}

			let user = self.store.fetch_user(&session.user_id).await?;

			self.issue_tokens(&session, user.as_ref(), &refresh, now)
		})
		.await
	}
}
