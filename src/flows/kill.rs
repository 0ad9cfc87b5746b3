//! Kill-session: the client-initiated logout path.

// self
use crate::{
	_prelude::*,
	auth::{OpaqueCredential, RefreshTokenId},
	flows::{Broker, common},
	obs::GrantKind,
};

impl Broker {
	/// Deletes the session owning `refresh_token`, or its whole federated session when
	/// `sign_out` is set and the session is tied to one.
	///
	/// The token is looked up without validity checks, and malformed or unknown tokens are
	/// acknowledged the same way, so callers cannot test which sessions are live.
	pub async fn kill_session(&self, refresh_token: &str, sign_out: bool) -> Result<()> {
		common::observe(GrantKind::KillSession, "kill_session", async move {
			let Ok(credential) = OpaqueCredential::parse(refresh_token) else {
				return Ok(());
			};
			let Ok(token_id) = RefreshTokenId::new(credential.id) else {
				return Ok(());
			};
			let Some(grant) = self.store.fetch_refresh_grant(&token_id, credential.secret).await?
			else {
				return Ok(());
			};

			match grant.session.federated_session_id.as_ref().filter(|_| sign_out) {
				Some(federated) => {
					self.store.delete_federated_session(federated).await?;
				},
				None => {
					self.store.delete_session(&grant.session.id).await?;
				},
			}

			Ok(())
		})
		.await
	}
}
