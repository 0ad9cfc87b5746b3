//! Server tokens: a signed assertion of the caller's identity, addressed to one server.

// self
use crate::{
	_prelude::*,
	auth::{FederatedIdentity, TokenSecret},
	codec::ServerTokenClaims,
	error::ClientError,
	flows::{Broker, common},
	obs::GrantKind,
};

impl Broker {
	/// Signs the signed-in caller's identity for `server`.
	///
	/// The token carries `email`, `name`, `image`, and `server`, and expires with the
	/// access-token lifetime.
	pub async fn issue_server_token(
		&self,
		caller: &FederatedIdentity,
		server: &str,
	) -> Result<TokenSecret> {
		common::observe(GrantKind::ServerToken, "server_token", async move {
			if server.trim().is_empty() {
				return Err(ClientError::MissingField { field: "server" }.into());
			}

			let user = self
				.store
				.fetch_user(&caller.user_id)
				.await?
				.ok_or(ClientError::UnknownUser)?;
			let claims = ServerTokenClaims {
				subject: common::subject_of(Some(&user)),
				server: server.to_owned(),
				exp: self.policy().access_expiry(self.now())?.unix_timestamp(),
			};

			Ok(TokenSecret::new(self.signer.sign(&claims)?))
		})
		.await
	}
}
