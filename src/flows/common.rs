//! Shared helpers for grant implementations (PKCE, token issuance, revocation, observation).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{DelegationSession, RefreshTokenRecord, SessionId, TokenSecret, User},
	codec::{AccessTokenClaims, Subject},
	flows::Broker,
	obs::{self, FlowOutcome, FlowSpan, GrantKind, RevocationReason},
};

const PKCE_VERIFIER_LEN: usize = 64;
const TOKEN_TYPE: &str = "bearer";

/// Successful token-endpoint payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Always `bearer`.
	pub token_type: String,
	/// Signed access token.
	pub access_token: TokenSecret,
	/// Opaque `<id>.<secret>` refresh token.
	pub refresh_token: TokenSecret,
	/// Whether the refresh token rotates on use.
	pub refresh_rotate: bool,
	/// Seconds until the client should refresh (access lifetime minus skew margin).
	pub expires_in: i64,
}

/// Generates a random PKCE code verifier.
pub fn generate_code_verifier() -> String {
	rand::rng().sample_iter(Alphanumeric).take(PKCE_VERIFIER_LEN).map(char::from).collect()
}

/// Computes the S256 PKCE challenge (`base64url_nopad(SHA256(verifier))`).
pub fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}

impl Broker {
	/// Signs an access token for the session and packages it with the refresh token.
	pub(crate) fn issue_tokens(
		&self,
		session: &DelegationSession,
		user: Option<&User>,
		refresh: &RefreshTokenRecord,
		instant: OffsetDateTime,
	) -> Result<TokenResponse> {
		let policy = self.policy();
		let claims = AccessTokenClaims {
			client_id: session.client_id.to_string(),
			resource: session.resource.clone(),
			subject: subject_of(user),
			exp: policy.access_expiry(instant)?.unix_timestamp(),
			issuer: self.config.issuer_claim().to_owned(),
		};
		let access_token = self.signer.sign(&claims)?;

		Ok(TokenResponse {
			token_type: TOKEN_TYPE.into(),
			access_token: TokenSecret::new(access_token),
			refresh_token: refresh.opaque(),
			refresh_rotate: session.refresh_rotate,
			expires_in: policy.expires_in(),
		})
	}

	/// Deletes a session on the broker's own initiative and records why.
	pub(crate) async fn revoke(&self, session_id: &SessionId, reason: RevocationReason) -> Result<()> {
		self.store.delete_session(session_id).await?;

		obs::record_revocation(session_id, reason);

		Ok(())
	}
}

/// Runs a grant future inside its span, recording attempt and outcome.
pub(crate) async fn observe<T, Fut>(kind: GrantKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	obs::record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}

pub(crate) fn subject_of(user: Option<&User>) -> Subject {
	let Some(user) = user else {
		return Subject::default();
	};

	Subject {
		email: user.email.clone().unwrap_or_default(),
		name: user.name.clone().unwrap_or_default(),
		image: user.image.clone().unwrap_or_default(),
	}
}
