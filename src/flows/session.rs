//! Session creation for both the OAuth front channel and direct API-key issuance.

// self
use crate::{
	_prelude::*,
	auth::{
		ClientId, DelegationSession, FederatedSessionId, OpaqueCredential, PkceBinding,
		RefreshTokenRecord, SessionId, SessionType, TokenSecret, UserId,
	},
	error::{AuthError, ClientError},
	flows::{Broker, TokenResponse, common},
	obs::GrantKind,
	policy::ExpiryPolicy,
	store::CompareAndSwapOutcome,
};

const AUTHORIZATION_SECRET_LEN: usize = 64;

/// How the new session hands out its first credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantMode {
	/// OAuth front channel: return a one-time authorization code bound to a PKCE challenge.
	AuthorizationCode {
		/// `base64url(SHA256(code_verifier))` supplied by the client.
		code_challenge: String,
	},
	/// Issue tokens immediately (API keys created from a trusted UI).
	Direct,
}

/// Parameters for [`Broker::create_session`].
#[derive(Clone, Debug)]
pub struct SessionRequest {
	/// Owner of the new grant.
	pub user_id: UserId,
	/// Browser or API-key session.
	pub session_type: SessionType,
	/// Client application identifier (usually the redirect host).
	pub client_id: String,
	/// Resource server URL.
	pub resource: String,
	/// Human-readable label.
	pub label: String,
	/// Opaque scope string.
	pub scope: String,
	/// Description of the device or agent creating the session.
	pub created_on: String,
	/// Whether refresh tokens rotate on use (defaults to `true`).
	pub refresh_rotate: bool,
	/// Custom absolute lifetime; API-key sessions only.
	pub expires_in: Option<Duration>,
	/// Federated session that browser sessions are tied to.
	pub federated_session_id: Option<FederatedSessionId>,
	/// Front-channel or direct issuance.
	pub mode: GrantMode,
}
impl SessionRequest {
	/// Creates a direct-mode request with rotation enabled and no custom lifetime.
	pub fn new(
		user_id: UserId,
		session_type: SessionType,
		client_id: impl Into<String>,
		resource: impl Into<String>,
		label: impl Into<String>,
	) -> Self {
		Self {
			user_id,
			session_type,
			client_id: client_id.into(),
			resource: resource.into(),
			label: label.into(),
			scope: String::new(),
			created_on: String::new(),
			refresh_rotate: true,
			expires_in: None,
			federated_session_id: None,
			mode: GrantMode::Direct,
		}
	}

	/// Switches to the OAuth front channel with the given PKCE challenge.
	pub fn with_authorization_code(mut self, code_challenge: impl Into<String>) -> Self {
		self.mode = GrantMode::AuthorizationCode { code_challenge: code_challenge.into() };

		self
	}

	/// Ties the session to a federated session.
	pub fn with_federated_session(mut self, id: FederatedSessionId) -> Self {
		self.federated_session_id = Some(id);

		self
	}

	/// Sets the opaque scope string.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Describes the creating device.
	pub fn with_created_on(mut self, created_on: impl Into<String>) -> Self {
		self.created_on = created_on.into();

		self
	}

	/// Enables or disables refresh-token rotation.
	pub fn with_refresh_rotate(mut self, rotate: bool) -> Self {
		self.refresh_rotate = rotate;

		self
	}

	/// Requests a custom absolute lifetime.
	pub fn with_expires_in(mut self, lifetime: Duration) -> Self {
		self.expires_in = Some(lifetime);

		self
	}

	fn validate(&self, policy: &ExpiryPolicy) -> Result<ClientId, ClientError> {
		for (value, field) in
			[(&self.client_id, "clientId"), (&self.resource, "resource"), (&self.label, "label")]
		{
			if value.trim().is_empty() {
				return Err(ClientError::MissingField { field });
			}
		}

		match (self.session_type, self.federated_session_id.is_some()) {
			(SessionType::ApiKey, true) => return Err(ClientError::ApiKeyWithFederatedSession),
			(SessionType::Browser, false) => return Err(ClientError::BrowserWithoutFederatedSession),
			_ => {},
		}

		if let Some(lifetime) = self.expires_in {
			if self.session_type == SessionType::Browser {
				return Err(ClientError::CustomLifetimeNotAllowed);
			}
			if !lifetime.is_positive() {
				return Err(ClientError::NonPositiveLifetime);
			}

			policy.check_custom_lifetime(lifetime)?;
		}
		if matches!(&self.mode, GrantMode::AuthorizationCode { code_challenge } if code_challenge.is_empty())
		{
			return Err(ClientError::MissingField { field: "codeChallenge" });
		}

		Ok(ClientId::new(&self.client_id)?)
	}
}

/// Result of [`Broker::create_session`].
#[derive(Clone, Debug)]
pub enum CreatedSession {
	/// Front-channel session awaiting its code exchange.
	Authorization {
		/// Stored session row.
		session: DelegationSession,
		/// One-time `<session id>.<secret>` authorization code.
		code: TokenSecret,
	},
	/// Directly issued session.
	Tokens {
		/// Stored session row.
		session: DelegationSession,
		/// First token pair.
		tokens: TokenResponse,
	},
}
impl CreatedSession {
	/// Stored session row.
	pub fn session(&self) -> &DelegationSession {
		match self {
			Self::Authorization { session, .. } | Self::Tokens { session, .. } => session,
		}
	}
}

impl Broker {
	/// Validates the request, stores a new delegation session, and returns either an
	/// authorization code or the first token pair.
	pub async fn create_session(&self, request: SessionRequest) -> Result<CreatedSession> {
		common::observe(GrantKind::CreateSession, "create_session", async move {
			let policy = self.policy();
			let client_id = request.validate(policy)?;
			let now = self.now();
			let user = self
				.store
				.fetch_user(&request.user_id)
				.await?
				.ok_or(ClientError::UnknownUser)?;
			let pkce = match &request.mode {
				GrantMode::AuthorizationCode { code_challenge } => Some(PkceBinding {
					code_challenge: code_challenge.clone(),
					secret: TokenSecret::generate(AUTHORIZATION_SECRET_LEN),
					used: false,
					expires_at: policy.authorization_expiry(now)?,
				}),
				GrantMode::Direct => None,
			};
			let session = DelegationSession {
				id: SessionId::generate(),
				session_type: request.session_type,
				user_id: request.user_id,
				client_id,
				resource: request.resource,
				scope: request.scope,
				label: request.label,
				created_on: request.created_on,
				created_at: now,
				federated_session_id: request.federated_session_id,
				pkce,
				refresh_rotate: request.refresh_rotate,
				expires_at: policy.session_expiry(now, request.expires_in)?,
				refresh_expires_at: match request.session_type {
					SessionType::Browser => Some(policy.refresh_expiry(now)?),
					SessionType::ApiKey => None,
				},
			};

			self.store.insert_session(session.clone()).await?;

			if let Some(pkce) = &session.pkce {
				let code = OpaqueCredential::encode(&session.id, &pkce.secret);

				return Ok(CreatedSession::Authorization { session, code });
			}

			let refresh = RefreshTokenRecord::issue(session.id.clone(), now);

			if self.store.insert_refresh_token(refresh.clone()).await? != CompareAndSwapOutcome::Updated
			{
				return Err(AuthError::LostRace { operation: "create_session" }.into());
			}

			let tokens = self.issue_tokens(&session, Some(&user), &refresh, now)?;

			Ok(CreatedSession::Tokens { session, tokens })
		})
		.await
	}
}
