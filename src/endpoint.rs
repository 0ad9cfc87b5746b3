//! Transport-agnostic endpoint adapter.
//!
//! Each handler takes a raw JSON body, drives the grant engine, and returns a status code
//! plus JSON body for whatever HTTP framework hosts the broker. Status mapping:
//!
//! | Error                                  | Status |
//! |----------------------------------------|--------|
//! | [`ClientError`]                        | 404    |
//! | [`AuthError`](crate::error::AuthError) | 401    |
//! | missing federated caller               | 403    |
//! | storage, config, transport             | 500    |
//!
//! `kill_session` always answers 201 unless the store itself fails, even when the body
//! carries no usable refresh token.

// crates.io
use serde::{Deserializer, de::DeserializeOwned};
use serde_json::{Value, json};
use woothee::parser::Parser;
// self
use crate::{
	_prelude::*,
	auth::{FederatedIdentity, SessionType},
	error::ClientError,
	flows::{Broker, CreatedSession, SessionRequest},
	http::{BrokerConfiguration, ResourceConfig},
};

/// Status code plus JSON body produced by a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointResponse {
	/// HTTP status code.
	pub status: u16,
	/// JSON payload.
	pub body: Value,
}
impl EndpointResponse {
	fn json(status: u16, body: impl Serialize) -> Self {
		match serde_json::to_value(body) {
			Ok(body) => Self { status, body },
			Err(_) => Self::message(500, "Response could not be encoded"),
		}
	}

	fn message(status: u16, message: &str) -> Self {
		Self { status, body: json!({ "message": message }) }
	}

	fn from_error(e: &Error) -> Self {
		match e {
			Error::Auth(_) => Self::message(401, &e.to_string()),
			_ if e.is_caller_fault() => Self::message(404, &e.to_string()),
			_ => Self::message(500, "Internal error"),
		}
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Token endpoint request, discriminated by `grant_type`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum TokenRequest {
	/// Authorization code + PKCE exchange.
	AuthorizationCode {
		/// `<session id>.<secret>` code.
		code: String,
		/// PKCE verifier.
		code_verifier: String,
	},
	/// Refresh exchange.
	RefreshToken {
		/// `<token id>.<secret>` refresh token.
		refresh_token: String,
	},
	/// Logout. Missing or mistyped fields fall back to defaults so the request is always
	/// acknowledged.
	KillSession {
		/// Refresh token identifying the session.
		#[serde(default, deserialize_with = "lenient_string")]
		refresh_token: String,
		/// Also end the linked federated session; accepts `true` or `"true"`.
		#[serde(default, deserialize_with = "lenient_flag")]
		sign_out: bool,
	},
}

/// Session-creation request body.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateSessionBody {
	/// Client application identifier.
	pub client_id: String,
	/// Resource server URL.
	pub resource: String,
	/// The resource server's published configuration.
	pub resource_config: Option<ResourceConfig>,
	/// Human-readable label.
	pub label: String,
	/// `browser` or `apiKey`.
	#[serde(rename = "type")]
	pub session_type: String,
	/// Opaque scope string.
	pub scope: String,
	/// Whether refresh tokens rotate (defaults to `true`).
	pub refresh_rotate: Option<bool>,
	/// Custom lifetime in seconds (API keys only).
	pub expires_in: Option<i64>,
	/// PKCE challenge (OAuth mode).
	pub code_challenge: Option<String>,
	/// Client state echoed back with the code (OAuth mode).
	pub state: Option<String>,
	/// Front-channel (default) or direct issuance.
	pub oauth: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationPayload<'a> {
	auth_code: &'a str,
	state: &'a str,
}

#[derive(Debug, Serialize)]
struct ServerTokenPayload<'a> {
	token: &'a str,
}

impl Broker {
	/// Serves the token endpoint. Expired sessions are swept before the request is routed.
	pub async fn handle_token_request(&self, body: &[u8]) -> EndpointResponse {
		if let Err(e) = self.sweep_expired().await {
			return EndpointResponse::from_error(&e);
		}

		let request = match parse_body::<TokenRequest>(body) {
			Ok(request) => request,
			Err(e) => return EndpointResponse::from_error(&Error::from(e)),
		};
		let result = match request {
			TokenRequest::AuthorizationCode { code, code_verifier } => self
				.exchange_authorization_code(&code, &code_verifier)
				.await
				.map(|tokens| EndpointResponse::json(200, tokens)),
			TokenRequest::RefreshToken { refresh_token } => self
				.refresh_session(&refresh_token)
				.await
				.map(|tokens| EndpointResponse::json(200, tokens)),
			TokenRequest::KillSession { refresh_token, sign_out } => self
				.kill_session(&refresh_token, sign_out)
				.await
				.map(|()| EndpointResponse::json(201, json!({}))),
		};

		result.unwrap_or_else(|e| EndpointResponse::from_error(&e))
	}

	/// Serves the session-creation endpoint for an authenticated federated caller.
	///
	/// The session's `created_on` description is derived from the request's `User-Agent`.
	pub async fn handle_session_request(
		&self,
		caller: Option<&FederatedIdentity>,
		user_agent: Option<&str>,
		body: &[u8],
	) -> EndpointResponse {
		let Some(caller) = caller else {
			return EndpointResponse::message(403, "Not signed in");
		};
		let created_on = describe_user_agent(user_agent.unwrap_or_default());

		self.create_session_from_body(caller, created_on, body)
			.await
			.unwrap_or_else(|e| EndpointResponse::from_error(&e))
	}

	/// Serves the server-token endpoint: a signed identity assertion for `server`.
	pub async fn handle_server_token_request(
		&self,
		caller: Option<&FederatedIdentity>,
		server: &str,
	) -> EndpointResponse {
		let Some(caller) = caller else {
			return EndpointResponse::message(403, "Need to be signed in to request a server token");
		};

		match self.issue_server_token(caller, server).await {
			Ok(token) => EndpointResponse::json(200, ServerTokenPayload { token: token.expose() }),
			Err(e) => EndpointResponse::from_error(&e),
		}
	}

	/// Serves the public configuration document.
	pub fn configuration_document(&self) -> EndpointResponse {
		match self.signer.public_key_pem() {
			Some(public_key) => EndpointResponse::json(
				200,
				BrokerConfiguration { public_key: public_key.to_owned() },
			),
			None => EndpointResponse::message(500, "Public key is not configured"),
		}
	}

	async fn create_session_from_body(
		&self,
		caller: &FederatedIdentity,
		created_on: String,
		body: &[u8],
	) -> Result<EndpointResponse> {
		let body = parse_body::<CreateSessionBody>(body)?;

		if !body
			.resource_config
			.as_ref()
			.is_some_and(|config| config.trusts(self.config.issuer_claim()))
		{
			return Err(ClientError::TrustAnchorMismatch.into());
		}

		let session_type = SessionType::from_str(&body.session_type)?;
		let mut request = SessionRequest::new(
			caller.user_id.clone(),
			session_type,
			body.client_id,
			body.resource,
			body.label,
		)
		.with_scope(body.scope)
		.with_created_on(created_on)
		.with_refresh_rotate(body.refresh_rotate.unwrap_or(true));

		if session_type == SessionType::Browser {
			request = request.with_federated_session(caller.federated_session_id.clone());
		}
		if let Some(seconds) = body.expires_in {
			request = request.with_expires_in(Duration::seconds(seconds));
		}

		let oauth = body.oauth.unwrap_or(true);
		let state = body.state.unwrap_or_default();

		if oauth {
			if state.is_empty() {
				return Err(ClientError::MissingField { field: "state" }.into());
			}

			request = request.with_authorization_code(body.code_challenge.unwrap_or_default());
		}

		match self.create_session(request).await? {
			CreatedSession::Authorization { code, .. } => Ok(EndpointResponse::json(
				200,
				AuthorizationPayload { auth_code: code.expose(), state: &state },
			)),
			CreatedSession::Tokens { tokens, .. } => Ok(EndpointResponse::json(200, tokens)),
		}
	}
}

const UNKNOWN_AGENT_PART: &str = "UNKNOWN";

/// Summarizes a `User-Agent` header as `"<vendor>, <os>, <browser>"`, skipping unknown parts.
pub fn describe_user_agent(user_agent: &str) -> String {
	let Some(parsed) = Parser::new().parse(user_agent) else {
		return String::new();
	};

	[&*parsed.vendor, &*parsed.os, &*parsed.name]
		.into_iter()
		.filter(|part| !part.is_empty() && *part != UNKNOWN_AGENT_PART)
		.collect::<Vec<_>>()
		.join(", ")
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::String(value) => value,
		_ => String::new(),
	})
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::Bool(flag) => flag,
		Value::String(flag) => flag == "true",
		_ => false,
	})
}

fn parse_body<T>(body: &[u8]) -> Result<T, ClientError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
		.map_err(|e| ClientError::MalformedBody { reason: e.to_string() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::AuthError;

	#[test]
	fn token_requests_route_on_grant_type() {
		let kill: TokenRequest =
			parse_body(br#"{"grant_type":"kill_session","refresh_token":"a.b"}"#)
				.expect("Kill request should parse.");

		assert_eq!(kill, TokenRequest::KillSession { refresh_token: "a.b".into(), sign_out: false });
		assert!(matches!(
			parse_body::<TokenRequest>(br#"{"grant_type":"password"}"#),
			Err(ClientError::MalformedBody { .. })
		));
		assert!(parse_body::<TokenRequest>(b"not json").is_err());
	}

	#[test]
	fn kill_requests_tolerate_missing_and_mistyped_fields() {
		let cases: [(&[u8], &str, bool); 4] = [
			(br#"{"grant_type":"kill_session"}"#, "", false),
			(br#"{"grant_type":"kill_session","refresh_token":"a.b","sign_out":"true"}"#, "a.b", true),
			(br#"{"grant_type":"kill_session","refresh_token":7,"sign_out":"yes"}"#, "", false),
			(br#"{"grant_type":"kill_session","refresh_token":null,"sign_out":true}"#, "", true),
		];

		for (raw, refresh_token, sign_out) in cases {
			let parsed: TokenRequest = parse_body(raw).expect("Kill request should parse.");

			assert_eq!(
				parsed,
				TokenRequest::KillSession { refresh_token: refresh_token.into(), sign_out }
			);
		}
	}

	#[test]
	fn user_agents_are_summarized() {
		let chrome = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
			Chrome/120.0.0.0 Safari/537.36";

		assert_eq!(describe_user_agent(chrome), "Google, Linux, Chrome");
		assert_eq!(describe_user_agent(""), "");
	}

	#[test]
	fn errors_map_to_statuses() {
		let client: Error = ClientError::UnknownUser.into();
		let auth: Error = AuthError::RefreshTokenReplayed.into();
		let store: Error = crate::store::StoreError::Backend { message: "down".into() }.into();

		assert_eq!(EndpointResponse::from_error(&client).status, 404);
		assert_eq!(EndpointResponse::from_error(&auth).status, 401);
		assert_eq!(EndpointResponse::from_error(&store).status, 500);
		assert_eq!(EndpointResponse::from_error(&store).body["message"], "Internal error");

		let too_long: Error = ClientError::LifetimeTooLong { max_seconds: 60 }.into();

		assert_eq!(EndpointResponse::from_error(&too_long).status, 404);
	}
}
