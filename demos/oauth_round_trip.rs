//! Walks one browser session through the broker's endpoints: session creation with a PKCE
//! challenge, code exchange, refresh, and logout.
//!
//! ```sh
//! cargo run --example oauth_round_trip
//! ```

// std
use std::sync::Arc;
// crates.io
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
// self
use middlecat_broker::{
	auth::{FederatedIdentity, FederatedSession, FederatedSessionId, User, UserId},
	codec::{TokenSigner, TokenVerifier},
	flows::{self, Broker, BrokerConfig},
	store::{MemoryStore, SessionStore},
};

const ISSUER: &str = "https://middlecat.example.com";
const RESOURCE: &str = "https://amcat.example.com";
const PRIVATE_KEY: &str = include_str!("../tests/fixtures/broker_private.pem");
const PUBLIC_KEY: &str = include_str!("../tests/fixtures/broker_public.pem");
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

fn body(value: Value) -> color_eyre::Result<Vec<u8>> {
	Ok(serde_json::to_vec(&value)?)
}

fn field(response: &Value, name: &str) -> color_eyre::Result<String> {
	response[name]
		.as_str()
		.map(ToOwned::to_owned)
		.ok_or_else(|| color_eyre::eyre::eyre!("`{name}` missing from {response}"))
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let store = Arc::new(MemoryStore::default());
	let signer = TokenSigner::from_rsa_pem(PRIVATE_KEY.as_bytes())?.with_public_key(PUBLIC_KEY);
	let broker = Broker::new(store.clone(), signer, BrokerConfig::from_issuer(ISSUER)?)?;
	let user_id = UserId::new("ada")?;
	let federated_id = FederatedSessionId::new("fed-ada")?;

	// The federation normally provides these rows once the user signs in.
	store
		.save_user(User::new(user_id.clone()).with_email("ada@example.com").with_name("Ada"))
		.await?;
	store
		.save_federated_session(FederatedSession {
			id: federated_id.clone(),
			user_id: user_id.clone(),
			expires_at: OffsetDateTime::now_utc() + Duration::days(30),
		})
		.await?;

	let caller = FederatedIdentity::new(user_id, federated_id);
	let verifier = flows::generate_code_verifier();
	let created = broker
		.handle_session_request(
			Some(&caller),
			Some(USER_AGENT),
			&body(json!({
				"clientId": "notebook.example.com",
				"resource": RESOURCE,
				"resourceConfig": { "middlecat_url": ISSUER },
				"label": "Notebook",
				"type": "browser",
				"state": "demo-state",
				"codeChallenge": flows::compute_pkce_challenge(&verifier),
			}))?,
		)
		.await;

	println!("create session -> {} {}", created.status, created.body);

	let tokens = broker
		.handle_token_request(&body(json!({
			"grant_type": "authorization_code",
			"code": field(&created.body, "authCode")?,
			"code_verifier": verifier,
		}))?)
		.await;

	println!("exchange code  -> {}", tokens.status);

	let claims = TokenVerifier::from_rsa_pem(PUBLIC_KEY.as_bytes())?.verify_for(
		&field(&tokens.body, "access_token")?,
		RESOURCE,
		OffsetDateTime::now_utc(),
	)?;

	println!("access token   -> {} for {}", claims.subject.email, claims.resource);

	let refreshed = broker
		.handle_token_request(&body(json!({
			"grant_type": "refresh_token",
			"refresh_token": field(&tokens.body, "refresh_token")?,
		}))?)
		.await;

	println!("refresh        -> {}", refreshed.status);

	let overview = broker.list_sessions(&caller).await?;

	println!("sessions       -> {}", serde_json::to_string_pretty(&overview)?);

	let killed = broker
		.handle_token_request(&body(json!({
			"grant_type": "kill_session",
			"refresh_token": field(&refreshed.body, "refresh_token")?,
			"sign_out": true,
		}))?)
		.await;

	println!("kill session   -> {}", killed.status);

	Ok(())
}
