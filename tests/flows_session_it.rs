// crates.io
use time::macros;
// self
use middlecat_broker::{
	_preludet::*,
	auth::{FederatedIdentity, SessionStatus, SessionType, UserId},
	codec::VerificationError,
	error::{AuthError, ClientError},
	flows::{self, CreatedSession, SessionRequest, TokenResponse},
	store::SessionStore,
};

const START: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

fn api_key(caller: &FederatedIdentity, label: &str) -> SessionRequest {
	SessionRequest::new(caller.user_id.clone(), SessionType::ApiKey, "cli", TEST_RESOURCE, label)
}

fn browser(caller: &FederatedIdentity, label: &str) -> SessionRequest {
	SessionRequest::new(caller.user_id.clone(), SessionType::Browser, "app", TEST_RESOURCE, label)
		.with_federated_session(caller.federated_session_id.clone())
}

async fn tokens_for(test: &TestBroker, request: SessionRequest) -> TokenResponse {
	match test.broker.create_session(request).await.expect("Session should be created.") {
		CreatedSession::Tokens { tokens, .. } => tokens,
		other => panic!("Expected direct tokens, got {other:?}."),
	}
}

async fn client_error(test: &TestBroker, request: SessionRequest) -> ClientError {
	match test.broker.create_session(request).await {
		Err(Error::Client(e)) => e,
		other => panic!("Expected a client error, got {other:?}."),
	}
}

#[tokio::test]
async fn structural_violations_are_client_errors() {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;

	assert_eq!(
		client_error(&test, api_key(&caller, "CI").with_federated_session(caller.federated_session_id.clone()))
			.await,
		ClientError::ApiKeyWithFederatedSession
	);
	assert_eq!(
		client_error(
			&test,
			SessionRequest::new(caller.user_id.clone(), SessionType::Browser, "app", TEST_RESOURCE, "x"),
		)
		.await,
		ClientError::BrowserWithoutFederatedSession
	);
	assert_eq!(
		client_error(&test, browser(&caller, "Laptop").with_expires_in(Duration::days(1))).await,
		ClientError::CustomLifetimeNotAllowed
	);
	assert_eq!(
		client_error(&test, api_key(&caller, "CI").with_expires_in(Duration::ZERO)).await,
		ClientError::NonPositiveLifetime
	);
	assert_eq!(
		client_error(&test, api_key(&caller, "  ")).await,
		ClientError::MissingField { field: "label" }
	);
	assert_eq!(
		client_error(&test, browser(&caller, "Laptop").with_authorization_code("")).await,
		ClientError::MissingField { field: "codeChallenge" }
	);

	let stranger = FederatedIdentity::new(
		UserId::new("nobody").expect("User id should be valid."),
		caller.federated_session_id.clone(),
	);

	assert_eq!(client_error(&test, api_key(&stranger, "CI")).await, ClientError::UnknownUser);
	assert!(
		test.store.list_sessions(&caller.user_id).await.expect("Listing should succeed.").is_empty(),
		"Rejected requests must not leave sessions behind."
	);
}

#[tokio::test]
async fn api_key_end_to_end() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let created = test
		.broker
		.create_session(
			api_key(&caller, "Nightly export")
				.with_expires_in(Duration::days(365))
				.with_refresh_rotate(false)
				.with_created_on("ci-runner"),
		)
		.await?;
	let session = created.session().clone();

	assert_eq!(session.expires_at, START + Duration::days(365));
	assert_eq!(session.refresh_expires_at, None);
	assert!(session.pkce.is_none());

	let CreatedSession::Tokens { tokens, .. } = created else {
		panic!("API keys created directly must carry tokens.");
	};
	let verifier = test_verifier();
	let claims = verifier.verify_for(tokens.access_token.expose(), TEST_RESOURCE, START)?;

	assert_eq!(claims.client_id, "cli");
	assert_eq!(claims.subject.email, "ada@example.com");

	// Wrong audience is refused at the resource boundary.
	assert!(matches!(
		verifier.verify_for(tokens.access_token.expose(), "https://other.example.com", START),
		Err(VerificationError::ResourceMismatch { .. })
	));
	// So is a token past its expiry.
	assert!(matches!(
		verifier.verify_for(tokens.access_token.expose(), TEST_RESOURCE, START + Duration::seconds(18)),
		Err(VerificationError::Expired { .. })
	));

	test.clock.advance(Duration::days(200));

	let renewed = test.broker.refresh_session(tokens.refresh_token.expose()).await?;

	assert_eq!(renewed.refresh_token, tokens.refresh_token);

	test.broker.kill_session(tokens.refresh_token.expose(), false).await?;

	assert!(matches!(
		test.broker.refresh_session(tokens.refresh_token.expose()).await,
		Err(Error::Auth(AuthError::UnknownRefreshToken))
	));

	Ok(())
}

#[tokio::test]
async fn oauth_mode_returns_a_code_bound_to_the_challenge() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let challenge = flows::compute_pkce_challenge("verifier");
	let created =
		test.broker.create_session(browser(&caller, "Laptop").with_authorization_code(&challenge)).await?;
	let CreatedSession::Authorization { session, code } = created else {
		panic!("OAuth mode must return an authorization code.");
	};
	let (id, secret) = code.expose().split_once('.').expect("Code should be `<id>.<secret>`.");
	let pkce = session.pkce.as_ref().expect("Session should carry its PKCE binding.");

	assert_eq!(id, session.id.to_string());
	assert_eq!(secret.len(), 64);
	assert_eq!(pkce.code_challenge, challenge);
	assert!(!pkce.used);
	assert_eq!(pkce.expires_at, START + Duration::minutes(10));
	assert_eq!(session.refresh_expires_at, Some(START + Duration::hours(72)));

	Ok(())
}

#[tokio::test]
async fn kill_session_is_idempotent() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let tokens = tokens_for(&test, api_key(&caller, "CI")).await;

	test.broker.kill_session("garbage", false).await?;
	test.broker.kill_session("missing.secret", true).await?;
	test.broker.kill_session(tokens.refresh_token.expose(), false).await?;
	test.broker.kill_session(tokens.refresh_token.expose(), false).await?;

	assert!(test.store.list_sessions(&caller.user_id).await?.is_empty());

	Ok(())
}

#[tokio::test]
async fn kill_accepts_rotated_out_tokens() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let first = tokens_for(&test, api_key(&caller, "CI")).await;

	test.broker.refresh_session(first.refresh_token.expose()).await?;
	test.clock.advance(Duration::minutes(5));
	test.broker.kill_session(first.refresh_token.expose(), false).await?;

	assert!(test.store.list_sessions(&caller.user_id).await?.is_empty());

	Ok(())
}

#[tokio::test]
async fn sign_out_cascades_through_the_federated_session() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let laptop = tokens_for(&test, browser(&caller, "Laptop")).await;
	let phone = tokens_for(&test, browser(&caller, "Phone")).await;
	let key = tokens_for(&test, api_key(&caller, "CI")).await;

	// Without sign-out only the named session goes.
	test.broker.kill_session(phone.refresh_token.expose(), false).await?;

	let overview = test.broker.list_sessions(&caller).await?;

	assert_eq!(overview.browser.len(), 1);
	assert_eq!(overview.api_key.len(), 1);

	test.broker.kill_session(laptop.refresh_token.expose(), true).await?;

	let overview = test.broker.list_sessions(&caller).await?;

	assert!(overview.browser.is_empty());
	assert_eq!(overview.api_key.len(), 1);
	assert!(test.broker.refresh_session(key.refresh_token.expose()).await.is_ok());

	Ok(())
}

#[tokio::test]
async fn sweep_removes_expired_sessions_inclusively() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let short = test
		.broker
		.create_session(api_key(&caller, "Short").with_expires_in(Duration::hours(1)))
		.await?;
	let long = test.broker.create_session(api_key(&caller, "Long")).await?;

	test.clock.advance(Duration::minutes(59));

	assert_eq!(test.broker.sweep_expired().await?, 0);

	test.clock.advance(Duration::minutes(1));

	assert_eq!(test.broker.sweep_expired().await?, 1);
	assert!(test.store.fetch_session(&short.session().id).await?.is_none());
	assert!(test.store.fetch_session(&long.session().id).await?.is_some());
	assert_eq!(test.broker.sweep_expired().await?, 0);

	Ok(())
}

#[tokio::test]
async fn overview_groups_and_closes_only_own_sessions() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let ada = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let ada_elsewhere = FederatedIdentity::new(
		ada.user_id.clone(),
		seed_identity(&test.store, "ada", "fed-ada-phone", START + Duration::days(30))
			.await
			.federated_session_id,
	);
	let bob = seed_identity(&test.store, "bob", "fed-bob", START + Duration::days(30)).await;

	tokens_for(&test, browser(&ada, "Laptop")).await;
	tokens_for(&test, browser(&ada_elsewhere, "Phone")).await;
	tokens_for(&test, api_key(&ada, "Yearly").with_expires_in(Duration::days(365))).await;
	tokens_for(&test, api_key(&ada, "Hourly").with_expires_in(Duration::hours(1))).await;

	let bob_key = test.broker.create_session(api_key(&bob, "Bob")).await?.session().id.clone();
	let overview = test.broker.list_sessions(&ada).await?;

	assert_eq!(overview.browser.len(), 2);
	assert_eq!(overview.browser.iter().filter(|summary| summary.current).count(), 1);
	assert_eq!(
		overview.api_key.iter().map(|summary| summary.label.as_str()).collect::<Vec<_>>(),
		["Hourly", "Yearly"]
	);

	let json = serde_json::to_value(&overview)?;

	assert_eq!(json["apiKey"][0]["type"], "apiKey");
	assert_eq!(json["apiKey"][0]["clientId"], "cli");
	assert!(json["apiKey"][0]["refreshExpires"].is_null());
	assert_eq!(json["apiKey"][0]["status"], "active");

	let mut ids = overview.browser.iter().map(|summary| summary.id.clone()).collect::<Vec<_>>();

	ids.push(bob_key.clone());

	assert_eq!(test.broker.close_sessions(&ada, &ids).await?, 2);
	assert!(test.broker.list_sessions(&ada).await?.browser.is_empty());
	assert!(test.store.fetch_session(&bob_key).await?.is_some());

	// Expired sessions are hidden even before the sweep runs.
	test.clock.advance(Duration::hours(1));

	assert!(
		test.broker.list_sessions(&ada).await?.api_key.iter().all(|summary| summary.label != "Hourly")
	);

	Ok(())
}

#[tokio::test]
async fn overview_reports_unredeemed_authorizations() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let verifier = flows::generate_code_verifier();
	let CreatedSession::Authorization { code, .. } = test
		.broker
		.create_session(
			browser(&caller, "Laptop")
				.with_authorization_code(flows::compute_pkce_challenge(&verifier)),
		)
		.await?
	else {
		panic!("OAuth mode must return an authorization code.");
	};
	let overview = test.broker.list_sessions(&caller).await?;

	assert_eq!(overview.browser.len(), 1);
	assert_eq!(overview.browser[0].status, SessionStatus::AwaitingExchange);

	test.broker.exchange_authorization_code(code.expose(), &verifier).await?;

	let overview = test.broker.list_sessions(&caller).await?;

	assert_eq!(overview.browser[0].status, SessionStatus::Active);

	Ok(())
}

#[tokio::test]
async fn oversized_lifetimes_are_rejected_before_anything_is_stored() {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;

	let huge = Duration::seconds(1_000_000_000_000);

	assert_eq!(
		client_error(&test, api_key(&caller, "Forever").with_expires_in(huge)).await,
		ClientError::LifetimeTooLong { max_seconds: 315_360_000 }
	);
	assert_eq!(
		client_error(&test, api_key(&caller, "Forever").with_expires_in(Duration::MAX)).await,
		ClientError::LifetimeTooLong { max_seconds: 315_360_000 }
	);
	assert!(
		test.store.list_sessions(&caller.user_id).await.expect("Listing should succeed.").is_empty()
	);
}

#[tokio::test]
async fn server_tokens_assert_the_caller_identity() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let token = test.broker.issue_server_token(&caller, "https://amcat.example.com").await?;
	let claims = test_verifier().verify_server_token(token.expose(), START)?;

	assert_eq!(claims.server, "https://amcat.example.com");
	assert_eq!(claims.subject.email, "ada@example.com");
	assert_eq!(claims.subject.name, "ada");
	assert_eq!(claims.exp, (START + Duration::seconds(18)).unix_timestamp());
	assert!(matches!(
		test.broker.issue_server_token(&caller, " ").await,
		Err(Error::Client(ClientError::MissingField { field: "server" }))
	));

	let stranger = FederatedIdentity::new(
		UserId::new("nobody").expect("User id should be valid."),
		caller.federated_session_id.clone(),
	);

	assert!(matches!(
		test.broker.issue_server_token(&stranger, "https://amcat.example.com").await,
		Err(Error::Client(ClientError::UnknownUser))
	));

	Ok(())
}
