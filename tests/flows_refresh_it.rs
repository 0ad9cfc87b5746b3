// crates.io
use time::macros;
// self
use middlecat_broker::{
	_preludet::*,
	auth::{FederatedIdentity, SessionId, SessionType},
	error::AuthError,
	flows::{self, CreatedSession, RefreshCounts, SessionRequest, TokenResponse},
	store::SessionStore,
};

const START: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

async fn api_key_session(
	test: &TestBroker,
	caller: &FederatedIdentity,
	rotate: bool,
) -> (SessionId, TokenResponse) {
	let request =
		SessionRequest::new(caller.user_id.clone(), SessionType::ApiKey, "cli", TEST_RESOURCE, "CI")
			.with_refresh_rotate(rotate);

	match test.broker.create_session(request).await.expect("API key should be created.") {
		CreatedSession::Tokens { session, tokens } => (session.id, tokens),
		other => panic!("Expected direct tokens, got {other:?}."),
	}
}

async fn browser_session(test: &TestBroker, caller: &FederatedIdentity) -> (SessionId, TokenResponse) {
	let verifier = flows::generate_code_verifier();
	let request = SessionRequest::new(
		caller.user_id.clone(),
		SessionType::Browser,
		"app.example.com",
		TEST_RESOURCE,
		"Laptop",
	)
	.with_federated_session(caller.federated_session_id.clone())
	.with_authorization_code(flows::compute_pkce_challenge(&verifier));
	let CreatedSession::Authorization { session, code } =
		test.broker.create_session(request).await.expect("Browser session should be created.")
	else {
		panic!("Expected an authorization code.");
	};
	let tokens = test
		.broker
		.exchange_authorization_code(code.expose(), &verifier)
		.await
		.expect("Code exchange should succeed.");

	(session.id, tokens)
}

#[tokio::test]
async fn rotation_replaces_the_token_and_replay_revokes() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (session_id, first) = api_key_session(&test, &caller, true).await;

	test.clock.advance(Duration::seconds(10));

	let second = test.broker.refresh_session(first.refresh_token.expose()).await?;

	assert_ne!(second.refresh_token, first.refresh_token);
	assert!(second.refresh_rotate);

	test.clock.advance(Duration::seconds(10));

	let third = test.broker.refresh_session(second.refresh_token.expose()).await?;

	assert_ne!(third.refresh_token, second.refresh_token);

	// `first` was rotated out ten seconds ago, well past the leeway.
	let replay = test.broker.refresh_session(first.refresh_token.expose()).await;

	assert!(matches!(replay, Err(Error::Auth(AuthError::RefreshTokenReplayed))));
	assert!(test.store.fetch_session(&session_id).await?.is_none());

	let after = test.broker.refresh_session(third.refresh_token.expose()).await;

	assert!(matches!(after, Err(Error::Auth(AuthError::UnknownRefreshToken))));
	assert_eq!(
		test.broker.refresh_metrics.snapshot(),
		RefreshCounts { attempts: 4, successes: 2, failures: 2, duplicates: 0, replays: 1 }
	);

	Ok(())
}

#[tokio::test]
async fn duplicate_inside_leeway_returns_the_live_token() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (session_id, first) = api_key_session(&test, &caller, true).await;
	let second = test.broker.refresh_session(first.refresh_token.expose()).await?;

	test.clock.advance(Duration::seconds(1));

	let duplicate = test.broker.refresh_session(first.refresh_token.expose()).await?;

	assert_eq!(duplicate.refresh_token, second.refresh_token);
	assert_eq!(test.broker.refresh_metrics.duplicates(), 1);

	// Exactly at the leeway boundary the request still counts as a duplicate.
	test.clock.advance(Duration::seconds(1));
	test.broker.refresh_session(first.refresh_token.expose()).await?;
	test.clock.advance(Duration::seconds(1));

	let replay = test.broker.refresh_session(first.refresh_token.expose()).await;

	assert!(matches!(replay, Err(Error::Auth(AuthError::RefreshTokenReplayed))));
	assert!(test.store.fetch_session(&session_id).await?.is_none());

	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_refreshes_share_one_live_token() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (session_id, first) = api_key_session(&test, &caller, true).await;
	let spawn_refresh = |broker: flows::Broker, token: String| {
		tokio::spawn(async move { broker.refresh_session(&token).await })
	};
	let (left, right) = tokio::join!(
		spawn_refresh(test.broker.clone(), first.refresh_token.expose().to_owned()),
		spawn_refresh(test.broker.clone(), first.refresh_token.expose().to_owned()),
	);
	let (left, right) = (left??, right??);

	assert_eq!(left.refresh_token, right.refresh_token);
	assert_ne!(left.refresh_token, first.refresh_token);

	let rows = test.store.refresh_tokens(&session_id);

	assert_eq!(rows.len(), 2);
	assert_eq!(rows.iter().filter(|row| row.is_current()).count(), 1);
	assert_eq!(
		test.broker.refresh_metrics.snapshot(),
		RefreshCounts { attempts: 2, successes: 2, failures: 0, duplicates: 1, replays: 0 }
	);

	// The shared token keeps working afterwards.
	test.broker.refresh_session(left.refresh_token.expose()).await?;

	Ok(())
}

#[tokio::test]
async fn static_refresh_tokens_are_reused() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (_, first) = api_key_session(&test, &caller, false).await;

	assert!(!first.refresh_rotate);

	for _ in 0..3 {
		test.clock.advance(Duration::minutes(5));

		let next = test.broker.refresh_session(first.refresh_token.expose()).await?;

		assert_eq!(next.refresh_token, first.refresh_token);
		assert!(!next.refresh_rotate);
	}

	Ok(())
}

#[tokio::test]
async fn browser_refresh_slides_the_window() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (session_id, tokens) = browser_session(&test, &caller).await;
	let session = test.store.fetch_session(&session_id).await?.expect("Session should exist.");

	assert_eq!(session.refresh_expires_at, Some(START + Duration::hours(72)));

	test.clock.advance(Duration::hours(71));

	let tokens = test.broker.refresh_session(tokens.refresh_token.expose()).await?;
	let session = test.store.fetch_session(&session_id).await?.expect("Session should exist.");

	assert_eq!(session.refresh_expires_at, Some(START + Duration::hours(71 + 72)));

	// Idle past the slid window.
	test.clock.advance(Duration::hours(72));

	let expired = test.broker.refresh_session(tokens.refresh_token.expose()).await;

	assert!(matches!(expired, Err(Error::Auth(AuthError::SessionExpired))));
	assert!(test.store.fetch_session(&session_id).await?.is_none());

	Ok(())
}

#[tokio::test]
async fn api_keys_do_not_slide() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (session_id, tokens) = api_key_session(&test, &caller, false).await;

	test.clock.advance(Duration::days(59));
	test.broker.refresh_session(tokens.refresh_token.expose()).await?;

	let session = test.store.fetch_session(&session_id).await?.expect("Session should exist.");

	assert_eq!(session.refresh_expires_at, None);
	assert_eq!(session.expires_at, START + Duration::days(60));

	test.clock.advance(Duration::days(1));

	let expired = test.broker.refresh_session(tokens.refresh_token.expose()).await;

	assert!(matches!(expired, Err(Error::Auth(AuthError::SessionExpired))));

	Ok(())
}

#[tokio::test]
async fn refreshed_access_tokens_carry_fresh_expiry() -> color_eyre::Result<()> {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (_, first) = api_key_session(&test, &caller, true).await;

	test.clock.advance(Duration::minutes(1));

	let second = test.broker.refresh_session(first.refresh_token.expose()).await?;
	let now = test.broker.now();
	let claims = test_verifier().verify_for(second.access_token.expose(), TEST_RESOURCE, now)?;

	assert_eq!(claims.exp, (now + Duration::seconds(18)).unix_timestamp());
	assert_eq!(claims.subject.name, "ada");

	Ok(())
}

#[tokio::test]
async fn malformed_and_forged_tokens_are_unknown() {
	let test = build_test_broker(START);
	let caller = seed_identity(&test.store, "ada", "fed-ada", START + Duration::days(30)).await;
	let (_, tokens) = api_key_session(&test, &caller, true).await;
	let (id, _) = tokens.refresh_token.expose().split_once('.').expect("Token should have an id.");

	assert!(matches!(
		test.broker.refresh_session("garbage").await,
		Err(Error::Auth(AuthError::MalformedCredential))
	));
	assert!(matches!(
		test.broker.refresh_session(&format!("{id}.forged")).await,
		Err(Error::Auth(AuthError::UnknownRefreshToken))
	));
	// A forged secret must not disturb the real token.
	assert!(test.broker.refresh_session(tokens.refresh_token.expose()).await.is_ok());
}
