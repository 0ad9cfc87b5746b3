//! Delegated-access token broker for AmCAT resource servers.
//!
//! Sessions start with a PKCE authorization code (or direct issuance for API keys), hand out
//! short-lived RS256 access tokens, and renew through rotating refresh tokens whose reuse
//! revokes the whole session. All state lives behind a compare-and-swap session store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod policy;
pub mod store;

#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{FederatedIdentity, FederatedSession, FederatedSessionId, User, UserId},
		codec::{TokenSigner, TokenVerifier},
		flows::{Broker, BrokerConfig},
		policy::ManualClock,
		store::{MemoryStore, SessionStore},
	};

	/// Issuer used by every test broker.
	pub const TEST_ISSUER: &str = "https://middlecat.example.com";
	/// Resource server used by test sessions.
	pub const TEST_RESOURCE: &str = "https://amcat.example.com";
	/// Private half of the test keypair.
	pub const TEST_PRIVATE_KEY: &str = include_str!("../tests/fixtures/broker_private.pem");
	/// Public half of the test keypair.
	pub const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/broker_public.pem");

	/// Broker, store, and clock wired together for a test.
	#[derive(Debug)]
	pub struct TestBroker {
		/// Broker under test.
		pub broker: Broker,
		/// Store backing the broker.
		pub store: Arc<MemoryStore>,
		/// Clock driving the broker.
		pub clock: Arc<ManualClock>,
	}

	/// Builds a broker over an in-memory store with its clock frozen at `start`.
	pub fn build_test_broker(start: OffsetDateTime) -> TestBroker {
		let store = Arc::new(MemoryStore::default());
		let clock = Arc::new(ManualClock::new(start));
		let signer = TokenSigner::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes())
			.expect("Test signing key should load.")
			.with_public_key(TEST_PUBLIC_KEY);
		let config = BrokerConfig::from_issuer(TEST_ISSUER).expect("Test issuer should parse.");
		let broker = Broker::new(store.clone(), signer, config)
			.expect("Test broker should build.")
			.with_clock(clock.clone());

		TestBroker { broker, store, clock }
	}

	/// Verifier matching the test signing key.
	pub fn test_verifier() -> TokenVerifier {
		TokenVerifier::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes())
			.expect("Test verification key should load.")
	}

	/// Seeds a user plus a federated session and returns the caller identity.
	pub async fn seed_identity(
		store: &MemoryStore,
		user: &str,
		federated: &str,
		expires_at: OffsetDateTime,
	) -> FederatedIdentity {
		let user_id = UserId::new(user).expect("Test user id should be valid.");
		let federated_id =
			FederatedSessionId::new(federated).expect("Test federated id should be valid.");

		store
			.save_user(
				User::new(user_id.clone())
					.with_email(format!("{user}@example.com"))
					.with_name(user),
			)
			.await
			.expect("Test user should be stored.");
		store
			.save_federated_session(FederatedSession {
				id: federated_id.clone(),
				user_id: user_id.clone(),
				expires_at,
			})
			.await
			.expect("Test federated session should be stored.");

		FederatedIdentity::new(user_id, federated_id)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use jsonwebtoken;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
