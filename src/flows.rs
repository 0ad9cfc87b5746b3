//! Grant engine: session creation, code and refresh exchanges, kill-session, server tokens,
//! and the expiry sweep, orchestrated by the [`Broker`] facade.

pub mod auth_code;
pub mod common;
pub mod kill;
pub mod overview;
pub mod refresh;
pub mod server_token;
pub mod session;
pub mod sweep;

pub use common::*;
pub use overview::*;
pub use refresh::*;
pub use session::*;

// self
use crate::{
	_prelude::*,
	codec::TokenSigner,
	error::ConfigError,
	policy::{Clock, ExpiryPolicy, SystemClock},
	store::SessionStore,
};

/// Deployment settings for a broker instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
	/// Public origin of the broker; stamped into every access token.
	pub issuer: Url,
	/// Lifetimes and tolerances.
	#[serde(default)]
	pub policy: ExpiryPolicy,
}
impl BrokerConfig {
	/// Creates a config with the default policy.
	pub fn new(issuer: Url) -> Self {
		Self { issuer, policy: ExpiryPolicy::default() }
	}

	/// Parses the issuer from a string.
	pub fn from_issuer(issuer: &str) -> Result<Self, ConfigError> {
		let issuer = Url::parse(issuer).map_err(|source| ConfigError::InvalidUrl { source })?;

		Ok(Self::new(issuer))
	}

	/// Overrides the expiry policy.
	pub fn with_policy(mut self, policy: ExpiryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.policy.validate()?;

		Ok(config)
	}

	/// Issuer as it appears in the `middlecat` claim (no trailing slash).
	pub fn issuer_claim(&self) -> &str {
		self.issuer.as_str().trim_end_matches('/')
	}
}

/// Coordinates every grant against one session store and signing key.
///
/// The broker holds no per-session locks. Each mutation is delegated to a single atomic
/// [`SessionStore`] call, so any number of broker instances can share one store.
#[derive(Clone)]
pub struct Broker {
	/// Session store implementation that persists sessions and refresh tokens.
	pub store: Arc<dyn SessionStore>,
	/// Access-token signer.
	pub signer: Arc<TokenSigner>,
	/// Issuer and expiry policy.
	pub config: BrokerConfig,
	/// Shared metrics recorder for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	clock: Arc<dyn Clock>,
}
impl Broker {
	/// Creates a broker after validating the configured policy.
	pub fn new(
		store: Arc<dyn SessionStore>,
		signer: impl Into<Arc<TokenSigner>>,
		config: BrokerConfig,
	) -> Result<Self, ConfigError> {
		config.policy.validate()?;

		Ok(Self {
			store,
			signer: signer.into(),
			config,
			refresh_metrics: Default::default(),
			clock: Arc::new(SystemClock),
		})
	}

	/// Replaces the wall clock, typically with a [`ManualClock`](crate::policy::ManualClock).
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Active expiry policy.
	pub fn policy(&self) -> &ExpiryPolicy {
		&self.config.policy
	}

	/// Current instant according to the configured clock.
	pub fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("issuer", &self.config.issuer.as_str())
			.field("policy", &self.config.policy)
			.field("signer", &self.signer)
			.field("clock", &self.clock)
			.finish()
	}
}
