//! Broker-level error types shared across grants, stores, and the endpoint adapter.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem (keys, policy, HTTP client).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure while talking to a resource server or the broker itself.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Malformed or structurally invalid request; never changes state.
	#[error(transparent)]
	Client(#[from] ClientError),
	/// Credential, PKCE, expiry, or replay failure; may have revoked a session.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// An access token failed verification at a resource-server boundary.
	#[error(transparent)]
	Verification(#[from] crate::codec::VerificationError),
}
impl Error {
	/// Returns `true` for errors a caller caused (client or auth failures).
	pub fn is_caller_fault(&self) -> bool {
		matches!(self, Self::Client(_) | Self::Auth(_))
	}
}

/// Structural request problems. These never reveal whether a session or resource exists.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClientError {
	/// A required field was absent or empty.
	#[error("Required field `{field}` is missing.")]
	MissingField {
		/// Wire name of the missing field.
		field: &'static str,
	},
	/// The session type is not one of `browser` or `apiKey`.
	#[error("Unknown session type `{value}`.")]
	UnknownSessionType {
		/// Value supplied by the caller.
		value: String,
	},
	/// API-key sessions must not be tied to a federated session.
	#[error("API-key sessions cannot be linked to a federated session.")]
	ApiKeyWithFederatedSession,
	/// Browser sessions must be tied to a federated session.
	#[error("Browser sessions require a federated session.")]
	BrowserWithoutFederatedSession,
	/// Custom lifetimes are only accepted for API-key sessions.
	#[error("A custom lifetime is only allowed for API-key sessions.")]
	CustomLifetimeNotAllowed,
	/// The requested lifetime is zero or negative.
	#[error("The requested lifetime must be positive.")]
	NonPositiveLifetime,
	/// The requested lifetime exceeds the configured ceiling or the representable range.
	#[error("The requested lifetime exceeds {max_seconds} seconds.")]
	LifetimeTooLong {
		/// Longest lifetime the broker accepts.
		max_seconds: i64,
	},
	/// The referenced user is unknown to the datastore.
	#[error("The requesting user is unknown.")]
	UnknownUser,
	/// The resource declares a different broker as its trust anchor.
	#[error("The resource does not trust this broker.")]
	TrustAnchorMismatch,
	/// The request body could not be decoded.
	#[error("Request body is malformed: {reason}.")]
	MalformedBody {
		/// Decoder message including the offending path.
		reason: String,
	},
	/// The redirect URI carries no host to derive a client identifier from.
	#[error("Redirect URI has no host.")]
	RedirectWithoutHost,
	/// An identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
}

/// Authentication failures raised by the grant engine.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// The opaque code or token is not of the form `<id>.<secret>`.
	#[error("Credential is malformed.")]
	MalformedCredential,
	/// No session matches the authorization code.
	#[error("Authorization code is unknown.")]
	UnknownAuthorizationCode,
	/// The authorization code failed validation; the session has been revoked.
	#[error("Authorization code was rejected: {reason}.")]
	AuthorizationCodeRejected {
		/// Which check failed.
		reason: &'static str,
	},
	/// No refresh token matches the supplied credential.
	#[error("Refresh token is unknown.")]
	UnknownRefreshToken,
	/// A rotated-out refresh token was reused after the leeway window; the session is gone.
	#[error("Refresh token was replayed; the session has been revoked.")]
	RefreshTokenReplayed,
	/// The session expired before the request was served.
	#[error("Session has expired.")]
	SessionExpired,
	/// A concurrent request won a compare-and-set this request depended on.
	#[error("A concurrent {operation} request won the race.")]
	LostRace {
		/// Operation that lost.
		operation: &'static str,
	},
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// The signing key could not be parsed.
	#[error("Signing key is invalid.")]
	InvalidSigningKey {
		/// Underlying key parsing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// The verification key could not be parsed.
	#[error("Verification key is invalid.")]
	InvalidVerificationKey {
		/// Underlying key parsing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Signing an access token failed.
	#[error("Access token could not be signed.")]
	TokenSigning {
		/// Underlying signing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// The expiry policy violates an invariant.
	#[error("Expiry policy is invalid: {reason}.")]
	InvalidPolicy {
		/// Which invariant was violated.
		reason: &'static str,
	},
	/// Broker configuration could not be parsed.
	#[error("Broker configuration is malformed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A configured URL is invalid.
	#[error("Configured URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, unexpected payloads).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// URL that was being fetched.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The remote answered with a non-success status.
	#[error("{url} answered with HTTP {status}.")]
	UnexpectedStatus {
		/// URL that was being fetched.
		url: String,
		/// HTTP status code.
		status: u16,
	},
	/// The remote returned JSON that does not match the expected shape.
	#[error("{url} returned malformed JSON.")]
	Decode {
		/// URL that was being fetched.
		url: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { url: url.into(), source: Box::new(src) }
	}
}
