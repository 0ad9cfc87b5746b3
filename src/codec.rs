//! RS256 access-token codec.
//!
//! The broker signs with the private key; any resource server holding the public key can
//! verify. Resource servers should obtain their [`TokenVerifier`] through a
//! [`PublicKeyCache`] so key fetches are lazy, shared, and refreshed when they go stale.

pub mod key_cache;

pub use key_cache::*;

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
// self
use crate::{_prelude::*, error::ConfigError};

/// Identity fields of the user the token was issued for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
	/// E-mail address, empty when unknown.
	pub email: String,
	/// Display name, empty when unknown.
	pub name: String,
	/// Avatar URL, empty when unknown.
	pub image: String,
}

/// Claims carried by every access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
	/// Client application the session was granted to.
	#[serde(rename = "clientId")]
	pub client_id: String,
	/// Resource server the token is meant for; resource servers must audience-check this.
	pub resource: String,
	/// User identity.
	#[serde(flatten)]
	pub subject: Subject,
	/// Expiry as a Unix timestamp in seconds.
	pub exp: i64,
	/// Issuing broker (origin without trailing slash).
	#[serde(rename = "middlecat")]
	pub issuer: String,
}

/// Claims carried by a server token: the signed-in user's identity asserted to `server`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTokenClaims {
	/// User identity.
	#[serde(flatten)]
	pub subject: Subject,
	/// Server the caller asked the assertion for.
	pub server: String,
	/// Expiry as a Unix timestamp in seconds.
	pub exp: i64,
}

/// Reasons an access token is rejected.
#[derive(Debug, ThisError)]
pub enum VerificationError {
	/// Signature, encoding, or algorithm check failed.
	#[error("Access token is invalid.")]
	Invalid {
		/// Underlying decoding failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// The token was minted for a different resource server.
	#[error("Access token targets `{found}`, expected `{expected}`.")]
	ResourceMismatch {
		/// Resource the verifier serves.
		expected: String,
		/// Resource carried in the token.
		found: String,
	},
	/// The token's `exp` is not in the future.
	#[error("Access token expired at {exp}.")]
	Expired {
		/// Expiry carried in the token.
		exp: i64,
	},
}
impl VerificationError {
	/// Returns `true` when the signature did not match the key.
	pub fn is_signature_failure(&self) -> bool {
		matches!(self, Self::Invalid { source } if matches!(source.kind(), ErrorKind::InvalidSignature))
	}
}

/// Signs access tokens with the broker's private key.
#[derive(Clone)]
pub struct TokenSigner {
	key: EncodingKey,
	header: Header,
	public_key_pem: Option<String>,
}
impl TokenSigner {
	/// Loads an RSA private key in PEM form.
	pub fn from_rsa_pem(private_key: &[u8]) -> Result<Self, ConfigError> {
		let key = EncodingKey::from_rsa_pem(private_key)
			.map_err(|source| ConfigError::InvalidSigningKey { source })?;

		Ok(Self { key, header: Header::new(Algorithm::RS256), public_key_pem: None })
	}

	/// Attaches the matching public key so it can be published to resource servers.
	pub fn with_public_key(mut self, public_key_pem: impl Into<String>) -> Self {
		self.public_key_pem = Some(public_key_pem.into());

		self
	}

	/// Public key PEM to publish, if one was attached.
	pub fn public_key_pem(&self) -> Option<&str> {
		self.public_key_pem.as_deref()
	}

	/// Signs the claims into a compact token.
	pub fn sign<C>(&self, claims: &C) -> Result<String, ConfigError>
	where
		C: Serialize,
	{
		jsonwebtoken::encode(&self.header, claims, &self.key)
			.map_err(|source| ConfigError::TokenSigning { source })
	}
}
impl Debug for TokenSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSigner")
			.field("algorithm", &self.header.alg)
			.field("public_key_set", &self.public_key_pem.is_some())
			.finish()
	}
}

/// Verifies access tokens with the broker's public key.
#[derive(Clone)]
pub struct TokenVerifier {
	key: DecodingKey,
	validation: Validation,
}
impl TokenVerifier {
	/// Loads an RSA public key in PEM form.
	pub fn from_rsa_pem(public_key: &[u8]) -> Result<Self, ConfigError> {
		let key = DecodingKey::from_rsa_pem(public_key)
			.map_err(|source| ConfigError::InvalidVerificationKey { source })?;
		let mut validation = Validation::new(Algorithm::RS256);

		// Expiry is checked against the caller's clock in `verify_for`.
		validation.validate_exp = false;

		Ok(Self { key, validation })
	}

	/// Checks the signature and decodes the claims.
	pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, VerificationError> {
		self.decode(token)
	}

	/// Checks the signature of a server token and enforces its expiry.
	pub fn verify_server_token(
		&self,
		token: &str,
		instant: OffsetDateTime,
	) -> Result<ServerTokenClaims, VerificationError> {
		let claims = self.decode::<ServerTokenClaims>(token)?;

		if claims.exp <= instant.unix_timestamp() {
			return Err(VerificationError::Expired { exp: claims.exp });
		}

		Ok(claims)
	}

	fn decode<C>(&self, token: &str) -> Result<C, VerificationError>
	where
		C: serde::de::DeserializeOwned,
	{
		jsonwebtoken::decode::<C>(token, &self.key, &self.validation)
			.map(|data| data.claims)
			.map_err(|source| VerificationError::Invalid { source })
	}

	/// Verifies the token and enforces the resource-server boundary checks.
	pub fn verify_for(
		&self,
		token: &str,
		expected_resource: &str,
		instant: OffsetDateTime,
	) -> Result<AccessTokenClaims, VerificationError> {
		let claims = self.verify(token)?;

		if claims.resource != expected_resource {
			return Err(VerificationError::ResourceMismatch {
				expected: expected_resource.to_owned(),
				found: claims.resource,
			});
		}
		if claims.exp <= instant.unix_timestamp() {
			return Err(VerificationError::Expired { exp: claims.exp });
		}

		Ok(claims)
	}
}
impl Debug for TokenVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenVerifier").field("algorithms", &self.validation.algorithms).finish()
	}
}
