//! Redacted secret wrapper for authorization secrets, refresh secrets, and minted tokens.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use subtle::ConstantTimeEq;
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Generates a random alphanumeric secret of `len` characters.
	pub fn generate(len: usize) -> Self {
		Self(rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect())
	}

	/// Compares a presented secret in constant time.
	pub fn matches(&self, presented: &str) -> bool {
		self.0.as_bytes().ct_eq(presented.as_bytes()).into()
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
