//! `<id>.<secret>` encoding shared by authorization codes and refresh tokens.

// self
use crate::{_prelude::*, auth::TokenSecret, error::AuthError};

const SEPARATOR: char = '.';

/// Borrowed view over an opaque `<id>.<secret>` credential.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OpaqueCredential<'a> {
	/// Row identifier half.
	pub id: &'a str,
	/// Secret half.
	pub secret: &'a str,
}
impl<'a> OpaqueCredential<'a> {
	/// Splits a raw credential on the first separator; both halves must be non-empty.
	pub fn parse(raw: &'a str) -> Result<Self, AuthError> {
		match raw.split_once(SEPARATOR) {
			Some((id, secret)) if !id.is_empty() && !secret.is_empty() => Ok(Self { id, secret }),
			_ => Err(AuthError::MalformedCredential),
		}
	}

	/// Joins an identifier and a secret into the opaque wire form.
	pub fn encode(id: &str, secret: &TokenSecret) -> TokenSecret {
		TokenSecret::new(format!("{id}{SEPARATOR}{}", secret.expose()))
	}
}
impl Debug for OpaqueCredential<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OpaqueCredential").field("id", &self.id).field("secret", &"<redacted>").finish()
	}
}
