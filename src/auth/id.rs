//! Strongly typed identifiers enforced across the broker domain.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, error::ClientError};

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

macro_rules! def_generated_id {
	($name:ident) => {
		impl $name {
			/// Generates a fresh random identifier.
			pub fn generate() -> Self {
				Self(random_id())
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const GENERATED_ID_LEN: usize = 25;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (session, user, client, ...).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (session, user, client, ...).
		kind: &'static str,
	},
	/// Opaque-credential identifiers cannot contain the `.` separator.
	#[error("{kind} identifier contains the credential separator.")]
	ContainsSeparator {
		/// Kind of identifier (session, user, client, ...).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (session, user, client, ...).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { SessionId, "Unique identifier for a delegation session.", "Session" }
def_id! { RefreshTokenId, "Unique identifier for a refresh-token row.", "RefreshToken" }
def_id! { UserId, "Identifier for a user owned by the identity federation.", "User" }
def_id! { FederatedSessionId, "Identifier for a federated sign-in session.", "FederatedSession" }
def_id! { ClientId, "Identifier for a client application (usually its redirect host).", "Client" }

def_generated_id! { SessionId }
def_generated_id! { RefreshTokenId }

impl ClientId {
	/// Derives the client identifier from a redirect URI.
	///
	/// Clients do not register with the broker; resource servers decide which clients to trust
	/// by host, so the host (plus an explicit port) doubles as the identifier.
	pub fn from_redirect_uri(redirect_uri: &Url) -> Result<Self, ClientError> {
		let host = redirect_uri.host_str().ok_or(ClientError::RedirectWithoutHost)?;
		let value = match redirect_uri.port() {
			Some(port) => format!("{host}:{port}"),
			None => host.to_owned(),
		};

		Self::new(value).map_err(ClientError::from)
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if matches!(kind, "Session" | "RefreshToken") && view.contains('.') {
		return Err(IdentifierError::ContainsSeparator { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

fn random_id() -> String {
	rand::rng().sample_iter(Alphanumeric).take(GENERATED_ID_LEN).map(char::from).collect()
}
