//! Records owned by the identity federation that the broker reads (and cascades through).

// self
use crate::{
	_prelude::*,
	auth::{FederatedSessionId, UserId},
};

/// A user as known to the identity federation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	/// Stable user identifier.
	pub id: UserId,
	/// Primary e-mail address, when the provider shared one.
	pub email: Option<String>,
	/// Display name.
	pub name: Option<String>,
	/// Avatar URL.
	pub image: Option<String>,
}
impl User {
	/// Creates a user with no profile details.
	pub fn new(id: UserId) -> Self {
		Self { id, email: None, name: None, image: None }
	}

	/// Sets the e-mail address.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}

	/// Sets the display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Sets the avatar URL.
	pub fn with_image(mut self, image: impl Into<String>) -> Self {
		self.image = Some(image.into());

		self
	}
}

/// A signed-in session held by the identity federation.
///
/// Deleting it (sign-out) removes every browser delegation session linked to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedSession {
	/// Federated session identifier.
	pub id: FederatedSessionId,
	/// Owner of the session.
	pub user_id: UserId,
	/// Instant the federation stops honouring the session.
	pub expires_at: OffsetDateTime,
}

/// The authenticated caller of a session-creation request, as resolved by the federation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedIdentity {
	/// Authenticated user.
	pub user_id: UserId,
	/// Federated session the request was made under.
	pub federated_session_id: FederatedSessionId,
}
impl FederatedIdentity {
	/// Creates an identity for the given user and federated session.
	pub fn new(user_id: UserId, federated_session_id: FederatedSessionId) -> Self {
		Self { user_id, federated_session_id }
	}
}
