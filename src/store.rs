//! Storage contracts and built-in store implementations for delegation sessions and refresh
//! tokens.
//!
//! Every mutating method is one atomic unit: implementations must either apply all of its
//! effects (including cascades) or none of them. The grant engine holds no locks of its own and
//! relies on these compare-and-set style operations for correctness under concurrency.

pub mod file;
pub mod memory;

mod state;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{
		DelegationSession, FederatedSession, FederatedSessionId, RefreshTokenId,
		RefreshTokenRecord, SessionId, User, UserId,
	},
};

/// Boxed future returned by [`SessionStore`] implementations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by broker session stores.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Persists or replaces a user row.
	fn save_user(&self, user: User) -> StoreFuture<'_, ()>;

	/// Fetches a user row.
	fn fetch_user<'a>(&'a self, id: &'a UserId) -> StoreFuture<'a, Option<User>>;

	/// Persists or replaces a federated session row.
	fn save_federated_session(&self, session: FederatedSession) -> StoreFuture<'_, ()>;

	/// Deletes a federated session together with every delegation session linked to it and
	/// their refresh tokens. Returns the number of delegation sessions removed.
	fn delete_federated_session<'a>(&'a self, id: &'a FederatedSessionId)
	-> StoreFuture<'a, usize>;

	/// Inserts a new delegation session.
	fn insert_session(&self, session: DelegationSession) -> StoreFuture<'_, ()>;

	/// Point lookup of a delegation session.
	fn fetch_session<'a>(&'a self, id: &'a SessionId)
	-> StoreFuture<'a, Option<DelegationSession>>;

	/// Flips the PKCE `used` flag from `false` to `true`.
	///
	/// Returns [`CompareAndSwapOutcome::Conflict`] when the flag was already set (or the session
	/// carries no PKCE binding).
	fn mark_authorization_used<'a>(
		&'a self,
		id: &'a SessionId,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Inserts a refresh token for an existing session.
	///
	/// Returns [`CompareAndSwapOutcome::Missing`] when the owning session no longer exists.
	fn insert_refresh_token(
		&self,
		record: RefreshTokenRecord,
	) -> StoreFuture<'_, CompareAndSwapOutcome>;

	/// Looks up a refresh token by `(id, secret)` joined with its session and user.
	///
	/// No validity checks are applied; rotated-out tokens are returned too.
	fn fetch_refresh_grant<'a>(
		&'a self,
		id: &'a RefreshTokenId,
		secret: &'a str,
	) -> StoreFuture<'a, Option<RefreshGrant>>;

	/// Marks `current` as rotated out at `instant` and inserts `replacement` in the same step.
	fn rotate_refresh_token<'a>(
		&'a self,
		current: &'a RefreshTokenId,
		replacement: RefreshTokenRecord,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, RotationOutcome>;

	/// Pushes the sliding refresh expiry of a session to `until`.
	fn slide_refresh_expiry<'a>(
		&'a self,
		id: &'a SessionId,
		until: OffsetDateTime,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Deletes a delegation session and its refresh tokens. Returns `false` if it was absent.
	fn delete_session<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, bool>;

	/// Deletes every session whose absolute or sliding expiry is at or before `instant`.
	fn delete_expired(&self, instant: OffsetDateTime) -> StoreFuture<'_, usize>;

	/// Lists a user's delegation sessions ordered by absolute expiry, earliest first.
	fn list_sessions<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<DelegationSession>>;

	/// Deletes the listed sessions that belong to `user`; ids owned by others are ignored.
	fn delete_user_sessions<'a>(
		&'a self,
		user: &'a UserId,
		ids: &'a [SessionId],
	) -> StoreFuture<'a, usize>;
}

/// Result of a conditional update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The precondition held and the row was updated.
	Updated,
	/// The row exists but the precondition did not hold.
	Conflict,
	/// No row matched.
	Missing,
}

/// Result of a refresh-token rotation attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotationOutcome {
	/// The presented token was live; it is now rotated out and the replacement is live.
	Rotated,
	/// The presented token had already been rotated out.
	AlreadyRotated {
		/// Instant the presented token was rotated out.
		invalid_since: OffsetDateTime,
		/// The session's live token, if one exists.
		current: Option<RefreshTokenRecord>,
	},
	/// The token or its session no longer exists.
	Missing,
}

/// A refresh token joined with its owning session and user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshGrant {
	/// The presented refresh token.
	pub token: RefreshTokenRecord,
	/// Owning delegation session.
	pub session: DelegationSession,
	/// Owner of the session, if the federation still knows them.
	pub user: Option<User>,
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
