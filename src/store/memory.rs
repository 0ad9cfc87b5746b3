//! Thread-safe in-memory [`SessionStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{
		DelegationSession, FederatedSession, FederatedSessionId, RefreshTokenId,
		RefreshTokenRecord, SessionId, User, UserId,
	},
	store::{
		CompareAndSwapOutcome, RefreshGrant, RotationOutcome, SessionStore, StoreError,
		StoreFuture, state::StoreState,
	},
};

type SharedState = Arc<RwLock<StoreState>>;

/// Thread-safe storage backend that keeps rows in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SharedState);
impl MemoryStore {
	/// Every refresh-token row owned by `session`, oldest first, rotated-out rows included.
	pub fn refresh_tokens(&self, session: &SessionId) -> Vec<RefreshTokenRecord> {
		self.0.read().session_refresh_tokens(session)
	}

	fn read_now<T>(state: &SharedState, f: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
		Ok(f(&state.read()))
	}

	fn write_now<T>(
		state: &SharedState,
		f: impl FnOnce(&mut StoreState) -> T,
	) -> Result<T, StoreError> {
		Ok(f(&mut state.write()))
	}
}
impl SessionStore for MemoryStore {
	fn save_user(&self, user: User) -> StoreFuture<'_, ()> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.save_user(user)) })
	}

	fn fetch_user<'a>(&'a self, id: &'a UserId) -> StoreFuture<'a, Option<User>> {
		Box::pin(async move { Self::read_now(&self.0, |state| state.fetch_user(id)) })
	}

	fn save_federated_session(&self, session: FederatedSession) -> StoreFuture<'_, ()> {
		Box::pin(
			async move { Self::write_now(&self.0, |state| state.save_federated_session(session)) },
		)
	}

	fn delete_federated_session<'a>(
		&'a self,
		id: &'a FederatedSessionId,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.delete_federated_session(id)) })
	}

	fn insert_session(&self, session: DelegationSession) -> StoreFuture<'_, ()> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.insert_session(session)) })
	}

	fn fetch_session<'a>(
		&'a self,
		id: &'a SessionId,
	) -> StoreFuture<'a, Option<DelegationSession>> {
		Box::pin(async move { Self::read_now(&self.0, |state| state.fetch_session(id)) })
	}

	fn mark_authorization_used<'a>(
		&'a self,
		id: &'a SessionId,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.mark_authorization_used(id)) })
	}

	fn insert_refresh_token(
		&self,
		record: RefreshTokenRecord,
	) -> StoreFuture<'_, CompareAndSwapOutcome> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.insert_refresh_token(record)) })
	}

	fn fetch_refresh_grant<'a>(
		&'a self,
		id: &'a RefreshTokenId,
		secret: &'a str,
	) -> StoreFuture<'a, Option<RefreshGrant>> {
		Box::pin(
			async move { Self::read_now(&self.0, |state| state.fetch_refresh_grant(id, secret)) },
		)
	}

	fn rotate_refresh_token<'a>(
		&'a self,
		current: &'a RefreshTokenId,
		replacement: RefreshTokenRecord,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, RotationOutcome> {
		Box::pin(async move {
			Self::write_now(&self.0, |state| {
				state.rotate_refresh_token(current, replacement, instant)
			})
		})
	}

	fn slide_refresh_expiry<'a>(
		&'a self,
		id: &'a SessionId,
		until: OffsetDateTime,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(
			async move { Self::write_now(&self.0, |state| state.slide_refresh_expiry(id, until)) },
		)
	}

	fn delete_session<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, bool> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.delete_session(id)) })
	}

	fn delete_expired(&self, instant: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move { Self::write_now(&self.0, |state| state.delete_expired(instant)) })
	}

	fn list_sessions<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<DelegationSession>> {
		Box::pin(async move { Self::read_now(&self.0, |state| state.list_sessions(user)) })
	}

	fn delete_user_sessions<'a>(
		&'a self,
		user: &'a UserId,
		ids: &'a [SessionId],
	) -> StoreFuture<'a, usize> {
		Box::pin(
			async move { Self::write_now(&self.0, |state| state.delete_user_sessions(user, ids)) },
		)
	}
}
