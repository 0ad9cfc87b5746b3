//! Simple file-backed [`SessionStore`] for single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{
		DelegationSession, FederatedSession, FederatedSessionId, RefreshTokenId,
		RefreshTokenRecord, SessionId, User, UserId,
	},
	store::{
		CompareAndSwapOutcome, RefreshGrant, RotationOutcome, SessionStore, StoreError,
		StoreFuture,
		state::{Snapshot, StoreState},
	},
};

/// Persists broker rows to a JSON file after each mutation.
///
/// Mutations run against a copy of the state. The copy is written while the write guard is
/// still held and only replaces the live state once it is durable, so a failed write leaves
/// memory and disk in agreement.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<StoreState>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot.into())) })
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &StoreState) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(&Snapshot::from(contents)).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize store snapshot: {e}") }
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
		Ok(f(&self.inner.read()))
	}

	fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let mut staged = guard.clone();
		let outcome = f(&mut staged);

		self.persist_locked(&staged)?;

		*guard = staged;

		Ok(outcome)
	}
}
impl SessionStore for FileStore {
	fn save_user(&self, user: User) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|state| state.save_user(user)) })
	}

	fn fetch_user<'a>(&'a self, id: &'a UserId) -> StoreFuture<'a, Option<User>> {
		Box::pin(async move { self.read(|state| state.fetch_user(id)) })
	}

	fn save_federated_session(&self, session: FederatedSession) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|state| state.save_federated_session(session)) })
	}

	fn delete_federated_session<'a>(
		&'a self,
		id: &'a FederatedSessionId,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move { self.mutate(|state| state.delete_federated_session(id)) })
	}

	fn insert_session(&self, session: DelegationSession) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|state| state.insert_session(session)) })
	}

	fn fetch_session<'a>(
		&'a self,
		id: &'a SessionId,
	) -> StoreFuture<'a, Option<DelegationSession>> {
		Box::pin(async move { self.read(|state| state.fetch_session(id)) })
	}

	fn mark_authorization_used<'a>(
		&'a self,
		id: &'a SessionId,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { self.mutate(|state| state.mark_authorization_used(id)) })
	}

	fn insert_refresh_token(
		&self,
		record: RefreshTokenRecord,
	) -> StoreFuture<'_, CompareAndSwapOutcome> {
		Box::pin(async move { self.mutate(|state| state.insert_refresh_token(record)) })
	}

	fn fetch_refresh_grant<'a>(
		&'a self,
		id: &'a RefreshTokenId,
		secret: &'a str,
	) -> StoreFuture<'a, Option<RefreshGrant>> {
		Box::pin(async move { self.read(|state| state.fetch_refresh_grant(id, secret)) })
	}

	fn rotate_refresh_token<'a>(
		&'a self,
		current: &'a RefreshTokenId,
		replacement: RefreshTokenRecord,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, RotationOutcome> {
		Box::pin(async move {
			self.mutate(|state| state.rotate_refresh_token(current, replacement, instant))
		})
	}

	fn slide_refresh_expiry<'a>(
		&'a self,
		id: &'a SessionId,
		until: OffsetDateTime,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { self.mutate(|state| state.slide_refresh_expiry(id, until)) })
	}

	fn delete_session<'a>(&'a self, id: &'a SessionId) -> StoreFuture<'a, bool> {
		Box::pin(async move { self.mutate(|state| state.delete_session(id)) })
	}

	fn delete_expired(&self, instant: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move { self.mutate(|state| state.delete_expired(instant)) })
	}

	fn list_sessions<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<DelegationSession>> {
		Box::pin(async move { self.read(|state| state.list_sessions(user)) })
	}

	fn delete_user_sessions<'a>(
		&'a self,
		user: &'a UserId,
		ids: &'a [SessionId],
	) -> StoreFuture<'a, usize> {
		Box::pin(async move { self.mutate(|state| state.delete_user_sessions(user, ids)) })
	}
}
