//! Table state shared by the built-in stores.
//!
//! Each method is meant to run under a single write guard, which is what makes the
//! multi-row operations (rotation, cascades) atomic for [`MemoryStore`](super::MemoryStore)
//! and [`FileStore`](super::FileStore).

// self
use crate::{
	_prelude::*,
	auth::{
		DelegationSession, FederatedSession, FederatedSessionId, RefreshTokenId,
		RefreshTokenRecord, SessionId, User, UserId,
	},
	store::{CompareAndSwapOutcome, RefreshGrant, RotationOutcome},
};

#[derive(Clone, Debug, Default)]
pub(crate) struct StoreState {
	users: HashMap<UserId, User>,
	federated_sessions: HashMap<FederatedSessionId, FederatedSession>,
	sessions: HashMap<SessionId, DelegationSession>,
	refresh_tokens: HashMap<RefreshTokenId, RefreshTokenRecord>,
}
impl StoreState {
	pub(crate) fn save_user(&mut self, user: User) {
		self.users.insert(user.id.clone(), user);
	}

	pub(crate) fn fetch_user(&self, id: &UserId) -> Option<User> {
		self.users.get(id).cloned()
	}

	pub(crate) fn save_federated_session(&mut self, session: FederatedSession) {
		self.federated_sessions.insert(session.id.clone(), session);
	}

	pub(crate) fn delete_federated_session(&mut self, id: &FederatedSessionId) -> usize {
		self.federated_sessions.remove(id);

		self.delete_sessions_where(|session| session.federated_session_id.as_ref() == Some(id))
	}

	pub(crate) fn insert_session(&mut self, session: DelegationSession) {
		self.sessions.insert(session.id.clone(), session);
	}

	pub(crate) fn fetch_session(&self, id: &SessionId) -> Option<DelegationSession> {
		self.sessions.get(id).cloned()
	}

	pub(crate) fn mark_authorization_used(&mut self, id: &SessionId) -> CompareAndSwapOutcome {
		let Some(session) = self.sessions.get_mut(id) else {
			return CompareAndSwapOutcome::Missing;
		};

		match session.pkce.as_mut() {
			Some(pkce) if !pkce.used => {
				pkce.used = true;

				CompareAndSwapOutcome::Updated
			},
			_ => CompareAndSwapOutcome::Conflict,
		}
	}

	pub(crate) fn insert_refresh_token(
		&mut self,
		record: RefreshTokenRecord,
	) -> CompareAndSwapOutcome {
		if !self.sessions.contains_key(&record.session_id) {
			return CompareAndSwapOutcome::Missing;
		}

		self.refresh_tokens.insert(record.id.clone(), record);

		CompareAndSwapOutcome::Updated
	}

	pub(crate) fn fetch_refresh_grant(
		&self,
		id: &RefreshTokenId,
		secret: &str,
	) -> Option<RefreshGrant> {
		let token = self.refresh_tokens.get(id).filter(|token| token.secret.matches(secret))?;
		let session = self.sessions.get(&token.session_id)?;

		Some(RefreshGrant {
			token: token.clone(),
			session: session.clone(),
			user: self.users.get(&session.user_id).cloned(),
		})
	}

	pub(crate) fn session_refresh_tokens(&self, session: &SessionId) -> Vec<RefreshTokenRecord> {
		let mut tokens = self
			.refresh_tokens
			.values()
			.filter(|token| &token.session_id == session)
			.cloned()
			.collect::<Vec<_>>();

		tokens.sort_by_key(|token| token.created_at);

		tokens
	}

	pub(crate) fn rotate_refresh_token(
		&mut self,
		current: &RefreshTokenId,
		replacement: RefreshTokenRecord,
		instant: OffsetDateTime,
	) -> RotationOutcome {
		let Some(token) = self.refresh_tokens.get(current) else {
			return RotationOutcome::Missing;
		};
		let session_id = token.session_id.clone();

		if !self.sessions.contains_key(&session_id) || replacement.session_id != session_id {
			return RotationOutcome::Missing;
		}
		if let Some(invalid_since) = token.invalid_since {
			return RotationOutcome::AlreadyRotated {
				invalid_since,
				current: self.live_token(&session_id),
			};
		}
		if let Some(token) = self.refresh_tokens.get_mut(current) {
			token.invalidate(instant);
		}

		self.refresh_tokens.insert(replacement.id.clone(), replacement);

		RotationOutcome::Rotated
	}

	pub(crate) fn slide_refresh_expiry(
		&mut self,
		id: &SessionId,
		until: OffsetDateTime,
	) -> CompareAndSwapOutcome {
		match self.sessions.get_mut(id) {
			Some(session) if session.is_browser() => {
				session.refresh_expires_at = Some(until);

				CompareAndSwapOutcome::Updated
			},
			Some(_) => CompareAndSwapOutcome::Conflict,
			None => CompareAndSwapOutcome::Missing,
		}
	}

	pub(crate) fn delete_session(&mut self, id: &SessionId) -> bool {
		self.delete_sessions_where(|session| &session.id == id) > 0
	}

	pub(crate) fn delete_expired(&mut self, instant: OffsetDateTime) -> usize {
		self.delete_sessions_where(|session| session.is_expired_at(instant))
	}

	pub(crate) fn list_sessions(&self, user: &UserId) -> Vec<DelegationSession> {
		let mut sessions = self
			.sessions
			.values()
			.filter(|session| &session.user_id == user)
			.cloned()
			.collect::<Vec<_>>();

		sessions.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));

		sessions
	}

	pub(crate) fn delete_user_sessions(&mut self, user: &UserId, ids: &[SessionId]) -> usize {
		self.delete_sessions_where(|session| &session.user_id == user && ids.contains(&session.id))
	}

	fn live_token(&self, session_id: &SessionId) -> Option<RefreshTokenRecord> {
		self.refresh_tokens
			.values()
			.find(|token| &token.session_id == session_id && token.is_current())
			.cloned()
	}

	fn delete_sessions_where<F>(&mut self, predicate: F) -> usize
	where
		F: Fn(&DelegationSession) -> bool,
	{
		let doomed = self
			.sessions
			.values()
			.filter(|session| predicate(session))
			.map(|session| session.id.clone())
			.collect::<HashSet<_>>();

		if doomed.is_empty() {
			return 0;
		}

		self.sessions.retain(|id, _| !doomed.contains(id));
		self.refresh_tokens.retain(|_, token| !doomed.contains(&token.session_id));

		doomed.len()
	}
}

/// On-disk layout; rows are stored as arrays so keys never need to be strings.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Snapshot {
	users: Vec<User>,
	federated_sessions: Vec<FederatedSession>,
	sessions: Vec<DelegationSession>,
	refresh_tokens: Vec<RefreshTokenRecord>,
}
impl From<Snapshot> for StoreState {
	fn from(snapshot: Snapshot) -> Self {
		Self {
			users: snapshot.users.into_iter().map(|row| (row.id.clone(), row)).collect(),
			federated_sessions: snapshot
				.federated_sessions
				.into_iter()
				.map(|row| (row.id.clone(), row))
				.collect(),
			sessions: snapshot.sessions.into_iter().map(|row| (row.id.clone(), row)).collect(),
			refresh_tokens: snapshot
				.refresh_tokens
				.into_iter()
				.map(|row| (row.id.clone(), row))
				.collect(),
		}
	}
}
impl From<&StoreState> for Snapshot {
	fn from(state: &StoreState) -> Self {
		Self {
			users: state.users.values().cloned().collect(),
			federated_sessions: state.federated_sessions.values().cloned().collect(),
			sessions: state.sessions.values().cloned().collect(),
			refresh_tokens: state.refresh_tokens.values().cloned().collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{ClientId, PkceBinding, SessionType, TokenSecret};

	fn session(id: &str, user: &str, federated: Option<&str>) -> DelegationSession {
		DelegationSession {
			id: SessionId::new(id).expect("Session fixture should be valid."),
			session_type: if federated.is_some() { SessionType::Browser } else { SessionType::ApiKey },
			user_id: UserId::new(user).expect("User fixture should be valid."),
			client_id: ClientId::new("app.example.com").expect("Client fixture should be valid."),
			resource: "https://amcat.example.com".into(),
			scope: String::new(),
			label: id.into(),
			created_on: String::new(),
			created_at: macros::datetime!(2025-01-01 00:00 UTC),
			federated_session_id: federated
				.map(|id| FederatedSessionId::new(id).expect("Federated fixture should be valid.")),
			pkce: None,
			refresh_rotate: true,
			expires_at: macros::datetime!(2025-03-01 00:00 UTC),
			refresh_expires_at: None,
		}
	}

	fn token(session: &str) -> RefreshTokenRecord {
		RefreshTokenRecord::issue(
			SessionId::new(session).expect("Session fixture should be valid."),
			macros::datetime!(2025-01-01 00:00 UTC),
		)
	}

	#[test]
	fn rotation_keeps_a_single_live_token() {
		let mut state = StoreState::default();
		let first = token("s1");
		let second = token("s1");
		let third = token("s1");
		let at = macros::datetime!(2025-01-02 00:00 UTC);

		state.insert_session(session("s1", "u1", None));

		assert_eq!(state.insert_refresh_token(first.clone()), CompareAndSwapOutcome::Updated);
		assert_eq!(
			state.rotate_refresh_token(&first.id, second.clone(), at),
			RotationOutcome::Rotated
		);
		assert_eq!(
			state.rotate_refresh_token(&first.id, third, at),
			RotationOutcome::AlreadyRotated { invalid_since: at, current: Some(second) }
		);
		assert_eq!(state.refresh_tokens.values().filter(|token| token.is_current()).count(), 1);
	}

	#[test]
	fn refresh_grants_require_the_matching_secret() {
		let mut state = StoreState::default();
		let record = token("s1");

		state.insert_session(session("s1", "u1", None));
		state.insert_refresh_token(record.clone());

		assert!(state.fetch_refresh_grant(&record.id, "wrong").is_none());

		let grant = state
			.fetch_refresh_grant(&record.id, record.secret.expose())
			.expect("Grant should be found.");

		assert_eq!(grant.session.id, record.session_id);
		assert!(grant.user.is_none());
	}

	#[test]
	fn authorization_flag_flips_once() {
		let mut state = StoreState::default();
		let id = SessionId::new("s1").expect("Session fixture should be valid.");
		let mut pending = session("s1", "u1", None);

		pending.pkce = Some(PkceBinding {
			code_challenge: "challenge".into(),
			secret: TokenSecret::new("secret"),
			used: false,
			expires_at: macros::datetime!(2025-01-01 00:10 UTC),
		});
		state.insert_session(pending);

		assert_eq!(state.mark_authorization_used(&id), CompareAndSwapOutcome::Updated);
		assert_eq!(state.mark_authorization_used(&id), CompareAndSwapOutcome::Conflict);
		assert_eq!(
			state.mark_authorization_used(
				&SessionId::new("s2").expect("Session fixture should be valid.")
			),
			CompareAndSwapOutcome::Missing
		);
	}

	#[test]
	fn federated_sign_out_cascades_to_tokens() {
		let mut state = StoreState::default();
		let federated = FederatedSessionId::new("fed-1").expect("Federated fixture should be valid.");

		state.insert_session(session("s1", "u1", Some("fed-1")));
		state.insert_session(session("s2", "u1", Some("fed-1")));
		state.insert_session(session("s3", "u1", None));
		state.insert_refresh_token(token("s1"));
		state.insert_refresh_token(token("s3"));

		assert_eq!(state.delete_federated_session(&federated), 2);
		assert_eq!(state.sessions.len(), 1);
		assert_eq!(state.refresh_tokens.len(), 1);
		assert!(state.insert_refresh_token(token("s1")) == CompareAndSwapOutcome::Missing);
	}

	#[test]
	fn closing_sessions_is_scoped_to_the_owner() {
		let mut state = StoreState::default();
		let owner = UserId::new("u1").expect("User fixture should be valid.");
		let ids = ["s1", "s2"]
			.map(|id| SessionId::new(id).expect("Session fixture should be valid."));

		state.insert_session(session("s1", "u1", None));
		state.insert_session(session("s2", "u2", None));

		assert_eq!(state.delete_user_sessions(&owner, &ids), 1);
		assert!(state.fetch_session(&ids[1]).is_some());
	}
}
