//! Refresh-token rows and their lifecycle helpers.

// self
use crate::{
	_prelude::*,
	auth::{OpaqueCredential, RefreshTokenId, SessionId, TokenSecret},
};

const REFRESH_SECRET_LEN: usize = 64;

/// Current lifecycle status for a refresh-token row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshTokenStatus {
	/// The row is the session's live token.
	Current,
	/// The row was rotated out but is still inside the duplicate-request leeway.
	Superseded,
	/// The row was rotated out longer ago than the leeway; presenting it is a replay.
	Replayed,
}

/// A refresh token owned by a delegation session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
	/// Row identifier; the first half of the opaque token.
	pub id: RefreshTokenId,
	/// Secret half of the opaque token.
	pub secret: TokenSecret,
	/// Owning delegation session.
	pub session_id: SessionId,
	/// Instant the row was rotated out; `None` while it is the live token.
	pub invalid_since: Option<OffsetDateTime>,
	/// Creation instant.
	pub created_at: OffsetDateTime,
}
impl RefreshTokenRecord {
	/// Mints a fresh live token for the session.
	pub fn issue(session_id: SessionId, instant: OffsetDateTime) -> Self {
		Self {
			id: RefreshTokenId::generate(),
			secret: TokenSecret::generate(REFRESH_SECRET_LEN),
			session_id,
			invalid_since: None,
			created_at: instant,
		}
	}

	/// Returns the opaque `<id>.<secret>` form handed to clients.
	pub fn opaque(&self) -> TokenSecret {
		OpaqueCredential::encode(&self.id, &self.secret)
	}

	/// Computes the status at `instant` given the replay leeway.
	pub fn status_at(&self, instant: OffsetDateTime, leeway: Duration) -> RefreshTokenStatus {
		match self.invalid_since {
			None => RefreshTokenStatus::Current,
			Some(since) if instant - since > leeway => RefreshTokenStatus::Replayed,
			Some(_) => RefreshTokenStatus::Superseded,
		}
	}

	/// Returns `true` while the row is the live token.
	pub fn is_current(&self) -> bool {
		self.invalid_since.is_none()
	}

	/// Marks the row as rotated out, keeping the earliest instant if already set.
	pub fn invalidate(&mut self, instant: OffsetDateTime) {
		self.invalid_since.get_or_insert(instant);
	}
}
impl Debug for RefreshTokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshTokenRecord")
			.field("id", &self.id)
			.field("secret", &"<redacted>")
			.field("session_id", &self.session_id)
			.field("invalid_since", &self.invalid_since)
			.field("created_at", &self.created_at)
			.finish()
	}
}
