//! Per-user session listing and closing for account dashboards.

// self
use crate::{
	_prelude::*,
	auth::{
		ClientId, DelegationSession, FederatedIdentity, SessionId, SessionStatus, SessionType,
	},
	flows::Broker,
};

/// Dashboard view of one delegation session. Carries no secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	/// Session identifier.
	pub id: SessionId,
	/// Browser or API-key session.
	#[serde(rename = "type")]
	pub session_type: SessionType,
	/// Client application.
	pub client_id: ClientId,
	/// Resource server URL.
	pub resource: String,
	/// Human-readable label.
	pub label: String,
	/// Creating device.
	pub created_on: String,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Absolute expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub expires: OffsetDateTime,
	/// Sliding expiry (browser sessions).
	#[serde(with = "time::serde::rfc3339::option")]
	pub refresh_expires: Option<OffsetDateTime>,
	/// `awaitingExchange` until an OAuth session's code is redeemed, then `active`.
	pub status: SessionStatus,
	/// `true` when the session is tied to the caller's own federated session.
	pub current: bool,
}
impl SessionSummary {
	fn new(session: DelegationSession, status: SessionStatus, caller: &FederatedIdentity) -> Self {
		let current = session.federated_session_id.as_ref() == Some(&caller.federated_session_id);

		Self {
			id: session.id,
			session_type: session.session_type,
			client_id: session.client_id,
			resource: session.resource,
			label: session.label,
			created_on: session.created_on,
			created_at: session.created_at,
			expires: session.expires_at,
			refresh_expires: session.refresh_expires_at,
			status,
			current,
		}
	}
}

/// A user's live sessions grouped by type, earliest expiry first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
	/// Browser sessions.
	pub browser: Vec<SessionSummary>,
	/// API keys.
	pub api_key: Vec<SessionSummary>,
}

impl Broker {
	/// Lists the caller's unexpired sessions.
	pub async fn list_sessions(&self, caller: &FederatedIdentity) -> Result<SessionOverview> {
		let now = self.now();
		let mut overview = SessionOverview::default();

		for session in self.store.list_sessions(&caller.user_id).await? {
			let status = session.status_at(now);

			if status == SessionStatus::Expired {
				continue;
			}

			let bucket = match session.session_type {
				SessionType::Browser => &mut overview.browser,
				SessionType::ApiKey => &mut overview.api_key,
			};

			bucket.push(SessionSummary::new(session, status, caller));
		}

		Ok(overview)
	}

	/// Closes the listed sessions; ids that do not belong to the caller are ignored.
	pub async fn close_sessions(
		&self,
		caller: &FederatedIdentity,
		ids: &[SessionId],
	) -> Result<usize> {
		Ok(self.store.delete_user_sessions(&caller.user_id, ids).await?)
	}
}
