//! Durable session storage contracts and built-in backends.
//!
//! A backend persists the three session keys (token, serialized user, expiry instant) as one
//! unit, so a reload never observes a token without its user or expiry. Writes are synchronous;
//! the credential store calls them inline on every mutation.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Session, UserRecord},
};

/// Storage backend contract implemented by session stores.
pub trait SessionStorage
where
	Self: Send + Sync,
{
	/// Loads the persisted session, if any.
	fn load(&self) -> Result<Option<PersistedSession>, StoreError>;

	/// Replaces the persisted session with `session`, writing all keys as one unit.
	fn persist(&self, session: &PersistedSession) -> Result<(), StoreError>;

	/// Removes every key. Erasing an empty storage succeeds.
	fn erase(&self) -> Result<(), StoreError>;
}

/// On-disk shape of a session: the token, user, and expiry keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
	/// Bearer token.
	pub token: AccessToken,
	/// Serialized user record.
	pub user: UserRecord,
	/// Expiry as milliseconds since the Unix epoch.
	pub expires_at_epoch_ms: i64,
}
impl PersistedSession {
	/// Converts back into a [`Session`], rejecting blank tokens and out-of-range instants.
	pub fn into_session(self) -> Option<Session> {
		if self.token.is_empty() {
			return None;
		}

		let nanos = i128::from(self.expires_at_epoch_ms) * 1_000_000;
		let expires_at = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;

		Some(Session { access_token: self.token, user: self.user, expires_at })
	}
}
impl From<&Session> for PersistedSession {
	fn from(session: &Session) -> Self {
		Self {
			token: session.access_token.clone(),
			user: session.user.clone(),
			expires_at_epoch_ms: session.expires_at_epoch_ms(),
		}
	}
}

/// Error type produced by [`SessionStorage`] implementations.
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
