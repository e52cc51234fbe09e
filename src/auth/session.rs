//! Session model: bearer token, user, and absolute expiry.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, UserRecord},
};

/// Current lifecycle status for a session at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
	/// Token present and expiry still in the future.
	Active,
	/// Expiry instant reached or passed.
	Expired,
	/// Token missing or blank.
	Unauthenticated,
}

/// Authenticated session owned by the credential store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Bearer token attached to API requests.
	pub access_token: AccessToken,
	/// User returned by the login endpoint.
	pub user: UserRecord,
	/// Absolute expiry, always `now + server TTL` at the time it was computed.
	#[serde(with = "time::serde::timestamp::milliseconds", rename = "expires_at_epoch_ms")]
	pub expires_at: OffsetDateTime,
}
impl Session {
	/// Creates a session whose expiry is `now + ttl`.
	pub fn new_at(
		user: UserRecord,
		access_token: AccessToken,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Self {
		Self { access_token, user, expires_at: expiry_from(now, ttl) }
	}

	/// Computes the status at the provided instant.
	pub fn status_at(&self, now: OffsetDateTime) -> SessionStatus {
		if self.access_token.is_empty() {
			return SessionStatus::Unauthenticated;
		}
		if now >= self.expires_at {
			return SessionStatus::Expired;
		}

		SessionStatus::Active
	}

	/// Returns `true` iff the token is non-empty and the expiry lies after `now`.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		matches!(self.status_at(now), SessionStatus::Active)
	}

	/// Convenience helper using the current UTC instant.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Time left until expiry; negative once expired.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at - now
	}

	/// Expiry as milliseconds since the Unix epoch.
	pub fn expires_at_epoch_ms(&self) -> i64 {
		epoch_ms(self.expires_at)
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("access_token", &"<redacted>")
			.field("user", &self.user.id)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Adds a TTL to `now`, saturating instead of overflowing on absurd server values.
pub(crate) fn expiry_from(now: OffsetDateTime, ttl: Duration) -> OffsetDateTime {
	now.checked_add(ttl).unwrap_or(if ttl.is_negative() {
		OffsetDateTime::UNIX_EPOCH
	} else {
		now + Duration::days(365 * 100)
	})
}

pub(crate) fn epoch_ms(instant: OffsetDateTime) -> i64 {
	i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
