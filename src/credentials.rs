//! Credential store: the single source of truth for the current session.
//!
//! Every mutation writes through to [`SessionStorage`] before returning, bumps a generation
//! counter, and publishes the new expiry instant on a watch channel. The gateway compares
//! generations to tell whether a refresh (or logout) happened while one of its requests was in
//! flight; the expiry monitor re-arms its timer from the watch channel.

// crates.io
use tokio::sync::{broadcast, watch};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Session, UserRecord, session},
	obs::{self, FlowKind},
	store::{PersistedSession, SessionStorage, StoreError},
};

const EVENT_CAPACITY: usize = 32;

/// Why a session was ended without the user asking for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpiryReason {
	/// The stored expiry instant was reached.
	Timer,
	/// A silent refresh failed after a 401.
	RefreshFailed,
}

/// Lifecycle notifications for the UI layer (redirects, toasts).
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
	/// A login stored a new session.
	LoggedIn {
		/// Authenticated user.
		user: UserRecord,
	},
	/// A silent refresh replaced the token.
	Refreshed,
	/// The user logged out.
	LoggedOut,
	/// The session was ended by the client; the UI should redirect to the login screen.
	Expired {
		/// What ended the session.
		reason: ExpiryReason,
	},
}
impl SessionEvent {
	/// Notice text to show the user, if the event warrants one.
	pub fn notice(&self) -> Option<&'static str> {
		match self {
			Self::Expired { .. } => Some("Session expired, please log in again."),
			_ => None,
		}
	}
}

/// Token plus the generation it was read at.
#[derive(Clone, Debug)]
pub struct BearerSnapshot {
	/// Token to attach, if a session holds one.
	pub token: Option<AccessToken>,
	/// Store generation at the time of the read.
	pub generation: u64,
}

#[derive(Debug, Default)]
struct State {
	session: Option<Session>,
	generation: u64,
}

/// Write-through store for the current session.
pub struct CredentialStore {
	storage: Arc<dyn SessionStorage>,
	state: RwLock<State>,
	expiry_tx: watch::Sender<Option<OffsetDateTime>>,
	events_tx: broadcast::Sender<SessionEvent>,
}
impl CredentialStore {
	/// Opens the store, restoring any session persisted by an earlier process.
	///
	/// A persisted session is restored even if it already expired; the expiry monitor ends it
	/// as soon as it starts.
	pub fn open(storage: Arc<dyn SessionStorage>) -> Result<Self> {
		let session = storage.load()?.and_then(PersistedSession::into_session);
		let (expiry_tx, _) = watch::channel(session.as_ref().map(|s| s.expires_at));
		let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

		Ok(Self {
			storage,
			state: RwLock::new(State { session, generation: 0 }),
			expiry_tx,
			events_tx,
		})
	}

	/// Stores a fresh session with `expires_at = now + ttl`.
	pub fn set_session(&self, user: UserRecord, token: AccessToken, ttl: Duration) -> Result<()> {
		self.set_session_at(user, token, ttl, OffsetDateTime::now_utc())
	}

	/// Same as [`set_session`](Self::set_session) with an explicit clock reading.
	pub fn set_session_at(
		&self,
		user: UserRecord,
		token: AccessToken,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<()> {
		if token.is_empty() {
			self.clear();

			return Ok(());
		}

		self.replace(Some(Session::new_at(user, token, ttl, now)))
	}

	/// Replaces only the token. `None` or a blank token clears token and expiry and leaves the
	/// store unauthenticated.
	pub fn update_access_token(&self, token: Option<AccessToken>) -> Result<()> {
		let Some(token) = token.filter(|token| !token.is_empty()) else {
			self.clear();

			return Ok(());
		};
		let Some(mut session) = self.session() else {
			return Err(Error::NotAuthenticated);
		};

		session.access_token = token;

		self.replace(Some(session))
	}

	/// Replaces the token and recomputes the expiry from a server-supplied TTL.
	pub fn update_access_token_with_ttl(&self, token: AccessToken, ttl: Duration) -> Result<()> {
		self.update_access_token_with_ttl_at(token, ttl, OffsetDateTime::now_utc())
	}

	/// Same as [`update_access_token_with_ttl`](Self::update_access_token_with_ttl) with an
	/// explicit clock reading.
	pub fn update_access_token_with_ttl_at(
		&self,
		token: AccessToken,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<()> {
		if token.is_empty() {
			self.clear();

			return Ok(());
		}

		let Some(mut session) = self.session() else {
			return Err(Error::NotAuthenticated);
		};

		session.access_token = token;
		session.expires_at = session::expiry_from(now, ttl);

		self.replace(Some(session))
	}

	/// Wipes the session in memory and in durable storage.
	///
	/// Idempotent. A storage failure is logged; the in-memory session is cleared regardless so
	/// the client never keeps using credentials it meant to drop.
	pub fn clear(&self) {
		if let Err(err) = self.replace(None) {
			obs::warn_event(FlowKind::Logout, &format!("Failed to erase stored session: {err}"));
		}
	}

	/// Clears the session and announces the expiry to listeners.
	pub fn expire(&self, reason: ExpiryReason) {
		self.clear();
		self.announce_expiry(reason);
	}

	/// Expires the session only if it still ends at `expires_at`.
	///
	/// The comparison and the clear happen under one write lock, so a session extended by a
	/// concurrent refresh is never ended by a timer armed for its old expiry. Returns `true` when
	/// the session was ended.
	pub fn expire_if(&self, expires_at: OffsetDateTime, reason: ExpiryReason) -> bool {
		{
			let mut state = self.state.write();

			if state.session.as_ref().map(|session| session.expires_at) != Some(expires_at) {
				return false;
			}
			if let Err(err) = self.replace_locked(&mut state, None) {
				obs::warn_event(FlowKind::Expiry, &format!("Failed to erase stored session: {err}"));
			}
		}

		self.announce_expiry(reason);

		true
	}

	/// `true` iff a non-empty token is stored and its expiry lies in the future.
	pub fn is_authenticated(&self) -> bool {
		self.is_authenticated_at(OffsetDateTime::now_utc())
	}

	/// Same as [`is_authenticated`](Self::is_authenticated) at the provided instant.
	pub fn is_authenticated_at(&self, now: OffsetDateTime) -> bool {
		self.state.read().session.as_ref().is_some_and(|session| session.is_valid_at(now))
	}

	/// Snapshot of the current session.
	pub fn session(&self) -> Option<Session> {
		self.state.read().session.clone()
	}

	/// Current user, if any.
	pub fn user(&self) -> Option<UserRecord> {
		self.state.read().session.as_ref().map(|session| session.user.clone())
	}

	/// Current expiry instant, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.state.read().session.as_ref().map(|session| session.expires_at)
	}

	/// Reads the token and the generation under one lock.
	pub fn bearer(&self) -> BearerSnapshot {
		let state = self.state.read();

		BearerSnapshot {
			token: state.session.as_ref().map(|session| session.access_token.clone()),
			generation: state.generation,
		}
	}

	/// Generation counter; bumped by every mutation, including a clear of an empty store.
	pub fn generation(&self) -> u64 {
		self.state.read().generation
	}

	/// Watches the expiry instant; `None` while unauthenticated.
	pub fn subscribe(&self) -> watch::Receiver<Option<OffsetDateTime>> {
		self.expiry_tx.subscribe()
	}

	/// Subscribes to lifecycle events emitted after this call.
	pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
		self.events_tx.subscribe()
	}

	pub(crate) fn publish(&self, event: SessionEvent) {
		// No subscribers is fine.
		let _ = self.events_tx.send(event);
	}

	fn announce_expiry(&self, reason: ExpiryReason) {
		obs::warn_event(FlowKind::Expiry, &format!("Session ended by the client: {reason:?}."));
		self.publish(SessionEvent::Expired { reason });
	}

	fn replace(&self, session: Option<Session>) -> Result<()> {
		let mut state = self.state.write();

		self.replace_locked(&mut state, session).map_err(Error::from)
	}

	// The expiry is published under the state lock so watchers observe mutations in order.
	fn replace_locked(
		&self,
		state: &mut State,
		session: Option<Session>,
	) -> Result<(), StoreError> {
		let persisted = match &session {
			Some(session) => self.storage.persist(&PersistedSession::from(session)),
			None => self.storage.erase(),
		};

		// A failed write must not leave stale credentials usable in memory.
		if persisted.is_ok() || session.is_none() {
			let expires_at = session.as_ref().map(|session| session.expires_at);

			state.session = session;
			state.generation += 1;
			self.expiry_tx.send_replace(expires_at);
		}

		persisted
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("CredentialStore")
			.field("session", &state.session)
			.field("generation", &state.generation)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::{test_credentials, test_user},
		store::MemoryStorage,
	};

	const LOGIN_AT: OffsetDateTime = macros::datetime!(2025-07-01 08:00 UTC);

	#[test]
	fn set_session_writes_all_keys_through() {
		let (credentials, storage) = test_credentials();

		credentials
			.set_session_at(test_user(5, &["admin"]), AccessToken::new("t-1"), Duration::hours(1), LOGIN_AT)
			.expect("Session should be stored.");

		let persisted = storage.snapshot().expect("Storage should hold the session.");

		assert_eq!(persisted.token.expose(), "t-1");
		assert_eq!(persisted.user.id, 5);
		assert_eq!(
			persisted.expires_at_epoch_ms,
			(LOGIN_AT + Duration::hours(1)).unix_timestamp() * 1000
		);
	}

	#[test]
	fn authentication_flips_at_the_expiry_instant() {
		let (credentials, _) = test_credentials();

		credentials
			.set_session_at(test_user(1, &[]), AccessToken::new("t"), Duration::seconds(3600), LOGIN_AT)
			.expect("Session should be stored.");

		assert!(credentials.is_authenticated_at(LOGIN_AT + Duration::seconds(3599)));
		assert!(!credentials.is_authenticated_at(LOGIN_AT + Duration::seconds(3600)));
		assert!(!credentials.is_authenticated_at(LOGIN_AT + Duration::seconds(3601)));
	}

	#[test]
	fn clear_is_idempotent() {
		let (credentials, storage) = test_credentials();

		crate::_preludet::seed_session(&credentials, "t");
		credentials.clear();
		credentials.clear();
		credentials.clear();

		assert!(credentials.session().is_none());
		assert!(storage.snapshot().is_none());
		assert!(!credentials.is_authenticated());
		assert!(credentials.subscribe().borrow().is_none());
	}

	#[test]
	fn updating_token_keeps_user_and_bumps_generation() {
		let (credentials, storage) = test_credentials();

		crate::_preludet::seed_session(&credentials, "old");

		let before = credentials.bearer();
		let expiry = credentials.expires_at();

		credentials
			.update_access_token(Some(AccessToken::new("new")))
			.expect("Token update should succeed.");

		let after = credentials.bearer();

		assert_eq!(after.token.as_ref().map(AccessToken::expose), Some("new"));
		assert!(after.generation > before.generation);
		assert_eq!(credentials.expires_at(), expiry);
		assert_eq!(storage.snapshot().map(|s| s.token.expose().to_owned()), Some("new".into()));
	}

	#[test]
	fn null_token_update_unauthenticates() {
		let (credentials, _) = test_credentials();

		crate::_preludet::seed_session(&credentials, "old");
		credentials.update_access_token(None).expect("Clearing update should succeed.");

		assert!(!credentials.is_authenticated());
		assert!(credentials.expires_at().is_none());
	}

	#[test]
	fn token_update_without_session_is_rejected() {
		let (credentials, _) = test_credentials();
		let err = credentials
			.update_access_token(Some(AccessToken::new("orphan")))
			.expect_err("Updating without a session should fail.");

		assert!(matches!(err, Error::NotAuthenticated));
	}

	#[test]
	fn ttl_update_recomputes_expiry() {
		let (credentials, _) = test_credentials();

		credentials
			.set_session_at(test_user(1, &[]), AccessToken::new("a"), Duration::minutes(5), LOGIN_AT)
			.expect("Session should be stored.");
		credentials
			.update_access_token_with_ttl_at(
				AccessToken::new("b"),
				Duration::hours(1),
				LOGIN_AT + Duration::minutes(4),
			)
			.expect("Refresh update should succeed.");

		assert_eq!(
			credentials.expires_at(),
			Some(LOGIN_AT + Duration::minutes(4) + Duration::hours(1))
		);
		assert_eq!(*credentials.subscribe().borrow(), credentials.expires_at());
	}

	#[test]
	fn reopen_restores_persisted_session() {
		let storage = Arc::new(MemoryStorage::default());
		let first = CredentialStore::open(storage.clone()).expect("First open should succeed.");

		first
			.set_session(test_user(9, &["parent"]), AccessToken::new("persisted"), Duration::hours(2))
			.expect("Session should be stored.");
		drop(first);

		let reopened = CredentialStore::open(storage).expect("Reopen should succeed.");

		assert!(reopened.is_authenticated());
		assert_eq!(reopened.user().map(|user| user.id), Some(9));
	}

	#[test]
	fn expire_publishes_notice() {
		let (credentials, _) = test_credentials();
		let mut events = credentials.events();

		crate::_preludet::seed_session(&credentials, "t");
		credentials.expire(ExpiryReason::Timer);

		let event = events.try_recv().expect("Expiry should be announced.");

		assert_eq!(event, SessionEvent::Expired { reason: ExpiryReason::Timer });
		assert_eq!(event.notice(), Some("Session expired, please log in again."));
		assert!(credentials.session().is_none());
	}

	#[test]
	fn conditional_expiry_spares_an_extended_session() {
		let (credentials, _) = test_credentials();
		let mut events = credentials.events();

		credentials
			.set_session_at(test_user(1, &[]), AccessToken::new("a"), Duration::minutes(5), LOGIN_AT)
			.expect("Session should be stored.");

		let armed_for = credentials.expires_at().expect("Session should have an expiry.");

		credentials
			.update_access_token_with_ttl_at(
				AccessToken::new("b"),
				Duration::hours(1),
				LOGIN_AT + Duration::minutes(4),
			)
			.expect("Refresh update should succeed.");

		assert!(!credentials.expire_if(armed_for, ExpiryReason::Timer));
		assert_eq!(credentials.bearer().token.as_ref().map(AccessToken::expose), Some("b"));
		assert!(events.try_recv().is_err());

		let current = credentials.expires_at().expect("Session should still have an expiry.");

		assert!(credentials.expire_if(current, ExpiryReason::Timer));
		assert!(credentials.session().is_none());
		assert!(credentials.subscribe().borrow().is_none());
		assert_eq!(
			events.try_recv().ok(),
			Some(SessionEvent::Expired { reason: ExpiryReason::Timer })
		);
	}

	struct FailingStorage;
	impl SessionStorage for FailingStorage {
		fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
			Ok(None)
		}

		fn persist(&self, _session: &PersistedSession) -> Result<(), StoreError> {
			Err(StoreError::Backend { message: "quota exceeded".into() })
		}

		fn erase(&self) -> Result<(), StoreError> {
			Err(StoreError::Backend { message: "quota exceeded".into() })
		}
	}

	#[test]
	fn storage_failures_surface_on_set_but_not_on_clear() {
		let credentials =
			CredentialStore::open(Arc::new(FailingStorage)).expect("Open should succeed.");
		let err = credentials
			.set_session(test_user(1, &[]), AccessToken::new("t"), Duration::hours(1))
			.expect_err("Persist failure should surface.");

		assert!(matches!(err, Error::Storage(_)));
		assert!(!credentials.is_authenticated());

		credentials.clear();

		assert!(credentials.session().is_none());
	}
}
