//! Single-flight guard serializing silent refreshes.

// crates.io
use async_lock::MutexGuard as AsyncMutexGuard;
// self
use crate::_prelude::*;

/// Result of the most recent refresh performed under the guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// A new token was stored.
	Refreshed,
	/// The refresh failed and the session was cleared.
	Failed,
}

/// Async mutex with at most one holder; everyone else awaits the release.
///
/// Waiters are not served in arrival order. The guard holds no session state of its own
/// beyond the last outcome, which waiters may consult after acquiring it.
#[derive(Debug, Default)]
pub struct RefreshGuard {
	lock: AsyncMutex<()>,
	last_outcome: Mutex<Option<RefreshOutcome>>,
}
impl RefreshGuard {
	/// Waits until the guard is free, then holds it until the permit is dropped.
	pub async fn acquire(&self) -> RefreshPermit<'_> {
		RefreshPermit { _held: self.lock.lock().await }
	}

	/// Takes the guard only if nobody holds it.
	pub fn try_acquire(&self) -> Option<RefreshPermit<'_>> {
		self.lock.try_lock().map(|held| RefreshPermit { _held: held })
	}

	/// Returns `true` while a refresh holds the guard.
	pub fn is_locked(&self) -> bool {
		self.lock.try_lock().is_none()
	}

	/// Outcome recorded by the most recent refresh, if any ran.
	pub fn last_outcome(&self) -> Option<RefreshOutcome> {
		*self.last_outcome.lock()
	}

	pub(crate) fn record(&self, outcome: RefreshOutcome) {
		*self.last_outcome.lock() = Some(outcome);
	}
}

/// RAII permit; dropping it releases the guard on every path, including cancellation.
pub struct RefreshPermit<'a> {
	_held: AsyncMutexGuard<'a, ()>,
}
impl Debug for RefreshPermit<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RefreshPermit(..)")
	}
}
