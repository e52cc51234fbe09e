//! Session expiry monitor: ends the session at its stored expiry instant even when no request is
//! being made (an idle dashboard tab).
//!
//! [`ExpiryTimer`] owns at most one scheduled one-shot. [`ExpiryMonitor`] watches the credential
//! store and re-arms or disarms the timer whenever the expiry instant changes. Both must be used
//! from within a Tokio runtime.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	credentials::{CredentialStore, ExpiryReason},
	obs::{self, FlowKind, FlowOutcome},
};

/// Single-slot timer; arming it again cancels the previous schedule.
#[derive(Debug)]
pub struct ExpiryTimer {
	credentials: Arc<CredentialStore>,
	slot: Mutex<Option<JoinHandle<()>>>,
	fired: Arc<AtomicU64>,
}
impl ExpiryTimer {
	/// Creates a disarmed timer for `credentials`.
	pub fn new(credentials: Arc<CredentialStore>) -> Self {
		Self { credentials, slot: Default::default(), fired: Default::default() }
	}

	/// Cancels any pending schedule and arms a new one for `expires_at`.
	///
	/// An instant that already passed expires the session immediately. When the timer fires it
	/// only ends the session if the store still holds the same expiry, so a schedule that lost a
	/// race with a newer session never logs that session out.
	pub fn rearm(&self, expires_at: OffsetDateTime) {
		let mut slot = self.slot.lock();

		if let Some(previous) = slot.take() {
			previous.abort();
		}

		let remaining = match std::time::Duration::try_from(expires_at - OffsetDateTime::now_utc()) {
			Ok(remaining) if !remaining.is_zero() => remaining,
			_ => {
				drop(slot);
				fire(&self.credentials, &self.fired, expires_at);

				return;
			},
		};

		let credentials = self.credentials.clone();
		let fired = self.fired.clone();

		*slot = Some(tokio::spawn(async move {
			tokio::time::sleep(remaining).await;
			fire(&credentials, &fired, expires_at);
		}));
	}

	/// Cancels any pending schedule. Idempotent.
	pub fn disarm(&self) {
		if let Some(previous) = self.slot.lock().take() {
			previous.abort();
		}
	}

	/// Returns `true` while a schedule is pending.
	pub fn is_armed(&self) -> bool {
		self.slot.lock().as_ref().is_some_and(|handle| !handle.is_finished())
	}

	/// Number of times this timer ended a session.
	pub fn fired(&self) -> u64 {
		self.fired.load(Ordering::SeqCst)
	}
}
impl Drop for ExpiryTimer {
	fn drop(&mut self) {
		self.disarm();
	}
}

fn fire(credentials: &CredentialStore, fired: &AtomicU64, expires_at: OffsetDateTime) {
	if credentials.expire_if(expires_at, ExpiryReason::Timer) {
		fired.fetch_add(1, Ordering::SeqCst);
		obs::record_flow_outcome(FlowKind::Expiry, FlowOutcome::Success);
	}
}

/// Background task keeping an [`ExpiryTimer`] in sync with the credential store.
#[derive(Debug)]
pub struct ExpiryMonitor {
	timer: Arc<ExpiryTimer>,
	task: JoinHandle<()>,
}
impl ExpiryMonitor {
	/// Starts watching `credentials`. The current expiry is evaluated right away, so a session
	/// restored from storage after it expired ends immediately.
	pub fn spawn(credentials: Arc<CredentialStore>) -> Self {
		let timer = Arc::new(ExpiryTimer::new(credentials.clone()));
		let mut expiry = credentials.subscribe();
		let worker = timer.clone();
		let task = tokio::spawn(async move {
			loop {
				let current = *expiry.borrow_and_update();

				match current {
					Some(expires_at) => worker.rearm(expires_at),
					None => worker.disarm(),
				}

				if expiry.changed().await.is_err() {
					worker.disarm();

					break;
				}
			}
		});

		Self { timer, task }
	}

	/// Timer driven by this monitor.
	pub fn timer(&self) -> &ExpiryTimer {
		&self.timer
	}

	/// Stops watching and cancels any pending schedule.
	pub fn shutdown(self) {
		drop(self);
	}
}
impl Drop for ExpiryMonitor {
	fn drop(&mut self) {
		self.task.abort();
		self.timer.disarm();
	}
}
