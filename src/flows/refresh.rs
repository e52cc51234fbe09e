//! Silent refresh with a single-flight guard.
//!
//! Only one refresh round-trip is ever in flight per gateway. The leader sends
//! `POST {refresh_path}`, stores the new token together with an expiry recomputed from the
//! response's `expires_in`, and records the outcome on the guard. A failed refresh (network
//! error or API rejection) ends the session: the store is cleared and an
//! [`ExpiryReason::RefreshFailed`] event is published, unless the session already changed while
//! the refresh was in flight. The guard never retries on its own.

mod guard;
mod metrics;

pub use guard::{RefreshGuard, RefreshOutcome, RefreshPermit};
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::Session,
	credentials::{ExpiryReason, SessionEvent},
	flows::{self, Gateway},
	http::{ApiRequest, ApiTransport, HttpMethod},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Refreshes the access token outside the 401 path (e.g. before a long upload).
	///
	/// If another refresh completes while this call waits for the guard, its result is reused
	/// instead of sending a second refresh.
	pub async fn refresh(&self) -> Result<Session> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		span.instrument(async move {
			let generation = self.credentials.generation();
			let _permit = self.refresh_guard.acquire().await;

			if self.credentials.generation() == generation {
				self.refresh_locked().await?;
			} else if self.refresh_guard.last_outcome() == Some(RefreshOutcome::Failed) {
				return Err(Error::SessionExpired);
			}

			self.credentials.session().ok_or(Error::NotAuthenticated)
		})
		.await
	}

	/// Performs the refresh round-trip. Callers must hold the refresh guard.
	pub(crate) async fn refresh_locked(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Refresh;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		// The stale token identifies the session to refresh; the call does not need it valid.
		let stale = self.credentials.bearer();
		let request = ApiRequest::new(HttpMethod::Post, self.config.refresh_path.clone());
		let result = async {
			let response = self.dispatch(&request, stale.token.as_ref()).await?;
			let body: RefreshResponse = response.json()?;
			let token = flows::require_token(body.access_token)?;

			match body.expires_in {
				Some(expires_in) => self
					.credentials
					.update_access_token_with_ttl(token, flows::ttl_from_expires_in(expires_in)?),
				None => self.credentials.update_access_token(Some(token)),
			}
		}
		.await;

		match &result {
			Ok(()) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.refresh_metrics.record_success();
				self.refresh_guard.record(RefreshOutcome::Refreshed);
				self.credentials.publish(SessionEvent::Refreshed);
			},
			Err(err) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::warn_event(KIND, &format!("Silent refresh failed: {err}"));
				self.refresh_metrics.record_failure();
				self.refresh_guard.record(RefreshOutcome::Failed);

				// A logout or login landed mid-flight; that session is not ours to end.
				if self.credentials.generation() == stale.generation {
					self.cache.clear();
					self.credentials.expire(ExpiryReason::RefreshFailed);
				}
			},
		}

		result
	}
}
