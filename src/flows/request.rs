//! Authenticated request dispatch with the retry-on-401 policy.
//!
//! Every request is sent with the token current at dispatch time, remembering the credential
//! generation it was read at. A 401 makes the request queue on the refresh guard:
//!
//! - If the generation is unchanged once the guard is held, nobody refreshed in the meantime and
//!   this request leads the refresh. On success it re-sends once; on failure the session is ended
//!   and the original 401 is returned.
//! - If the generation moved, another request already refreshed (or the session ended). The
//!   request re-sends once if that refresh succeeded or the store is authenticated again,
//!   otherwise it returns its original 401 without touching the network.
//!
//! Re-sent requests are never intercepted again, so a server that rejects fresh tokens cannot
//! cause a refresh loop. Everything other than 401 passes through untouched.

// self
use crate::{
	_prelude::*,
	flows::{Gateway, RefreshOutcome},
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, FlowKind, FlowSpan},
};

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Sends `request` with bearer auth, silently refreshing and retrying once on 401.
	///
	/// Returns the response for every HTTP status; only transport failures become `Err`.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		let span = FlowSpan::new(FlowKind::Request, "send");

		span.instrument(async move {
			let snapshot = self.credentials.bearer();
			let response = self.dispatch(&request, snapshot.token.as_ref()).await?;

			if !response.is_unauthorized() {
				return Ok(response);
			}
			// Nothing to refresh for anonymous calls.
			if snapshot.token.is_none() && !self.credentials.is_authenticated() {
				return Ok(response);
			}

			self.recover_unauthorized(&request, response, snapshot.generation).await
		})
		.await
	}

	/// Sends `request` and decodes a successful JSON body.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: for<'de> Deserialize<'de>,
	{
		self.send(request).await?.json()
	}

	/// `GET path` decoded as JSON.
	pub async fn get_json<R>(&self, path: impl Into<String>) -> Result<R>
	where
		R: for<'de> Deserialize<'de>,
	{
		self.send_json(ApiRequest::get(path)).await
	}

	async fn recover_unauthorized(
		&self,
		request: &ApiRequest,
		original: ApiResponse,
		generation: u64,
	) -> Result<ApiResponse> {
		let permit = self.refresh_guard.acquire().await;

		if self.credentials.generation() == generation {
			let refreshed = self.refresh_locked().await;

			drop(permit);

			return match refreshed {
				Ok(()) => self.resend(request).await,
				Err(_) => Ok(original),
			};
		}

		drop(permit);

		// A refresh without `expires_in` can leave a fresh token behind an expiry that already
		// passed; the leader re-sends in that case, so waiters do too.
		let refreshed = self.refresh_guard.last_outcome() == Some(RefreshOutcome::Refreshed)
			&& self.credentials.bearer().token.is_some();

		if refreshed || self.credentials.is_authenticated() {
			self.resend(request).await
		} else {
			obs::debug_event(FlowKind::Request, "Session ended while waiting for refresh.");

			Ok(original)
		}
	}

	async fn resend(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let token = self.credentials.bearer().token;

		obs::debug_event(FlowKind::Request, "Re-sending request after refresh.");

		self.dispatch(request, token.as_ref()).await
	}
}
