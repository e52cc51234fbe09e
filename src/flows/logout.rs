//! Explicit logout.

// self
use crate::{
	_prelude::*,
	credentials::SessionEvent,
	flows::Gateway,
	http::{ApiRequest, ApiTransport, HttpMethod},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

#[derive(Debug, Deserialize)]
struct LogoutResponse {
	#[serde(default)]
	message: Option<String>,
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Invalidates the token server-side and always clears the local session.
	///
	/// Returns the server's message on success. A server or network failure is still returned
	/// to the caller, but by then the session, the resource cache, and durable storage are
	/// already empty.
	pub async fn logout(&self) -> Result<Option<String>> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let Some(token) = self.credentials.bearer().token else {
					return Ok(None);
				};
				let request = ApiRequest::new(HttpMethod::Post, self.config.logout_path.clone());
				let body: LogoutResponse = self.dispatch(&request, Some(&token)).await?.json()?;

				Ok(body.message)
			})
			.await;

		self.credentials.clear();
		self.cache.clear();
		self.credentials.publish(SessionEvent::LoggedOut);

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(err) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::warn_event(KIND, &format!("Server-side logout failed: {err}"));
			},
		}

		result
	}
}
