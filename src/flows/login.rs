//! Credential exchange at the login endpoint.

// self
use crate::{
	_prelude::*,
	auth::UserRecord,
	credentials::SessionEvent,
	error::ConfigError,
	flows::{self, Gateway},
	http::{ApiRequest, ApiTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	route::Landing,
};

/// Credentials submitted by the login form.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Username, email, or NIS, whichever the API accepts.
	pub login: String,
	/// Plain-text password; never logged.
	pub password: String,
}
impl LoginRequest {
	/// Creates a login request.
	pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
		Self { login: login.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("login", &self.login)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Body returned by the login endpoint.
#[derive(Debug, Deserialize)]
struct LoginResponse {
	user: UserRecord,
	access_token: String,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

/// Result of a successful login.
#[derive(Clone, Debug, PartialEq)]
pub struct LoginOutcome {
	/// Authenticated user.
	pub user: UserRecord,
	/// Screen the user should land on.
	pub landing: Landing,
	/// When the new session expires.
	pub expires_at: OffsetDateTime,
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Exchanges credentials for a session and stores it.
	///
	/// The call bypasses 401 interception: a 401 here means wrong credentials and comes back as
	/// [`Error::Api`].
	pub async fn login(&self, credentials: LoginRequest) -> Result<LoginOutcome> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = ApiRequest::post_json(self.config.login_path.clone(), &credentials)?;
				let body: LoginResponse = self.dispatch(&request, None).await?.json()?;

				if let Some(token_type) = body.token_type.filter(|t| !t.eq_ignore_ascii_case("bearer"))
				{
					return Err(ConfigError::UnsupportedTokenType { token_type }.into());
				}

				let token = flows::require_token(body.access_token)?;
				let ttl = flows::ttl_from_expires_in(
					body.expires_in.ok_or(ConfigError::MissingExpiresIn)?,
				)?;

				self.credentials.set_session(body.user.clone(), token, ttl)?;
				// A new user must never see the previous user's cached lists.
				self.cache.clear();

				let expires_at = self.credentials.expires_at().ok_or(Error::NotAuthenticated)?;

				self.credentials.publish(SessionEvent::LoggedIn { user: body.user.clone() });

				Ok(LoginOutcome { landing: Landing::for_user(&body.user), user: body.user, expires_at })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedReply, ScriptedTransport, scripted_gateway};

	#[tokio::test]
	async fn parent_lands_on_parent_dashboard() {
		let (gateway, transport, credentials) = scripted_gateway(ScriptedTransport::new(|_, _| {
			ScriptedReply::Respond(
				200,
				r#"{"user":{"id":31,"name":"Wali Santri","roles":["parent"]},"access_token":"jwt","token_type":"bearer","expires_in":3600}"#.into(),
			)
		}));
		let mut events = credentials.events();
		let outcome = gateway
			.login(LoginRequest::new("wali@pesantren.test", "secret"))
			.await
			.expect("Login should succeed.");

		assert_eq!(outcome.landing, Landing::ParentDashboard);
		assert!(credentials.is_authenticated());
		assert_eq!(transport.seen()[0].bearer, None);
		assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedIn { .. })));
	}

	#[tokio::test]
	async fn wrong_password_is_not_intercepted() {
		let (gateway, transport, credentials) = scripted_gateway(ScriptedTransport::new(|_, _| {
			ScriptedReply::Respond(401, r#"{"message":"Invalid credentials"}"#.into())
		}));
		let err = gateway
			.login(LoginRequest::new("admin", "wrong"))
			.await
			.expect_err("Bad credentials should fail.");

		assert!(matches!(err, Error::Api { status: 401, ref message } if message == "Invalid credentials"));
		assert_eq!(transport.calls_to("refresh"), 0);
		assert!(!credentials.is_authenticated());
	}

	#[tokio::test]
	async fn login_contract_violations_are_rejected() {
		let (gateway, _, credentials) = scripted_gateway(ScriptedTransport::new(|_, _| {
			ScriptedReply::Respond(
				200,
				r#"{"user":{"id":1,"roles":[]},"access_token":"jwt","token_type":"mac","expires_in":3600}"#.into(),
			)
		}));
		let err = gateway
			.login(LoginRequest::new("admin", "secret"))
			.await
			.expect_err("Non-bearer token type should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::UnsupportedTokenType { .. })));
		assert!(!credentials.is_authenticated());

		let (gateway, _, _) = scripted_gateway(ScriptedTransport::new(|_, _| {
			ScriptedReply::Respond(200, r#"{"user":{"id":1},"access_token":"jwt"}"#.into())
		}));
		let err = gateway
			.login(LoginRequest::new("admin", "secret"))
			.await
			.expect_err("Missing expires_in should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::MissingExpiresIn)));
	}

	#[test]
	fn password_is_redacted() {
		let request = LoginRequest::new("admin", "hunter2");

		assert!(!format!("{request:?}").contains("hunter2"));
	}
}
