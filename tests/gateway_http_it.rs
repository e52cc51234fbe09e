#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use pesantren_session::{
	auth::{AccessToken, UserRecord},
	config::GatewayConfig,
	credentials::{CredentialStore, ExpiryReason, SessionEvent},
	error::Error,
	flows::{Gateway, LoginRequest, ReqwestGateway},
	http::ApiRequest,
	route::{Landing, Route, RouteGuard},
	store::{MemoryStorage, SessionStorage},
};

fn build_gateway(server: &MockServer) -> (ReqwestGateway, Arc<CredentialStore>) {
	let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::default());
	let credentials = Arc::new(
		CredentialStore::open(storage).expect("Credential store should open over memory storage."),
	);
	let config = GatewayConfig::builder(
		Url::parse(&server.url("/api/")).expect("Mock API base URL should parse successfully."),
	)
	.build()
	.expect("Gateway configuration should be valid.");
	let gateway =
		Gateway::new(config, credentials.clone()).expect("Reqwest gateway should build.");

	(gateway, credentials)
}

fn seed(credentials: &CredentialStore, token: &str) {
	credentials
		.set_session(
			UserRecord::new(7, "Ustadz Hasan", ["ustadz"]),
			AccessToken::new(token),
			Duration::hours(1),
		)
		.expect("Failed to seed the session.");
}

#[tokio::test]
async fn login_then_logout_round_trip() {
	let server = MockServer::start_async().await;
	let (gateway, credentials) = build_gateway(&server);
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/login")
				.header("content-type", "application/json")
				.header("accept", "application/json")
				.json_body(json!({ "login": "hasan", "password": "rahasia" }));
			then.status(200).header("content-type", "application/json").json_body(json!({
				"user": { "id": 7, "name": "Ustadz Hasan", "roles": [{ "name": "ustadz" }] },
				"access_token": "jwt-1",
				"token_type": "bearer",
				"expires_in": 3600
			}));
		})
		.await;
	let logout_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/logout").header("authorization", "Bearer jwt-1");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "message": "Successfully logged out" }));
		})
		.await;
	let before = OffsetDateTime::now_utc();
	let outcome = gateway
		.login(LoginRequest::new("hasan", "rahasia"))
		.await
		.expect("Login should succeed against the mock API.");

	login_mock.assert_async().await;

	assert_eq!(outcome.landing, Landing::StaffDashboard);
	assert_eq!(outcome.user.id, 7);
	assert!(outcome.user.has_role("ustadz"));
	assert!(outcome.expires_at >= before + Duration::seconds(3599));
	assert!(outcome.expires_at <= OffsetDateTime::now_utc() + Duration::seconds(3601));
	assert_eq!(RouteGuard::check(&credentials), Route::Render);

	let message = gateway.logout().await.expect("Logout should succeed against the mock API.");

	logout_mock.assert_async().await;

	assert_eq!(message.as_deref(), Some("Successfully logged out"));
	assert!(credentials.session().is_none());
	assert_eq!(RouteGuard::check(&credentials), Route::Redirect(Landing::Public));
}

#[tokio::test]
async fn concurrent_401s_trigger_a_single_refresh() {
	let server = MockServer::start_async().await;
	let (gateway, credentials) = build_gateway(&server);
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/santri").header("authorization", "Bearer stale");
			then.status(401)
				.header("content-type", "application/json")
				.json_body(json!({ "message": "Unauthenticated." }));
		})
		.await;
	let fresh_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/santri").header("authorization", "Bearer fresh");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "data": [] }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/refresh").header("authorization", "Bearer stale");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "fresh", "expires_in": 3600 }));
		})
		.await;

	seed(&credentials, "stale");

	let (a, b, c) = tokio::join!(
		gateway.send(ApiRequest::get("santri").with_query("page", "1")),
		gateway.send(ApiRequest::get("santri").with_query("page", "2")),
		gateway.send(ApiRequest::get("santri").with_query("page", "3")),
	);

	for response in [a, b, c] {
		assert_eq!(response.expect("Request should complete.").status, 200);
	}

	refresh_mock.assert_calls_async(1).await;
	stale_mock.assert_calls_async(3).await;
	fresh_mock.assert_calls_async(3).await;

	assert_eq!(
		credentials.bearer().token.as_ref().map(AccessToken::expose),
		Some("fresh")
	);
}

#[tokio::test]
async fn rejected_refresh_ends_the_session() {
	let server = MockServer::start_async().await;
	let (gateway, credentials) = build_gateway(&server);
	let mut events = credentials.events();
	let santri_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/santri");
			then.status(401).json_body(json!({ "message": "Unauthenticated." }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/refresh");
			then.status(401).json_body(json!({ "message": "Token has expired" }));
		})
		.await;

	seed(&credentials, "stale");

	let response = gateway
		.send(ApiRequest::get("santri"))
		.await
		.expect("Original response should be returned.");

	assert_eq!(response.status, 401);

	santri_mock.assert_calls_async(1).await;
	refresh_mock.assert_calls_async(1).await;

	assert!(credentials.session().is_none());

	let event = events.try_recv().expect("Expiry should be published.");

	assert_eq!(event, SessionEvent::Expired { reason: ExpiryReason::RefreshFailed });
	assert_eq!(event.redirect(), Some(Landing::Login));
	assert!(event.notice().is_some());
}

#[tokio::test]
async fn logout_clears_session_even_when_server_fails() {
	let server = MockServer::start_async().await;
	let (gateway, credentials) = build_gateway(&server);
	let logout_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/logout");
			then.status(500).json_body(json!({ "message": "Server Error" }));
		})
		.await;

	seed(&credentials, "jwt-9");

	let err = gateway.logout().await.expect_err("Server failure should be reported.");

	logout_mock.assert_async().await;

	assert!(matches!(err, Error::Api { status: 500, .. }));
	assert!(!credentials.is_authenticated());
}

#[tokio::test]
async fn wrong_credentials_surface_as_api_errors() {
	let server = MockServer::start_async().await;
	let (gateway, credentials) = build_gateway(&server);
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/login");
			then.status(401).json_body(json!({ "message": "Invalid credentials" }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/refresh");
			then.status(200);
		})
		.await;
	let err = gateway
		.login(LoginRequest::new("hasan", "salah"))
		.await
		.expect_err("Wrong password should fail.");

	login_mock.assert_async().await;
	refresh_mock.assert_calls_async(0).await;

	match err {
		Error::Api { status, message } => {
			assert_eq!(status, 401);
			assert_eq!(message, "Invalid credentials");
		},
		other => panic!("Unexpected error: {other:?}"),
	}

	assert!(credentials.session().is_none());
}
