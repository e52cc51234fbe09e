//! Walks through a dashboard session against a mock API: login, a silently refreshed list
//! request, a cached page, and logout.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::json;
use url::Url;
// self
use pesantren_session::{
	config::GatewayConfig,
	credentials::CredentialStore,
	flows::{Gateway, LoginRequest},
	monitor::ExpiryMonitor,
	resource::{Page, PageQuery},
	store::{MemoryStorage, SessionStorage},
};

#[derive(Debug, Deserialize)]
struct Santri {
	nis: String,
	name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/login");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"user": { "id": 1, "name": "Admin Pondok", "roles": ["admin"] },
				"access_token": "demo-stale",
				"token_type": "bearer",
				"expires_in": 3600
			}));
		})
		.await;
	// The first token is rejected so the gateway has to refresh silently.
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/santri").header("authorization", "Bearer demo-stale");
			then.status(401).json_body(json!({ "message": "Unauthenticated." }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "demo-fresh", "expires_in": 3600 }));
		})
		.await;
	let santri_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/santri").header("authorization", "Bearer demo-fresh");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"current_page": 1,
				"data": [{ "nis": "1201", "name": "Ahmad" }, { "nis": "1202", "name": "Zaid" }],
				"last_page": 1,
				"per_page": 10,
				"total": 2
			}));
		})
		.await;
	let logout_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/logout");
			then.status(200).json_body(json!({ "message": "Successfully logged out" }));
		})
		.await;
	let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::default());
	let credentials = Arc::new(CredentialStore::open(storage)?);
	let monitor = ExpiryMonitor::spawn(credentials.clone());
	let config = GatewayConfig::builder(Url::parse(&server.url("/api/"))?).build()?;
	let gateway = Gateway::new(config, credentials.clone())?;
	let outcome = gateway.login(LoginRequest::new("admin", "demo-password")).await?;

	println!("Logged in as {}; landing on {}.", outcome.user.name, outcome.landing);

	let query = PageQuery::default();
	let page: Page<Santri> = gateway.cached_page("santri", &query).await?;

	for santri in &page.data {
		println!("{} {}", santri.nis, santri.name);
	}

	// Served from the cache; no second request reaches the API.
	let again: Page<Santri> = gateway.cached_page("santri", &query).await?;

	println!("Cached page holds {} of {} rows.", again.data.len(), again.total);

	let message = gateway.logout().await?;

	println!("Server said: {}.", message.unwrap_or_default());

	login_mock.assert_async().await;
	refresh_mock.assert_calls_async(1).await;
	santri_mock.assert_calls_async(1).await;
	logout_mock.assert_async().await;
	monitor.shutdown();

	Ok(())
}
