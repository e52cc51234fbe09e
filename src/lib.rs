//! Session core for the pesantren administrative dashboard: a write-through credential store,
//! a single-flight token refresh guard, an authenticated REST gateway with retry-on-401, and an
//! expiry monitor that logs idle sessions out on time.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod flows;
pub mod http;
pub mod monitor;
pub mod obs;
pub mod resource;
pub mod route;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		auth::{AccessToken, UserRecord},
		config::GatewayConfig,
		credentials::CredentialStore,
		flows::Gateway,
		http::{ApiRequest, ApiResponse, ApiTransport, TransportFuture},
		store::{MemoryStorage, SessionStorage},
	};

	/// Builds a user fixture carrying the provided role names.
	pub fn test_user(id: u64, roles: &[&str]) -> UserRecord {
		UserRecord::new(id, format!("user-{id}"), roles.iter().copied())
	}

	/// Opens a credential store over fresh in-memory storage.
	pub fn test_credentials() -> (Arc<CredentialStore>, Arc<MemoryStorage>) {
		let storage = Arc::new(MemoryStorage::default());
		let backend: Arc<dyn SessionStorage> = storage.clone();
		let credentials = CredentialStore::open(backend)
			.expect("Failed to open credential store over in-memory storage.");

		(Arc::new(credentials), storage)
	}

	/// Seeds a session that stays valid for an hour.
	pub fn seed_session(credentials: &CredentialStore, token: &str) {
		credentials
			.set_session(test_user(1, &["admin"]), AccessToken::new(token), Duration::hours(1))
			.expect("Failed to seed test session.");
	}

	/// Gateway configuration pointing at a placeholder origin.
	pub fn test_config() -> GatewayConfig {
		GatewayConfig::builder(
			Url::parse("https://api.pesantren.test/api/").expect("Test base URL should parse."),
		)
		.build()
		.expect("Test gateway configuration should be valid.")
	}

	type Responder = Box<dyn Fn(&ApiRequest, Option<&str>) -> ScriptedReply + Send + Sync>;

	/// Reply produced by a [`ScriptedTransport`] responder.
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// Respond with the status and JSON body.
		Respond(u16, String),
		/// Fail as if the network dropped the request.
		NetworkError,
	}

	/// Request observed by a [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct SeenRequest {
		/// Request path relative to the base URL.
		pub path: String,
		/// Bearer token attached to the request, if any.
		pub bearer: Option<String>,
	}

	/// In-process transport that answers through a closure and records every call.
	///
	/// Each call yields to the scheduler before answering so concurrent gateway calls interleave
	/// the way real network requests do.
	pub struct ScriptedTransport {
		responder: Responder,
		seen: Mutex<VecDeque<SeenRequest>>,
	}
	impl ScriptedTransport {
		/// Creates a transport that answers through `responder`.
		pub fn new(
			responder: impl Fn(&ApiRequest, Option<&str>) -> ScriptedReply + 'static + Send + Sync,
		) -> Self {
			Self { responder: Box::new(responder), seen: Default::default() }
		}

		/// Returns every request observed so far.
		pub fn seen(&self) -> Vec<SeenRequest> {
			self.seen.lock().iter().cloned().collect()
		}

		/// Counts requests sent to `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.seen.lock().iter().filter(|seen| seen.path == path).count()
		}
	}
	impl ApiTransport for ScriptedTransport {
		fn execute<'a>(
			&'a self,
			_config: &'a GatewayConfig,
			request: &'a ApiRequest,
			bearer: Option<&'a AccessToken>,
		) -> TransportFuture<'a> {
			Box::pin(async move {
				let bearer = bearer.map(|token| token.expose().to_owned());

				self.seen
					.lock()
					.push_back(SeenRequest { path: request.path.clone(), bearer: bearer.clone() });
				tokio::task::yield_now().await;

				match (self.responder)(request, bearer.as_deref()) {
					ScriptedReply::Respond(status, body) => Ok(ApiResponse::from_parts(
						status,
						Default::default(),
						body.into_bytes(),
					)),
					ScriptedReply::NetworkError => Err(crate::error::TransportError::network(
						std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
					)),
				}
			})
		}
	}

	/// Builds a gateway over a [`ScriptedTransport`] and a fresh in-memory credential store.
	pub fn scripted_gateway(
		transport: ScriptedTransport,
	) -> (Gateway<ScriptedTransport>, Arc<ScriptedTransport>, Arc<CredentialStore>) {
		let (credentials, _) = test_credentials();
		let transport = Arc::new(transport);
		let gateway = Gateway::with_transport(test_config(), credentials.clone(), transport.clone());

		(gateway, transport, credentials)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
