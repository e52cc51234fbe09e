//! Gateway configuration: API origin, auth endpoint paths, and transport knobs.

// std
use std::{fs, path::Path, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::ConfigError};

/// Validated gateway configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Base URL every request path is joined onto (e.g. `https://api.example/api/`).
	pub base_url: Url,
	/// Login endpoint path.
	#[serde(default = "defaults::login_path")]
	pub login_path: String,
	/// Refresh endpoint path.
	#[serde(default = "defaults::refresh_path")]
	pub refresh_path: String,
	/// Logout endpoint path.
	#[serde(default = "defaults::logout_path")]
	pub logout_path: String,
	/// Per-request timeout in milliseconds; `None` leaves the transport default.
	#[serde(default)]
	pub timeout_ms: Option<u64>,
	/// `User-Agent` header sent by the reqwest transport.
	#[serde(default = "defaults::user_agent")]
	pub user_agent: String,
}
impl GatewayConfig {
	/// Starts a builder for the provided API base URL.
	pub fn builder(base_url: Url) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Loads and validates a JSON configuration file.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let file_error =
			|message: String| ConfigError::File { path: path.display().to_string(), message };
		let bytes = fs::read(path).map_err(|e| file_error(e.to_string()))?;
		let mut de = serde_json::Deserializer::from_slice(&bytes);
		let config: Self =
			serde_path_to_error::deserialize(&mut de).map_err(|e| file_error(e.to_string()))?;

		config.validate()
	}

	/// Request timeout, when configured.
	pub fn timeout(&self) -> Option<StdDuration> {
		self.timeout_ms.map(StdDuration::from_millis)
	}

	/// Resolves an API path against the base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url.join(path.trim_start_matches('/')).map_err(|source| {
			ConfigError::InvalidRequestPath { path: path.to_owned(), source }
		})
	}

	fn validate(mut self) -> Result<Self, ConfigError> {
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidBaseUrl { url: self.base_url.to_string() });
		}
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { scheme: self.base_url.scheme().into() });
		}
		// Without the trailing slash `Url::join` would drop the last base segment.
		if !self.base_url.path().ends_with('/') {
			let path = format!("{}/", self.base_url.path());

			self.base_url.set_path(&path);
		}

		for (endpoint, path) in [
			("login", &self.login_path),
			("refresh", &self.refresh_path),
			("logout", &self.logout_path),
		] {
			if path.trim().is_empty() || path.contains("://") || path.starts_with("//") {
				return Err(ConfigError::InvalidEndpointPath { endpoint, path: path.clone() });
			}
		}

		Ok(self)
	}
}

/// Builder for [`GatewayConfig`].
#[derive(Clone, Debug)]
pub struct GatewayConfigBuilder {
	config: GatewayConfig,
}
impl GatewayConfigBuilder {
	fn new(base_url: Url) -> Self {
		Self {
			config: GatewayConfig {
				base_url,
				login_path: defaults::login_path(),
				refresh_path: defaults::refresh_path(),
				logout_path: defaults::logout_path(),
				timeout_ms: None,
				user_agent: defaults::user_agent(),
			},
		}
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.config.login_path = path.into();

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.config.refresh_path = path.into();

		self
	}

	/// Overrides the logout endpoint path.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.config.logout_path = path.into();

		self
	}

	/// Sets a per-request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.config.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.config.user_agent = user_agent.into();

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		self.config.validate()
	}
}

mod defaults {
	pub(super) fn login_path() -> String {
		"login".into()
	}

	pub(super) fn refresh_path() -> String {
		"refresh".into()
	}

	pub(super) fn logout_path() -> String {
		"logout".into()
	}

	pub(super) fn user_agent() -> String {
		concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	#[test]
	fn builder_normalizes_base_and_joins_paths() {
		let config = GatewayConfig::builder(url("https://api.pesantren.test/api/v1"))
			.refresh_path("/auth/refresh")
			.timeout(StdDuration::from_secs(15))
			.build()
			.expect("Config should build.");

		assert_eq!(config.base_url.as_str(), "https://api.pesantren.test/api/v1/");
		assert_eq!(
			config.endpoint(&config.refresh_path).expect("Refresh path should join.").as_str(),
			"https://api.pesantren.test/api/v1/auth/refresh"
		);
		assert_eq!(
			config.endpoint("santri?page=2").expect("Resource path should join.").as_str(),
			"https://api.pesantren.test/api/v1/santri?page=2"
		);
		assert_eq!(config.timeout(), Some(StdDuration::from_secs(15)));
	}

	#[test]
	fn builder_rejects_bad_schemes_and_absolute_paths() {
		let err = GatewayConfig::builder(url("ftp://files.pesantren.test/"))
			.build()
			.expect_err("FTP base URL should be rejected.");

		assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));

		let err = GatewayConfig::builder(url("https://api.pesantren.test/"))
			.login_path("https://evil.test/login")
			.build()
			.expect_err("Absolute login path should be rejected.");

		assert!(matches!(err, ConfigError::InvalidEndpointPath { endpoint: "login", .. }));

		let err = GatewayConfig::builder(url("mailto:admin@pesantren.test"))
			.build()
			.expect_err("Non-base URL should be rejected.");

		assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
	}

	#[test]
	fn json_file_fills_defaults() {
		let path = env::temp_dir().join(format!(
			"pesantren_session_config_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		));

		fs::write(&path, br#"{"base_url":"http://localhost:8000/api","timeout_ms":5000}"#)
			.expect("Failed to write config fixture.");

		let config = GatewayConfig::from_json_file(&path).expect("Config file should load.");

		fs::remove_file(&path).expect("Failed to remove config fixture.");

		assert_eq!(config.base_url.as_str(), "http://localhost:8000/api/");
		assert_eq!(config.login_path, "login");
		assert_eq!(config.logout_path, "logout");
		assert_eq!(config.timeout_ms, Some(5000));
	}
}
