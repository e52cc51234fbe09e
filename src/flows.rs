//! Session flows powered by the authenticated gateway.

pub mod login;
pub mod logout;
pub mod refresh;
pub mod request;

pub use login::*;
pub use refresh::*;

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::GatewayConfig,
	credentials::CredentialStore,
	error::ConfigError,
	http::{ApiRequest, ApiResponse, ApiTransport},
	resource::ResourceCache,
};

// Anything longer than a decade is a server bug, not a session length.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestTransport>;

/// The single choke point for API traffic.
///
/// The gateway owns the transport, the shared credential store, and the refresh guard, so
/// every request gets the same header policy and the same retry-on-401 behavior. Cloning is
/// cheap and clones share the guard, metrics, and resource cache, which keeps the
/// single-flight guarantee intact across clones.
pub struct Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// HTTP transport used for every outbound request.
	pub transport: Arc<T>,
	/// Session state shared with the expiry monitor and route guard.
	pub credentials: Arc<CredentialStore>,
	/// API origin and auth endpoint paths.
	pub config: GatewayConfig,
	/// Serializes silent refreshes.
	pub refresh_guard: Arc<RefreshGuard>,
	/// Counters for real refresh round-trips.
	pub refresh_metrics: Arc<RefreshMetrics>,
	/// Cached pages for list screens.
	pub cache: Arc<ResourceCache>,
}
impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a gateway over a caller-provided transport.
	pub fn with_transport(
		config: GatewayConfig,
		credentials: Arc<CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			credentials,
			config,
			refresh_guard: Default::default(),
			refresh_metrics: Default::default(),
			cache: Default::default(),
		}
	}

	/// Sends a request exactly once, without 401 interception.
	pub(crate) async fn dispatch(
		&self,
		request: &ApiRequest,
		bearer: Option<&AccessToken>,
	) -> Result<ApiResponse> {
		self.transport.execute(&self.config, request, bearer).await.map_err(Error::from)
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestTransport> {
	/// Creates a gateway with its own reqwest client configured from `config`.
	pub fn new(config: GatewayConfig, credentials: Arc<CredentialStore>) -> Result<Self> {
		let transport = ReqwestTransport::from_config(&config)?;

		Ok(Self::with_transport(config, credentials, transport))
	}
}
impl<T> Clone for Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			credentials: self.credentials.clone(),
			config: self.config.clone(),
			refresh_guard: self.refresh_guard.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			cache: self.cache.clone(),
		}
	}
}
impl<T> Debug for Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("base_url", &self.config.base_url.as_str())
			.field("authenticated", &self.credentials.is_authenticated())
			.field("refresh_locked", &self.refresh_guard.is_locked())
			.finish()
	}
}

/// Validates a server-supplied `expires_in` (seconds) and converts it into a TTL.
pub(crate) fn ttl_from_expires_in(expires_in: i64) -> Result<Duration, ConfigError> {
	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn);
	}
	if expires_in > MAX_TTL_SECS {
		return Err(ConfigError::ExpiresInOutOfRange);
	}

	Ok(Duration::seconds(expires_in))
}

/// Rejects blank tokens returned by the auth endpoints.
pub(crate) fn require_token(raw: String) -> Result<AccessToken, ConfigError> {
	AccessToken::non_empty(raw).ok_or(ConfigError::EmptyAccessToken)
}
