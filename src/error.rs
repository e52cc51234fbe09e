//! Session-level error types shared across the gateway, flows, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable session storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem or a malformed server contract.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// API answered with a non-success status; the gateway passes these through untouched.
	#[error("API responded with status {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Server-supplied message, or a generic description when the body carried none.
		message: String,
	},
	/// Response body did not match the expected JSON shape.
	#[error("API returned malformed JSON.")]
	Decode {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Request body could not be encoded as JSON.
	#[error("Request body could not be encoded as JSON.")]
	Encode(#[source] serde_json::Error),
	/// Silent refresh failed and the session was cleared; the user must log in again.
	#[error("Session expired, please log in again.")]
	SessionExpired,
	/// No session is present for an operation that requires one.
	#[error("No authenticated session is available.")]
	NotAuthenticated,
}
impl Error {
	/// Returns the HTTP status attached to this error, when one exists.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api { status, .. } | Self::Decode { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when the error means the user has to authenticate again.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::SessionExpired | Self::NotAuthenticated)
			|| self.status() == Some(401)
	}
}

/// Configuration and contract failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot act as a base for relative API paths.
	#[error("Base URL `{url}` cannot be used as a base for API paths.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// Base URL uses a scheme other than http or https.
	#[error("Base URL scheme `{scheme}` is not supported.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// Endpoint path is absolute or otherwise unusable.
	#[error("Endpoint path `{path}` for {endpoint} must be relative.")]
	InvalidEndpointPath {
		/// Endpoint label (login, refresh, logout).
		endpoint: &'static str,
		/// Offending path.
		path: String,
	},
	/// Request path could not be joined onto the base URL.
	#[error("Request path `{path}` could not be joined onto the base URL.")]
	InvalidRequestPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Configuration file could not be read or parsed.
	#[error("Configuration file `{path}` could not be loaded: {message}.")]
	File {
		/// File path.
		path: String,
		/// Human-readable failure.
		message: String,
	},
	/// Auth endpoint response omitted `expires_in`.
	#[error("Auth response is missing expires_in.")]
	MissingExpiresIn,
	/// Auth endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Auth endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Auth endpoint returned an empty access token.
	#[error("Auth response carried an empty access token.")]
	EmptyAccessToken,
	/// Auth endpoint returned a token type other than bearer.
	#[error("Unsupported token type `{token_type}`.")]
	UnsupportedTokenType {
		/// Token type reported by the server.
		token_type: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request did not complete within the configured timeout.
	#[error("Request to the API timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn unauthorized_detection_covers_status_and_session_variants() {
		assert!(Error::SessionExpired.is_unauthorized());
		assert!(Error::NotAuthenticated.is_unauthorized());
		assert!(Error::Api { status: 401, message: "Unauthenticated".into() }.is_unauthorized());
		assert!(!Error::Api { status: 422, message: "Invalid".into() }.is_unauthorized());
	}

	#[test]
	fn transport_errors_keep_their_source() {
		let err: Error = TransportError::network(std::io::Error::other("reset")).into();
		let source = StdError::source(&err).expect("Transport error should expose its source.");

		assert_eq!(source.to_string(), "reset");
		assert_eq!(err.status(), None);
	}
}
