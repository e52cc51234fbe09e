//! Transport primitives for API calls.
//!
//! [`ApiTransport`] is the gateway's only dependency on an HTTP stack. The gateway hands it a
//! fully described [`ApiRequest`] plus the bearer token to attach, and gets back an
//! [`ApiResponse`] for every HTTP status; only failures that produced no response at all
//! (DNS, TCP, TLS, timeouts) surface as [`TransportError`]. Requests own their bodies so the
//! gateway can re-send them after a silent refresh.

// self
use crate::{_prelude::*, auth::AccessToken, config::GatewayConfig, error::TransportError};

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// HTTP stack used by the gateway.
///
/// Implementations must attach, on every call:
/// - `Authorization: Bearer <token>` when `bearer` is provided;
/// - `Accept: application/json`;
/// - `Content-Type: application/json` on everything except [`RequestBody::Multipart`]. Uploads
///   carry the transport's own `multipart/form-data` boundary type and must not be overridden.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` against `config.base_url`.
	fn execute<'a>(
		&'a self,
		config: &'a GatewayConfig,
		request: &'a ApiRequest,
		bearer: Option<&'a AccessToken>,
	) -> TransportFuture<'a>;
}

/// HTTP verbs used by the dashboard API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl HttpMethod {
	/// Upper-case method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One file or text field of a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartPart {
	/// Form field name.
	pub name: String,
	/// File name reported to the server; `None` for plain text fields.
	pub file_name: Option<String>,
	/// MIME type of the part, when known.
	pub mime: Option<String>,
	/// Raw part content.
	pub bytes: Vec<u8>,
}
impl MultipartPart {
	/// Plain text field.
	pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), file_name: None, mime: None, bytes: value.into().into_bytes() }
	}

	/// File field.
	pub fn file(
		name: impl Into<String>,
		file_name: impl Into<String>,
		mime: impl Into<String>,
		bytes: impl Into<Vec<u8>>,
	) -> Self {
		Self {
			name: name.into(),
			file_name: Some(file_name.into()),
			mime: Some(mime.into()),
			bytes: bytes.into(),
		}
	}
}

/// Request payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestBody {
	/// No body.
	#[default]
	Empty,
	/// Pre-encoded JSON document.
	Json(Vec<u8>),
	/// Raw `multipart/form-data` upload.
	Multipart(Vec<MultipartPart>),
}

/// Self-contained description of an API call, cloneable for a single retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP verb.
	pub method: HttpMethod,
	/// Path relative to the configured base URL.
	pub path: String,
	/// Query string pairs appended in order.
	pub query: Vec<(String, String)>,
	/// Payload.
	pub body: RequestBody,
}
impl ApiRequest {
	/// Creates a body-less request.
	pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), query: Vec::new(), body: RequestBody::Empty }
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(HttpMethod::Get, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(HttpMethod::Delete, path)
	}

	/// `POST path` with a JSON body.
	pub fn post_json<T>(path: impl Into<String>, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Self::new(HttpMethod::Post, path).with_json(body)
	}

	/// `PUT path` with a JSON body.
	pub fn put_json<T>(path: impl Into<String>, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Self::new(HttpMethod::Put, path).with_json(body)
	}

	/// `PATCH path` with a JSON body.
	pub fn patch_json<T>(path: impl Into<String>, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Self::new(HttpMethod::Patch, path).with_json(body)
	}

	/// `POST path` with a multipart upload.
	pub fn upload(path: impl Into<String>, parts: Vec<MultipartPart>) -> Self {
		Self { body: RequestBody::Multipart(parts), ..Self::new(HttpMethod::Post, path) }
	}

	/// Replaces the body with the JSON encoding of `body`.
	pub fn with_json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		self.body = RequestBody::Json(serde_json::to_vec(body).map_err(Error::Encode)?);

		Ok(self)
	}

	/// Appends a query pair.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends several query pairs.
	pub fn with_query_pairs<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.query.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}
}

/// Response as received from the API, whatever its status.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lower-cased names.
	pub headers: BTreeMap<String, String>,
	/// Raw body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Assembles a response from its parts; header names are lower-cased.
	pub fn from_parts(status: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
		let headers = headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();

		Self { status, headers, body }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for 401.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Body decoded as UTF-8 (lossy).
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Converts non-2xx responses into [`Error::Api`], passing successes through.
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Api { status: self.status, message: self.error_message() })
		}
	}

	/// Decodes a successful JSON body; non-2xx statuses become [`Error::Api`].
	pub fn json<T>(&self) -> Result<T>
	where
		T: for<'de> Deserialize<'de>,
	{
		if !self.is_success() {
			return Err(Error::Api { status: self.status, message: self.error_message() });
		}

		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { source, status: self.status })
	}

	/// Extracts the Laravel-style `message` field, falling back to a generic description.
	pub fn error_message(&self) -> String {
		#[derive(Deserialize)]
		struct ErrorBody {
			message: Option<String>,
		}

		serde_json::from_slice::<ErrorBody>(&self.body)
			.ok()
			.and_then(|body| body.message)
			.filter(|message| !message.trim().is_empty())
			.unwrap_or_else(|| format!("HTTP {}", self.status))
	}
}
impl Debug for ApiResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiResponse")
			.field("status", &self.status)
			.field("headers", &self.headers.len())
			.field("body_len", &self.body.len())
			.finish()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client honoring the configured user agent.
	pub fn from_config(config: &GatewayConfig) -> Result<Self> {
		let client = ReqwestClient::builder()
			.user_agent(config.user_agent.clone())
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(Self(client))
	}

	/// Translates an [`ApiRequest`] into a reqwest request with the gateway's headers.
	pub fn build_request(
		&self,
		config: &GatewayConfig,
		request: &ApiRequest,
		bearer: Option<&AccessToken>,
	) -> Result<reqwest::Request> {
		// crates.io
		use reqwest::{
			Method,
			header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
			multipart::{Form, Part},
		};

		let method = match request.method {
			HttpMethod::Get => Method::GET,
			HttpMethod::Post => Method::POST,
			HttpMethod::Put => Method::PUT,
			HttpMethod::Patch => Method::PATCH,
			HttpMethod::Delete => Method::DELETE,
		};
		let url = config.endpoint(&request.path)?;
		let mut builder = self.0.request(method, url).header(ACCEPT, "application/json");

		if !request.query.is_empty() {
			builder = builder.query(&request.query);
		}
		if let Some(token) = bearer {
			builder = builder.header(AUTHORIZATION, token.bearer_header());
		}
		if let Some(timeout) = config.timeout() {
			builder = builder.timeout(timeout);
		}

		builder = match &request.body {
			RequestBody::Empty => builder.header(CONTENT_TYPE, "application/json"),
			RequestBody::Json(bytes) =>
				builder.header(CONTENT_TYPE, "application/json").body(bytes.clone()),
			RequestBody::Multipart(parts) => {
				let mut form = Form::new();

				for part in parts {
					let mut body = Part::bytes(part.bytes.clone());

					if let Some(file_name) = &part.file_name {
						body = body.file_name(file_name.clone());
					}
					if let Some(mime) = &part.mime {
						body = body.mime_str(mime).map_err(TransportError::from)?;
					}

					form = form.part(part.name.clone(), body);
				}

				builder.multipart(form)
			},
		};

		builder.build().map_err(|e| TransportError::from(e).into())
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute<'a>(
		&'a self,
		config: &'a GatewayConfig,
		request: &'a ApiRequest,
		bearer: Option<&'a AccessToken>,
	) -> TransportFuture<'a> {
		Box::pin(async move {
			let built = self.build_request(config, request, bearer).map_err(|err| match err {
				Error::Transport(inner) => inner,
				other => TransportError::network(other),
			})?;
			let response = self.0.execute(built).await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse::from_parts(status, headers, body))
		})
	}
}
