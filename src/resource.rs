//! Paginated list resources (santri, pegawai, tagihan, ...) and their page cache.
//!
//! List endpoints answer with the Laravel paginator shape. Pages are cached per gateway as raw
//! bodies keyed by resource and query, and every entry remembers the user it was fetched for, so
//! a cached page is never served to a different account.

// self
use crate::{
	_prelude::*,
	flows::Gateway,
	http::{ApiRequest, ApiResponse, ApiTransport},
};

/// Query for one page of a list resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageQuery {
	/// 1-based page number.
	pub page: u32,
	/// Rows per page.
	pub per_page: u32,
	/// Free-text search term; blank terms are not sent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub search: Option<String>,
	/// Extra column filters, sent verbatim.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub filters: BTreeMap<String, String>,
}
impl PageQuery {
	/// Default page size of the dashboard tables.
	pub const DEFAULT_PER_PAGE: u32 = 10;

	/// Query for `page` with the default page size.
	pub fn page(page: u32) -> Self {
		Self { page: page.max(1), ..Default::default() }
	}

	/// Sets the page size; zero becomes one.
	pub fn with_per_page(mut self, per_page: u32) -> Self {
		self.per_page = per_page.max(1);

		self
	}

	/// Sets the search term.
	pub fn with_search(mut self, search: impl Into<String>) -> Self {
		self.search = Some(search.into());

		self
	}

	/// Adds a column filter.
	pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.insert(key.into(), value.into());

		self
	}

	/// Query string pairs in a stable order.
	pub fn to_pairs(&self) -> Vec<(String, String)> {
		let mut pairs = vec![
			("page".to_owned(), self.page.max(1).to_string()),
			("per_page".to_owned(), self.per_page.max(1).to_string()),
		];

		if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
			pairs.push(("search".to_owned(), search.to_owned()));
		}

		pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));

		pairs
	}
}
impl Default for PageQuery {
	fn default() -> Self {
		Self { page: 1, per_page: Self::DEFAULT_PER_PAGE, search: None, filters: BTreeMap::new() }
	}
}

/// One page of a list resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
	/// Rows on this page.
	pub data: Vec<T>,
	/// 1-based index of this page.
	pub current_page: u32,
	/// Index of the last page; `1` for empty lists.
	pub last_page: u32,
	/// Requested page size.
	#[serde(deserialize_with = "de_u32_lenient")]
	pub per_page: u32,
	/// Total rows across all pages.
	pub total: u64,
}
impl<T> Page<T> {
	/// Returns `true` when a later page exists.
	pub fn has_next(&self) -> bool {
		self.current_page < self.last_page
	}

	/// Returns `true` when an earlier page exists.
	pub fn has_previous(&self) -> bool {
		self.current_page > 1
	}
}

// Laravel echoes `per_page` back as a string when it came from the query string.
fn de_u32_lenient<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Number(u32),
		Text(String),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Number(n) => Ok(n),
		Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
	}
}

#[derive(Clone, Debug)]
struct CachedPage {
	owner: u64,
	body: Vec<u8>,
}

/// Per-gateway cache of raw page bodies.
#[derive(Debug, Default)]
pub struct ResourceCache {
	pages: RwLock<HashMap<(String, PageQuery), CachedPage>>,
}
impl ResourceCache {
	/// Returns the cached body for `resource`/`query` if it was fetched for `owner`.
	pub fn get(&self, owner: u64, resource: &str, query: &PageQuery) -> Option<Vec<u8>> {
		self.pages
			.read()
			.get(&(resource.to_owned(), query.clone()))
			.filter(|cached| cached.owner == owner)
			.map(|cached| cached.body.clone())
	}

	/// Stores a page body fetched for `owner`.
	pub fn insert(&self, owner: u64, resource: &str, query: PageQuery, body: Vec<u8>) {
		self.pages.write().insert((resource.to_owned(), query), CachedPage { owner, body });
	}

	/// Drops every cached page of `resource`.
	pub fn invalidate(&self, resource: &str) {
		self.pages.write().retain(|(cached, _), _| cached != resource);
	}

	/// Drops everything.
	pub fn clear(&self) {
		self.pages.write().clear();
	}

	/// Number of cached pages.
	pub fn len(&self) -> usize {
		self.pages.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.pages.read().is_empty()
	}
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Fetches one page of `resource`, bypassing the cache.
	pub async fn fetch_page<R>(&self, resource: &str, query: &PageQuery) -> Result<Page<R>>
	where
		R: for<'de> Deserialize<'de>,
	{
		let response = self.fetch_page_response(resource, query).await?;
		let page = response.json()?;

		if let Some(user) = self.credentials.user() {
			self.cache.insert(user.id, resource, query.clone(), response.body);
		}

		Ok(page)
	}

	/// Returns a cached page of `resource` when one exists for the signed-in user, fetching it
	/// otherwise.
	///
	/// Anonymous callers are never served from the cache; a cache found while signed out is
	/// dropped, which also covers sessions ended by the expiry monitor.
	pub async fn cached_page<R>(&self, resource: &str, query: &PageQuery) -> Result<Page<R>>
	where
		R: for<'de> Deserialize<'de>,
	{
		let Some(user) = self.credentials.user() else {
			self.cache.clear();

			return self.fetch_page(resource, query).await;
		};

		if let Some(body) = self.cache.get(user.id, resource, query) {
			return ApiResponse::from_parts(200, Default::default(), body).json();
		}

		self.fetch_page(resource, query).await
	}

	/// Sends a create/update/delete request for `resource` and invalidates its cached pages
	/// when the server accepted it.
	pub async fn send_mutation(&self, resource: &str, request: ApiRequest) -> Result<ApiResponse> {
		let response = self.send(request).await?;

		if response.is_success() {
			self.cache.invalidate(resource);
		}

		Ok(response)
	}

	async fn fetch_page_response(&self, resource: &str, query: &PageQuery) -> Result<ApiResponse> {
		self.send(ApiRequest::get(resource).with_query_pairs(query.to_pairs())).await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedReply, ScriptedTransport, scripted_gateway, seed_session};

	#[derive(Debug, PartialEq, Deserialize)]
	struct Santri {
		nis: String,
		name: String,
	}

	const SANTRI_PAGE: &str = r#"{
		"current_page": 2,
		"data": [{"nis":"1201","name":"Ahmad"},{"nis":"1202","name":"Zaid"}],
		"last_page": 3,
		"per_page": "2",
		"total": 6
	}"#;

	fn santri_api() -> ScriptedTransport {
		ScriptedTransport::new(|request, _| match (request.method, request.path.as_str()) {
			(crate::http::HttpMethod::Get, "santri") =>
				ScriptedReply::Respond(200, SANTRI_PAGE.into()),
			_ => ScriptedReply::Respond(201, r#"{"message":"Created"}"#.into()),
		})
	}

	#[test]
	fn query_pairs_clamp_zero_and_skip_blank_search() {
		let query = PageQuery { page: 0, per_page: 0, ..Default::default() }
			.with_search("   ")
			.with_filter("kelas", "7A")
			.with_filter("asrama", "Al-Fatih");

		assert_eq!(
			query.to_pairs(),
			vec![
				("page".to_owned(), "1".to_owned()),
				("per_page".to_owned(), "1".to_owned()),
				("asrama".to_owned(), "Al-Fatih".to_owned()),
				("kelas".to_owned(), "7A".to_owned()),
			]
		);
		assert_eq!(PageQuery::page(0).page, 1);
		assert_eq!(PageQuery::page(3).with_per_page(0).per_page, 1);
	}

	#[test]
	fn page_navigation_flags() {
		let page: Page<Santri> = serde_json::from_str(SANTRI_PAGE).expect("Page should decode.");

		assert_eq!(page.per_page, 2);
		assert!(page.has_next());
		assert!(page.has_previous());

		let only: Page<Santri> = serde_json::from_str(
			r#"{"current_page":1,"data":[],"last_page":1,"per_page":10,"total":0}"#,
		)
		.expect("Empty page should decode.");

		assert!(!only.has_next());
		assert!(!only.has_previous());
	}

	#[test]
	fn cache_entries_belong_to_their_owner() {
		let cache = ResourceCache::default();
		let query = PageQuery::default();

		cache.insert(1, "santri", query.clone(), b"a".to_vec());
		cache.insert(1, "pegawai", query.clone(), b"b".to_vec());

		assert_eq!(cache.get(1, "santri", &query), Some(b"a".to_vec()));
		assert_eq!(cache.get(2, "santri", &query), None);

		cache.invalidate("santri");

		assert_eq!(cache.get(1, "santri", &query), None);
		assert_eq!(cache.len(), 1);

		cache.clear();

		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn cached_page_reads_through_and_mutations_invalidate() {
		let (gateway, transport, credentials) = scripted_gateway(santri_api());

		seed_session(&credentials, "valid");

		let query = PageQuery::page(2).with_per_page(2);
		let first: Page<Santri> =
			gateway.cached_page("santri", &query).await.expect("First page load should succeed.");
		let second: Page<Santri> =
			gateway.cached_page("santri", &query).await.expect("Cached page load should succeed.");

		assert_eq!(first, second);
		assert_eq!(first.data[0], Santri { nis: "1201".into(), name: "Ahmad".into() });
		assert_eq!(transport.calls_to("santri"), 1);

		let created = gateway
			.send_mutation(
				"santri",
				ApiRequest::post_json("santri", &serde_json::json!({ "nis": "1203" }))
					.expect("Body should encode."),
			)
			.await
			.expect("Create should complete.");

		assert_eq!(created.status, 201);
		assert!(gateway.cache.is_empty());

		let _: Page<Santri> =
			gateway.cached_page("santri", &query).await.expect("Reload should succeed.");

		assert_eq!(
			transport
				.seen()
				.iter()
				.filter(|seen| seen.path == "santri")
				.count(),
			3
		);
	}

	#[tokio::test]
	async fn signed_out_callers_never_see_cached_pages() {
		let (gateway, transport, credentials) = scripted_gateway(santri_api());

		seed_session(&credentials, "valid");

		let query = PageQuery::default();
		let _: Page<Santri> = gateway.fetch_page("santri", &query).await.expect("Load should succeed.");

		assert_eq!(gateway.cache.len(), 1);

		// Session ended behind the gateway's back, as the expiry monitor does.
		credentials.clear();

		let _: Page<Santri> =
			gateway.cached_page("santri", &query).await.expect("Anonymous load should complete.");

		assert!(gateway.cache.is_empty());
		assert_eq!(transport.calls_to("santri"), 2);
	}
}
