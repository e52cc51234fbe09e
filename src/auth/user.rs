//! Authenticated user record returned by the login endpoint.

// self
use crate::_prelude::*;

/// Role name as reported by the API (e.g. `admin`, `ustadz`, `parent`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);
impl RoleName {
	/// Role assigned to guardians of enrolled students.
	pub const PARENT: &'static str = "parent";

	/// Wraps a role name.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the role name as reported by the API.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Case-insensitive comparison against another role label.
	pub fn matches(&self, other: &str) -> bool {
		self.0.trim().eq_ignore_ascii_case(other.trim())
	}
}
impl Debug for RoleName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Debug::fmt(&self.0, f)
	}
}
impl Display for RoleName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Identity plus role list. Every other field the API sends is kept verbatim in `extra` so the
/// record survives a trip through durable storage unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
	/// Server-side user identifier.
	pub id: u64,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Role names granted to the user.
	#[serde(default, deserialize_with = "deserialize_roles")]
	pub roles: Vec<RoleName>,
	/// Remaining fields, preserved as-is.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl UserRecord {
	/// Creates a record with the provided roles and no extra fields.
	pub fn new<'a>(
		id: u64,
		name: impl Into<String>,
		roles: impl IntoIterator<Item = &'a str>,
	) -> Self {
		Self {
			id,
			name: name.into(),
			roles: roles.into_iter().map(RoleName::new).collect(),
			extra: Default::default(),
		}
	}

	/// Returns `true` if any granted role matches `role` (case-insensitive).
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|granted| granted.matches(role))
	}

	/// Returns `true` for guardian accounts, which get their own dashboard.
	pub fn is_parent(&self) -> bool {
		self.has_role(RoleName::PARENT)
	}
}

/// Accepts both `["admin"]` and the `[{"name": "admin", ...}]` shape role packages emit.
fn deserialize_roles<'de, D>(deserializer: D) -> Result<Vec<RoleName>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum RawRole {
		Name(String),
		Object { name: String },
	}

	let raw = <Option<Vec<RawRole>>>::deserialize(deserializer)?.unwrap_or_default();

	Ok(raw
		.into_iter()
		.map(|role| match role {
			RawRole::Name(name) | RawRole::Object { name } => RoleName::new(name),
		})
		.collect())
}
