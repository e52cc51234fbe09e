//! Route guard and post-login landing screens.

// self
use crate::{
	_prelude::*,
	auth::UserRecord,
	credentials::{CredentialStore, SessionEvent},
};

/// Screens the session layer redirects to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Landing {
	/// Public landing page shown to anonymous visitors.
	Public,
	/// Login screen, used after an expiry.
	Login,
	/// Dashboard for staff roles (admin, ustadz, bendahara, ...).
	StaffDashboard,
	/// Dashboard for guardians of enrolled students.
	ParentDashboard,
}
impl Landing {
	/// Picks the dashboard for a freshly authenticated user.
	pub fn for_user(user: &UserRecord) -> Self {
		if user.is_parent() { Self::ParentDashboard } else { Self::StaffDashboard }
	}

	/// Client-side route path.
	pub const fn path(self) -> &'static str {
		match self {
			Self::Public => "/",
			Self::Login => "/login",
			Self::StaffDashboard => "/dashboard",
			Self::ParentDashboard => "/parent/dashboard",
		}
	}
}
impl Display for Landing {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.path())
	}
}

/// Decision for a protected screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
	/// Render the protected subtree.
	Render,
	/// Navigate elsewhere instead.
	Redirect(Landing),
}

/// Synchronous gate in front of protected screens; reads the credential store and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteGuard;
impl RouteGuard {
	/// Renders when authenticated, otherwise redirects to the public landing page.
	pub fn check(credentials: &CredentialStore) -> Route {
		Self::check_at(credentials, OffsetDateTime::now_utc())
	}

	/// Same as [`check`](Self::check) at the provided instant.
	pub fn check_at(credentials: &CredentialStore, now: OffsetDateTime) -> Route {
		if credentials.is_authenticated_at(now) {
			Route::Render
		} else {
			Route::Redirect(Landing::Public)
		}
	}
}

impl SessionEvent {
	/// Screen the UI should navigate to after this event, if any.
	pub fn redirect(&self) -> Option<Landing> {
		match self {
			Self::LoggedIn { user } => Some(Landing::for_user(user)),
			Self::Expired { .. } => Some(Landing::Login),
			Self::LoggedOut => Some(Landing::Public),
			Self::Refreshed => None,
		}
	}
}
