//! Identity-side models: the bearer credential, the authenticated user, and the session tying
//! them to an expiry instant.

pub mod secret;
pub mod session;
pub mod user;

pub use secret::*;
pub use session::*;
pub use user::*;
