//! Thread-safe in-memory [`SessionStorage`] for tests and embedded use.

// self
use crate::{
	_prelude::*,
	store::{PersistedSession, SessionStorage, StoreError},
};

/// Keeps the persisted session in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(Arc<RwLock<Option<PersistedSession>>>);
impl MemoryStorage {
	/// Creates storage that already holds `session`, mimicking a page reload.
	pub fn with_session(session: PersistedSession) -> Self {
		Self(Arc::new(RwLock::new(Some(session))))
	}

	/// Returns the raw stored value without going through the trait.
	pub fn snapshot(&self) -> Option<PersistedSession> {
		self.0.read().clone()
	}
}
impl SessionStorage for MemoryStorage {
	fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
		Ok(self.0.read().clone())
	}

	fn persist(&self, session: &PersistedSession) -> Result<(), StoreError> {
		*self.0.write() = Some(session.clone());

		Ok(())
	}

	fn erase(&self) -> Result<(), StoreError> {
		self.0.write().take();

		Ok(())
	}
}
