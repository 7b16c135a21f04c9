use std::sync::Arc;

use crate::{KeyValueStore, Result};

pub const TOKEN_KEY: &str = "token";

/// Token access handed to each controller at construction.
///
/// Clones share the same underlying store, so a logout performed through one controller is
/// visible to every other holder on its next read.
#[derive(Clone)]
pub struct SessionContext {
	store: Arc<dyn KeyValueStore>,
}
impl SessionContext {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	/// Empty tokens are treated as absent.
	pub fn token(&self) -> Result<Option<String>> {
		Ok(self.store.get(TOKEN_KEY)?.filter(|token| !token.is_empty()))
	}

	pub fn set_token(&self, token: &str) -> Result<()> {
		self.store.set(TOKEN_KEY, token)
	}

	pub fn clear(&self) -> Result<()> {
		self.store.remove(TOKEN_KEY)
	}
}
impl std::fmt::Debug for SessionContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionContext").finish_non_exhaustive()
	}
}
