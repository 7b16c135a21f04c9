//! Persistent key-value storage shared by the client controllers.
//!
//! The store mirrors the semantics of browser local storage: string keys, string values,
//! last writer wins.

mod error;
mod file;
mod session;

pub use error::{Error, Result};
pub use file::FileStore;
pub use session::{SessionContext, TOKEN_KEY};

use std::{collections::HashMap, sync::Mutex};

pub trait KeyValueStore
where
	Self: Send + Sync,
{
	fn get(&self, key: &str) -> Result<Option<String>>;

	fn set(&self, key: &str, value: &str) -> Result<()>;

	/// Removing an absent key is not an error.
	fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<HashMap<String, String>>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		Ok(entries.get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.insert(key.to_string(), value.to_string());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.remove(key);

		Ok(())
	}
}
