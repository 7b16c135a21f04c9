use std::{
	collections::BTreeMap,
	fs, io,
	path::PathBuf,
	sync::Mutex,
};

use crate::{Error, KeyValueStore, Result};

/// A JSON object on disk, rewritten in full on every mutation.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	entries: Mutex<BTreeMap<String, String>>,
}
impl FileStore {
	/// A missing file opens as an empty store. A file that is not a JSON object of strings is
	/// discarded and also opens empty.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let entries = match fs::read_to_string(&path) {
			Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
				tracing::warn!(
					path = %path.display(),
					error = %err,
					"Discarding unreadable store file."
				);

				BTreeMap::new()
			}),
			Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
			Err(err) => return Err(Error::Io { path, source: err }),
		};

		Ok(Self { path, entries: Mutex::new(entries) })
	}

	fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
		let payload = serde_json::to_string_pretty(entries)?;
		let tmp = self.path.with_extension("tmp");

		if let Some(parent) = self.path.parent()
			&& !parent.as_os_str().is_empty()
		{
			fs::create_dir_all(parent)
				.map_err(|err| Error::Io { path: parent.to_path_buf(), source: err })?;
		}

		fs::write(&tmp, payload).map_err(|err| Error::Io { path: tmp.clone(), source: err })?;
		fs::rename(&tmp, &self.path)
			.map_err(|err| Error::Io { path: self.path.clone(), source: err })?;

		Ok(())
	}
}

impl KeyValueStore for FileStore {
	fn get(&self, key: &str) -> Result<Option<String>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		Ok(entries.get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let mut next = entries.clone();

		next.insert(key.to_string(), value.to_string());
		self.persist(&next)?;

		*entries = next;

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		if !entries.contains_key(key) {
			return Ok(());
		}

		let mut next = entries.clone();

		next.remove(key);
		self.persist(&next)?;

		*entries = next;

		Ok(())
	}
}
