//! Bounded visit history persisted under the `history` key.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;

use xkcd_store::KeyValueStore;

use crate::{Comic, Result};

pub const HISTORY_KEY: &str = "history";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub id: i64,
	#[serde(default)]
	pub url: String,
	#[serde(rename = "date", alias = "visitedAt", with = "crate::time_serde")]
	pub visited_at: OffsetDateTime,
}

pub struct HistoryController {
	store: Arc<dyn KeyValueStore>,
	capacity: usize,
	entries: watch::Sender<Vec<HistoryEntry>>,
	/// Serializes read-modify-write cycles so concurrent adds do not lose visits.
	writes: Mutex<()>,
}
impl HistoryController {
	/// Loads the persisted collection immediately. A capacity of zero is treated as one.
	pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
		let controller = Self {
			store,
			capacity: capacity.max(1),
			entries: watch::Sender::new(Vec::new()),
			writes: Mutex::new(()),
		};

		controller.load();

		controller
	}

	pub fn from_config(store: Arc<dyn KeyValueStore>, cfg: &xkcd_config::History) -> Self {
		Self::new(store, cfg.capacity)
	}

	pub fn entries(&self) -> Vec<HistoryEntry> {
		self.entries.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<Vec<HistoryEntry>> {
		self.entries.subscribe()
	}

	/// Replaces in-memory state with the persisted collection. Unreadable data loads as empty.
	pub fn load(&self) {
		let loaded = match self.store.get(HISTORY_KEY) {
			Ok(Some(raw)) => serde_json::from_str::<Vec<HistoryEntry>>(&raw).unwrap_or_else(|err| {
				tracing::warn!(error = %err, "Discarding malformed history.");

				Vec::new()
			}),
			Ok(None) => Vec::new(),
			Err(err) => {
				tracing::warn!(error = %err, "Failed to read history.");

				Vec::new()
			},
		};

		self.entries.send_replace(loaded);
	}

	/// Records a visit. The collection is persisted first and mirrored in memory only after the
	/// write succeeded.
	pub fn add(&self, comic: &Comic) -> Result<()> {
		self.add_at(comic, OffsetDateTime::now_utc())
	}

	pub fn clear(&self) -> Result<()> {
		let _writing = self.writes.lock().unwrap_or_else(|err| err.into_inner());

		self.store.remove(HISTORY_KEY)?;
		self.entries.send_replace(Vec::new());

		Ok(())
	}

	fn add_at(&self, comic: &Comic, now: OffsetDateTime) -> Result<()> {
		let _writing = self.writes.lock().unwrap_or_else(|err| err.into_inner());
		let next = with_visit(&self.entries.borrow(), comic, now, self.capacity);
		let raw = serde_json::to_string(&next)?;

		// Readers keep seeing the previous collection until the write lands.
		self.store.set(HISTORY_KEY, &raw)?;
		self.entries.send_replace(next);

		Ok(())
	}
}

/// Most-recent-first, unique by id, at most `capacity` long.
fn with_visit(
	entries: &[HistoryEntry],
	comic: &Comic,
	now: OffsetDateTime,
	capacity: usize,
) -> Vec<HistoryEntry> {
	let mut next = Vec::with_capacity(capacity);

	next.push(HistoryEntry { id: comic.id, url: comic.url.clone(), visited_at: now });
	next.extend(entries.iter().filter(|entry| entry.id != comic.id).cloned());
	next.truncate(capacity);

	next
}
