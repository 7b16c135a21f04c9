use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::{ApiClient, SearchResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchState {
	pub query: String,
	pub results: Option<SearchResult>,
	pub loading: bool,
	pub error_message: String,
}

/// Single-slot search. Overlapping calls are allowed; only the most recently issued one may
/// write its outcome, so a slow earlier response can never replace a newer one.
pub struct SearchController {
	api: ApiClient,
	limit: Option<u32>,
	latest: AtomicU64,
	state: watch::Sender<SearchState>,
}
impl SearchController {
	pub fn new(api: ApiClient) -> Self {
		Self {
			api,
			limit: None,
			latest: AtomicU64::new(0),
			state: watch::Sender::new(SearchState::default()),
		}
	}

	pub fn from_config(api: ApiClient, cfg: &xkcd_config::Search) -> Self {
		Self { limit: cfg.limit, ..Self::new(api) }
	}

	pub fn state(&self) -> SearchState {
		self.state.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<SearchState> {
		self.state.subscribe()
	}

	pub fn query(&self) -> String {
		self.state.borrow().query.clone()
	}

	pub fn set_query(&self, query: impl Into<String>) {
		let query = query.into();

		self.state.send_if_modified(|state| {
			if state.query == query {
				return false;
			}

			state.query = query;

			true
		});
	}

	pub async fn search(&self) {
		let query = self.query();

		if query.is_empty() {
			return;
		}

		let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

		self.state.send_modify(|state| {
			state.loading = true;
			state.error_message.clear();
			state.results = None;
		});

		let _loading = LoadingGuard { controller: self, seq };
		let outcome = self.api.search(&query, self.limit).await;

		self.state.send_if_modified(|state| {
			if !self.is_latest(seq) {
				tracing::debug!(seq, "Discarding superseded search response.");

				return false;
			}

			match outcome {
				Ok(results) => {
					tracing::debug!(seq, comics = results.comics.len(), "Search completed.");

					state.results = Some(results);
				},
				Err(err) => {
					tracing::debug!(seq, error = %err, "Search failed.");

					state.error_message = err.to_string();
				},
			}

			true
		});
	}

	fn is_latest(&self, seq: u64) -> bool {
		self.latest.load(Ordering::SeqCst) == seq
	}
}

/// Clears `loading` when the newest search ends, whether it completes or is dropped mid-flight.
struct LoadingGuard<'a> {
	controller: &'a SearchController,
	seq: u64,
}
impl Drop for LoadingGuard<'_> {
	fn drop(&mut self) {
		self.controller.state.send_if_modified(|state| {
			if !self.controller.is_latest(self.seq) || !state.loading {
				return false;
			}

			state.loading = false;

			true
		});
	}
}
