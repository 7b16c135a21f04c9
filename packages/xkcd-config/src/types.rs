use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	pub api: Api,
	#[serde(default)]
	pub polling: Polling,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub history: History,
	pub storage: Storage,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: default_log_level() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Api {
	/// Scheme and authority of the backend, e.g. "http://127.0.0.1:28080".
	pub base_url: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Polling {
	#[serde(default = "default_poll_interval_ms")]
	pub interval_ms: u64,
}
impl Default for Polling {
	fn default() -> Self {
		Self { interval_ms: default_poll_interval_ms() }
	}
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Search {
	/// Optional. Forwarded as the `limit` query parameter when set.
	pub limit: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct History {
	#[serde(default = "default_history_capacity")]
	pub capacity: usize,
}
impl Default for History {
	fn default() -> Self {
		Self { capacity: default_history_capacity() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	/// JSON file backing the persistent key-value store.
	pub path: PathBuf,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_timeout_ms() -> u64 {
	DEFAULT_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
	DEFAULT_POLL_INTERVAL_MS
}

fn default_history_capacity() -> usize {
	DEFAULT_HISTORY_CAPACITY
}
