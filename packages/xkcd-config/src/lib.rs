mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Api, Config, DEFAULT_HISTORY_CAPACITY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS, History,
	Polling, Search, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		ParseFailure::Toml(source) => Error::ParseConfig { path: path.to_path_buf(), source },
		ParseFailure::Invalid(err) => err,
	})
}

/// Parses, normalizes, and validates a config document that is already in memory.
pub fn from_toml_str(raw: &str) -> Result<Config> {
	parse(raw).map_err(|err| match err {
		ParseFailure::Toml(source) => Error::ParseConfig { path: "<memory>".into(), source },
		ParseFailure::Invalid(err) => err,
	})
}

pub fn validate(cfg: &Config) -> Result<()> {
	let base_url = cfg.api.base_url.trim();

	if base_url.is_empty() {
		return Err(Error::invalid("api.base_url", "must be non-empty."));
	}
	if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
		return Err(Error::invalid("api.base_url", "must start with http:// or https://."));
	}
	if cfg.api.timeout_ms == 0 {
		return Err(Error::invalid("api.timeout_ms", "must be greater than zero."));
	}
	if cfg.polling.interval_ms == 0 {
		return Err(Error::invalid("polling.interval_ms", "must be greater than zero."));
	}
	if cfg.history.capacity == 0 {
		return Err(Error::invalid("history.capacity", "must be greater than zero."));
	}
	if cfg.search.limit == Some(0) {
		return Err(Error::invalid("search.limit", "must be greater than zero when set."));
	}
	if cfg.storage.path.as_os_str().is_empty() {
		return Err(Error::invalid("storage.path", "must be non-empty."));
	}

	Ok(())
}

enum ParseFailure {
	Toml(toml::de::Error),
	Invalid(Error),
}

fn parse(raw: &str) -> std::result::Result<Config, ParseFailure> {
	let mut cfg: Config = toml::from_str(raw).map_err(ParseFailure::Toml)?;

	normalize(&mut cfg);

	validate(&cfg).map_err(ParseFailure::Invalid)?;

	Ok(cfg)
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.api.base_url.trim().trim_end_matches('/');

	if trimmed.len() != cfg.api.base_url.len() {
		cfg.api.base_url = trimmed.to_string();
	}
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
