use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read front-end config at {}.", .path.display())]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Front-end config at {} is not valid TOML.", .path.display())]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	/// `key` is the dotted `section.field` path of the rejected setting.
	#[error("Invalid `{key}`: {reason}")]
	Validation { key: &'static str, reason: String },
}
impl Error {
	pub(crate) fn invalid(key: &'static str, reason: &str) -> Self {
		Self::Validation { key, reason: reason.to_string() }
	}
}
