pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to start mock backend: {0}")]
	Bind(#[from] std::io::Error),
}
