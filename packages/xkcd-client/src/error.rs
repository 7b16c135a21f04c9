use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Store(#[from] xkcd_store::Error),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Error: {}", status_text(.status))]
	Status { status: StatusCode },
	#[error("{message}")]
	InvalidResponse { message: String },
}

fn status_text(status: &StatusCode) -> &str {
	status.canonical_reason().unwrap_or_else(|| status.as_str())
}
