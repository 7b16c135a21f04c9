use std::{collections::BTreeMap, time::Duration};

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Error, Result};

pub const SEARCH_PATH: &str = "/api/search";
pub const STATS_PATH: &str = "/api/db/stats";
pub const STATUS_PATH: &str = "/api/db/status";
pub const UPDATE_PATH: &str = "/api/db/update";
pub const DROP_PATH: &str = "/api/db";
pub const LOGIN_PATH: &str = "/api/login";
pub const PING_PATH: &str = "/api/ping";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
	pub id: i64,
	#[serde(default)]
	pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
	#[serde(default)]
	pub comics: Vec<Comic>,
	#[serde(default)]
	pub total: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbStats {
	pub words_total: i64,
	pub words_unique: i64,
	pub comics_fetched: i64,
	pub comics_total: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
	Idle,
	Running,
	/// Any status this client does not recognize. Must stay the last variant.
	#[default]
	#[serde(other)]
	Unknown,
}
impl UpdateStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unknown => "unknown",
			Self::Idle => "idle",
			Self::Running => "running",
		}
	}
}

/// Per-service health replies keyed by service name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PingReport {
	#[serde(default)]
	pub replies: BTreeMap<String, String>,
}
impl PingReport {
	pub fn all_ok(&self) -> bool {
		self.replies.values().all(|reply| reply == "ok")
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
	pub(crate) status: UpdateStatus,
}

/// Shared HTTP access to the backend. Cloning is cheap and shares the connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
	base_url: String,
	http: Client,
}
impl ApiClient {
	pub fn new(cfg: &xkcd_config::Api) -> Result<Self> {
		let http = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { base_url: cfg.base_url.trim_end_matches('/').to_string(), http })
	}

	pub fn from_base_url(base_url: impl Into<String>) -> Self {
		let base_url = base_url.into();

		Self { base_url: base_url.trim_end_matches('/').to_string(), http: Client::new() }
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub fn http(&self) -> &Client {
		&self.http
	}

	pub fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	/// Unauthenticated GET that fails on any non-2xx status.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.http.get(self.url(path)).send().await?;

		read_json(response).await
	}

	pub async fn search(&self, phrase: &str, limit: Option<u32>) -> Result<SearchResult> {
		let mut request = self.http.get(self.url(SEARCH_PATH)).query(&[("phrase", phrase)]);

		if let Some(limit) = limit {
			request = request.query(&[("limit", limit)]);
		}

		read_json(request.send().await?).await
	}

	pub async fn stats(&self) -> Result<DbStats> {
		self.get_json(STATS_PATH).await
	}

	pub async fn status(&self) -> Result<UpdateStatus> {
		let body: StatusResponse = self.get_json(STATUS_PATH).await?;

		Ok(body.status)
	}

	pub async fn ping(&self) -> Result<PingReport> {
		self.get_json(PING_PATH).await
	}
}

pub(crate) async fn read_json<T>(response: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = response.status();

	if !status.is_success() {
		return Err(Error::Status { status });
	}

	let bytes = response.bytes().await?;

	Ok(serde_json::from_slice(&bytes)?)
}
