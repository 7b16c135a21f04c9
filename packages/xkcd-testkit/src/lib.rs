//! In-process stand-ins for the backend and the user-facing capabilities.

mod error;

pub use error::{Error, Result};

use std::{
	collections::HashMap,
	future::IntoFuture,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use axum::{
	Router,
	body::Bytes,
	extract::{Query, State},
	http::{HeaderMap, Method, StatusCode, Uri, header},
	response::{IntoResponse, Response},
};
use serde_json::Value;
use tokio::{
	net::TcpListener,
	sync::{oneshot, oneshot::Sender},
};

use xkcd_client::{BoxFuture, Confirm, NotificationLevel, Notifier};

#[derive(Clone, Debug)]
pub enum ReplyBody {
	Json(Value),
	Text(String),
	Empty,
}

#[derive(Clone, Debug)]
pub struct Reply {
	pub status: StatusCode,
	pub body: ReplyBody,
	pub delay: Duration,
}
impl Reply {
	pub fn json(body: Value) -> Self {
		Self { status: StatusCode::OK, body: ReplyBody::Json(body), delay: Duration::ZERO }
	}

	pub fn text(body: impl Into<String>) -> Self {
		Self { status: StatusCode::OK, body: ReplyBody::Text(body.into()), delay: Duration::ZERO }
	}

	pub fn status(status: StatusCode) -> Self {
		Self { status, body: ReplyBody::Empty, delay: Duration::ZERO }
	}

	pub fn delayed(mut self, delay: Duration) -> Self {
		self.delay = delay;

		self
	}
}

/// Canned replies keyed by `"<METHOD> <path>"`, e.g. `"GET /api/db/stats"`.
#[derive(Clone, Debug, Default)]
pub struct Behavior {
	pub routes: HashMap<String, Reply>,
	/// Search replies keyed by the `phrase` query value. Take precedence over `routes`.
	pub search_by_phrase: HashMap<String, Reply>,
	/// When set, `POST /api/db/update` and `DELETE /api/db` answer 401 unless this exact bearer
	/// token is presented.
	pub accepted_token: Option<String>,
}
impl Behavior {
	/// A healthy backend: idle, with a small index and a search hit for every phrase.
	pub fn healthy() -> Self {
		let mut behavior = Self::default();

		behavior.set(
			"GET /api/db/stats",
			Reply::json(serde_json::json!({
				"words_total": 4_000,
				"words_unique": 1_200,
				"comics_fetched": 3_000,
				"comics_total": 3_000
			})),
		);
		behavior.set("GET /api/db/status", Reply::json(serde_json::json!({ "status": "idle" })));
		behavior.set(
			"GET /api/search",
			Reply::json(serde_json::json!({
				"comics": [{ "id": 1, "url": "https://imgs.xkcd.com/comics/barrel_cropped_(1).jpg" }],
				"total": 1
			})),
		);
		behavior.set("POST /api/db/update", Reply::status(StatusCode::OK));
		behavior.set("DELETE /api/db", Reply::status(StatusCode::OK));
		behavior.set("POST /api/login", Reply::text("issued-token"));
		behavior.set(
			"GET /api/ping",
			Reply::json(serde_json::json!({ "replies": { "search": "ok", "update": "ok" } })),
		);

		behavior
	}

	pub fn set(&mut self, route: &str, reply: Reply) {
		self.routes.insert(route.to_string(), reply);
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
	pub method: Method,
	pub path: String,
	pub query: Option<String>,
	pub authorization: Option<String>,
	pub body: String,
}

struct MockState {
	behavior: Mutex<Behavior>,
	requests: Mutex<Vec<RecordedRequest>>,
}

/// An HTTP server on an ephemeral loopback port. Stops when dropped.
pub struct MockBackend {
	base_url: String,
	state: Arc<MockState>,
	shutdown: Option<Sender<()>>,
}
impl MockBackend {
	pub async fn start(behavior: Behavior) -> Result<Self> {
		let state = Arc::new(MockState {
			behavior: Mutex::new(behavior),
			requests: Mutex::new(Vec::new()),
		});
		let app = Router::new().fallback(handle).with_state(state.clone());
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let (tx, rx) = oneshot::channel();
		let server = axum::serve(listener, app).with_graceful_shutdown(async move {
			let _ = rx.await;
		});

		tokio::spawn(async move {
			let _ = server.into_future().await;
		});

		Ok(Self { base_url: format!("http://{addr}"), state, shutdown: Some(tx) })
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub fn update_behavior<F>(&self, update: F)
	where
		F: FnOnce(&mut Behavior),
	{
		let mut behavior = self.state.behavior.lock().unwrap_or_else(|err| err.into_inner());

		update(&mut behavior);
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.state.requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn count(&self, method: Method, path: &str) -> usize {
		self.requests().iter().filter(|req| req.method == method && req.path == path).count()
	}
}
impl Drop for MockBackend {
	fn drop(&mut self) {
		if let Some(tx) = self.shutdown.take() {
			let _ = tx.send(());
		}
	}
}

async fn handle(
	State(state): State<Arc<MockState>>,
	method: Method,
	uri: Uri,
	Query(params): Query<HashMap<String, String>>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let authorization =
		headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok()).map(String::from);

	state.requests.lock().unwrap_or_else(|err| err.into_inner()).push(RecordedRequest {
		method: method.clone(),
		path: uri.path().to_string(),
		query: uri.query().map(String::from),
		authorization: authorization.clone(),
		body: String::from_utf8_lossy(&body).into_owned(),
	});

	let reply = {
		let behavior = state.behavior.lock().unwrap_or_else(|err| err.into_inner());

		select_reply(&behavior, &method, uri.path(), &params, authorization.as_deref())
	};

	if !reply.delay.is_zero() {
		tokio::time::sleep(reply.delay).await;
	}

	match reply.body {
		ReplyBody::Json(body) => (reply.status, axum::Json(body)).into_response(),
		ReplyBody::Text(body) => (reply.status, body).into_response(),
		ReplyBody::Empty => reply.status.into_response(),
	}
}

fn select_reply(
	behavior: &Behavior,
	method: &Method,
	path: &str,
	params: &HashMap<String, String>,
	authorization: Option<&str>,
) -> Reply {
	let privileged = matches!(
		(method, path),
		(&Method::POST, "/api/db/update") | (&Method::DELETE, "/api/db")
	);

	if privileged
		&& let Some(token) = behavior.accepted_token.as_deref()
		&& authorization != Some(format!("Bearer {token}").as_str())
	{
		return Reply::status(StatusCode::UNAUTHORIZED);
	}

	if path == "/api/search"
		&& let Some(phrase) = params.get("phrase")
		&& let Some(reply) = behavior.search_by_phrase.get(phrase)
	{
		return reply.clone();
	}

	behavior
		.routes
		.get(&format!("{method} {path}"))
		.cloned()
		.unwrap_or_else(|| Reply::status(StatusCode::NOT_FOUND))
}

/// Collects notifications for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
	messages: Mutex<Vec<(String, NotificationLevel)>>,
}
impl RecordingNotifier {
	pub fn messages(&self) -> Vec<(String, NotificationLevel)> {
		self.messages.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl Notifier for RecordingNotifier {
	fn notify(&self, message: &str, level: NotificationLevel) {
		self.messages
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push((message.to_string(), level));
	}
}

/// Answers every confirmation with the same choice and counts how often it was asked.
#[derive(Debug)]
pub struct FixedConfirm {
	answer: bool,
	asked: AtomicUsize,
}
impl FixedConfirm {
	pub fn new(answer: bool) -> Self {
		Self { answer, asked: AtomicUsize::new(0) }
	}

	pub fn asked(&self) -> usize {
		self.asked.load(Ordering::SeqCst)
	}
}
impl Confirm for FixedConfirm {
	fn confirm<'a>(&'a self, _message: &'a str) -> BoxFuture<'a, bool> {
		self.asked.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { self.answer })
	}
}
