//! Authentication state and privileged database maintenance.
//!
//! The authenticated flag is derived from the presence of a token in the shared store. The backend
//! is the only judge of token validity: any `401` on an authenticated call forces a logout.

use std::sync::{Arc, Mutex};

use reqwest::{
	Method, Response, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use xkcd_store::SessionContext;

use crate::{
	ApiClient, Confirm, Error, NotificationLevel, Notifier, Result,
	api::{DROP_PATH, LOGIN_PATH, UPDATE_PATH},
};

pub const DROP_CONFIRMATION: &str = "Are you sure? This will delete all data.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Session {
	pub is_authenticated: bool,
	/// Advisory only. Reads true while at least one privileged operation is in flight.
	pub operation_in_progress: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
	pub method: Method,
	pub headers: HeaderMap,
	pub json: Option<Value>,
}
impl RequestOptions {
	pub fn method(method: Method) -> Self {
		Self { method, ..Default::default() }
	}
}

/// How a privileged operation ended. Informational; failures have already been reported through
/// the notifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminOutcome {
	Completed,
	/// The backend accepted the update request but a rebuild was already running.
	AlreadyRunning,
	Failed,
	/// The backend rejected the token and the session was logged out.
	Unauthorized,
	Declined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrivilegedOp {
	Update,
	Drop,
}
impl PrivilegedOp {
	fn method(self) -> Method {
		match self {
			Self::Update => Method::POST,
			Self::Drop => Method::DELETE,
		}
	}

	fn path(self) -> &'static str {
		match self {
			Self::Update => UPDATE_PATH,
			Self::Drop => DROP_PATH,
		}
	}

	fn success_message(self) -> &'static str {
		match self {
			Self::Update => "Database Update Triggered",
			Self::Drop => "Database Dropped",
		}
	}

	fn failure_message(self) -> &'static str {
		match self {
			Self::Update => "Update failed",
			Self::Drop => "Drop failed",
		}
	}
}

#[derive(Serialize)]
struct LoginRequest<'a> {
	name: &'a str,
	password: &'a str,
}

pub struct SessionController {
	api: ApiClient,
	session: SessionContext,
	confirm: Arc<dyn Confirm>,
	notifier: Option<Arc<dyn Notifier>>,
	state: watch::Sender<Session>,
	in_flight: Mutex<usize>,
}
impl SessionController {
	pub fn new(api: ApiClient, session: SessionContext, confirm: Arc<dyn Confirm>) -> Self {
		let controller = Self {
			api,
			session,
			confirm,
			notifier: None,
			state: watch::Sender::new(Session::default()),
			in_flight: Mutex::new(0),
		};

		controller.check_auth();

		controller
	}

	pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
		self.notifier = Some(notifier);

		self
	}

	pub fn state(&self) -> Session {
		*self.state.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<Session> {
		self.state.subscribe()
	}

	pub fn is_authenticated(&self) -> bool {
		self.state.borrow().is_authenticated
	}

	/// Re-derives the authenticated flag from the store. No network call is made.
	pub fn check_auth(&self) -> bool {
		let authenticated = match self.session.token() {
			Ok(token) => token.is_some(),
			Err(err) => {
				tracing::warn!(error = %err, "Failed to read session token.");

				false
			},
		};

		self.state.send_if_modified(|state| {
			let changed = state.is_authenticated != authenticated;

			state.is_authenticated = authenticated;

			changed
		});

		authenticated
	}

	/// Sends a request with the stored bearer token, if any.
	///
	/// Returns `Ok(None)` when the backend answers `401`; the session has been logged out by the
	/// time this returns.
	pub async fn authenticated_request(
		&self,
		path: &str,
		options: RequestOptions,
	) -> Result<Option<Response>> {
		let RequestOptions { method, mut headers, json } = options;

		if let Some(token) = self.session.token()? {
			headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
		}

		let mut request = self.api.http().request(method.clone(), self.api.url(path)).headers(headers);

		if let Some(body) = json.as_ref() {
			request = request.json(body);
		}

		let response = request.send().await?;

		if response.status() == StatusCode::UNAUTHORIZED {
			tracing::info!(%method, path, "Backend rejected session token.");

			self.logout();

			return Ok(None);
		}

		Ok(Some(response))
	}

	pub fn logout(&self) {
		if let Err(err) = self.session.clear() {
			tracing::warn!(error = %err, "Failed to remove session token.");
		}

		self.state.send_modify(|state| state.is_authenticated = false);
		self.notify("Logged out successfully", NotificationLevel::Info);
	}

	/// Exchanges credentials for a token. Returns `Ok(false)` when the backend rejects them.
	pub async fn login(&self, name: &str, password: &str) -> Result<bool> {
		let response = self
			.api
			.http()
			.post(self.api.url(LOGIN_PATH))
			.json(&LoginRequest { name, password })
			.send()
			.await?;
		let status = response.status();

		if status == StatusCode::UNAUTHORIZED {
			tracing::info!(name, "Login rejected.");
			self.notify("Invalid credentials", NotificationLevel::Error);

			return Ok(false);
		}
		if !status.is_success() {
			return Err(Error::Status { status });
		}

		let body = response.text().await?;
		let token = body.trim();

		if token.is_empty() {
			return Err(Error::InvalidResponse {
				message: "Login response did not include a token.".to_string(),
			});
		}

		self.session.set_token(token)?;
		self.check_auth();
		self.notify("Logged in successfully", NotificationLevel::Success);

		Ok(true)
	}

	pub async fn update_database(&self) -> AdminOutcome {
		self.run_privileged(PrivilegedOp::Update, || {}).await
	}

	pub async fn update_database_with<F>(&self, on_success: F) -> AdminOutcome
	where
		F: FnOnce(),
	{
		self.run_privileged(PrivilegedOp::Update, on_success).await
	}

	pub async fn drop_database(&self) -> AdminOutcome {
		self.drop_database_with(|| {}).await
	}

	/// Requires confirmation first. A declined confirmation changes nothing and sends nothing.
	pub async fn drop_database_with<F>(&self, on_success: F) -> AdminOutcome
	where
		F: FnOnce(),
	{
		if !self.confirm.confirm(DROP_CONFIRMATION).await {
			tracing::debug!("Database drop declined.");

			return AdminOutcome::Declined;
		}

		self.run_privileged(PrivilegedOp::Drop, on_success).await
	}

	async fn run_privileged<F>(&self, op: PrivilegedOp, on_success: F) -> AdminOutcome
	where
		F: FnOnce(),
	{
		let _busy = OperationGuard::enter(self);
		let response =
			match self.authenticated_request(op.path(), RequestOptions::method(op.method())).await {
				Ok(Some(response)) => response,
				Ok(None) => return AdminOutcome::Unauthorized,
				Err(err) => {
					tracing::warn!(op = ?op, error = %err, "Privileged request failed.");
					self.notify(&format!("Error: {err}"), NotificationLevel::Error);

					return AdminOutcome::Failed;
				},
			};
		let status = response.status();

		if op == PrivilegedOp::Update && status == StatusCode::ACCEPTED {
			self.notify("Database update already in progress", NotificationLevel::Info);
			on_success();

			return AdminOutcome::AlreadyRunning;
		}
		if status.is_success() {
			self.notify(op.success_message(), NotificationLevel::Success);
			on_success();

			return AdminOutcome::Completed;
		}

		tracing::warn!(op = ?op, %status, "Privileged request was refused.");
		self.notify(&format!("Error: {}", op.failure_message()), NotificationLevel::Error);

		AdminOutcome::Failed
	}

	fn adjust_in_flight(&self, entering: bool) {
		let mut count = self.in_flight.lock().unwrap_or_else(|err| err.into_inner());

		if entering {
			*count += 1;
		} else {
			*count = count.saturating_sub(1);
		}

		let busy = *count > 0;

		self.state.send_if_modified(|state| {
			let changed = state.operation_in_progress != busy;

			state.operation_in_progress = busy;

			changed
		});
	}

	fn notify(&self, message: &str, level: NotificationLevel) {
		if let Some(notifier) = self.notifier.as_ref() {
			notifier.notify(message, level);
		}
	}
}

/// Clears the in-progress flag on every exit path, including cancellation.
struct OperationGuard<'a> {
	controller: &'a SessionController,
}
impl<'a> OperationGuard<'a> {
	fn enter(controller: &'a SessionController) -> Self {
		controller.adjust_in_flight(true);

		Self { controller }
	}
}
impl Drop for OperationGuard<'_> {
	fn drop(&mut self) {
		self.controller.adjust_in_flight(false);
	}
}
