use std::{
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration,
};

use reqwest::{Method, StatusCode};

use crate::acceptance::{self, SessionFixture};
use xkcd_client::{
	AdminOutcome, ApiClient, NotificationLevel, RequestOptions, SessionController,
};
use xkcd_testkit::{Behavior, Reply};

fn messages(fixture: &SessionFixture) -> Vec<(String, NotificationLevel)> {
	fixture.notifier.messages()
}

#[tokio::test]
async fn bearer_header_is_dropped_after_logout() {
	let fixture = acceptance::session_fixture(Behavior::healthy(), Some("secret"), true).await;

	assert!(fixture.controller.is_authenticated());

	let response = fixture
		.controller
		.authenticated_request("/api/db/stats", RequestOptions::default())
		.await
		.expect("Request failed.")
		.expect("Request was rejected.");

	assert_eq!(response.status(), StatusCode::OK);

	fixture.controller.logout();

	fixture
		.controller
		.authenticated_request("/api/db/stats", RequestOptions::default())
		.await
		.expect("Request failed.");

	let requests = fixture.backend.requests();

	assert_eq!(requests.len(), 2);
	assert_eq!(requests[0].authorization.as_deref(), Some("Bearer secret"));
	assert_eq!(requests[1].authorization, None);
	assert!(!fixture.controller.is_authenticated());
	assert_eq!(fixture.session.token().expect("Failed to read token."), None);
	assert_eq!(
		messages(&fixture),
		vec![("Logged out successfully".to_string(), NotificationLevel::Info)]
	);
}

#[tokio::test]
async fn request_options_are_forwarded_with_token() {
	let fixture = acceptance::session_fixture(Behavior::healthy(), Some("secret"), true).await;
	let options = RequestOptions {
		json: Some(serde_json::json!({ "force": true })),
		..RequestOptions::method(Method::POST)
	};

	fixture
		.controller
		.authenticated_request("/api/db/update", options)
		.await
		.expect("Request failed.")
		.expect("Request was rejected.");

	let request = fixture.backend.requests().pop().expect("No request recorded.");

	assert_eq!(request.method, Method::POST);
	assert_eq!(request.authorization.as_deref(), Some("Bearer secret"));
	assert_eq!(request.body, r#"{"force":true}"#);
}

#[tokio::test]
async fn rejected_privileged_call_logs_out_silently() {
	let mut behavior = Behavior::healthy();

	behavior.accepted_token = Some("current".to_string());

	let fixture = acceptance::session_fixture(behavior, Some("expired"), true).await;
	let callbacks = AtomicUsize::new(0);
	let outcome = fixture
		.controller
		.update_database_with(|| {
			callbacks.fetch_add(1, Ordering::SeqCst);
		})
		.await;

	assert_eq!(outcome, AdminOutcome::Unauthorized);
	assert_eq!(callbacks.load(Ordering::SeqCst), 0);

	let state = fixture.controller.state();

	assert!(!state.is_authenticated);
	assert!(!state.operation_in_progress);
	assert_eq!(
		messages(&fixture),
		vec![("Logged out successfully".to_string(), NotificationLevel::Info)]
	);
}

#[tokio::test]
async fn update_success_notifies_and_runs_callback() {
	let fixture = acceptance::session_fixture(Behavior::healthy(), Some("secret"), true).await;
	let callbacks = AtomicUsize::new(0);
	let outcome = fixture
		.controller
		.update_database_with(|| {
			callbacks.fetch_add(1, Ordering::SeqCst);
		})
		.await;

	assert_eq!(outcome, AdminOutcome::Completed);
	assert_eq!(callbacks.load(Ordering::SeqCst), 1);
	assert_eq!(fixture.backend.count(Method::POST, "/api/db/update"), 1);
	assert!(!fixture.controller.state().operation_in_progress);
	assert_eq!(
		messages(&fixture),
		vec![("Database Update Triggered".to_string(), NotificationLevel::Success)]
	);
}

#[tokio::test]
async fn update_already_running_is_reported_as_info() {
	let mut behavior = Behavior::healthy();

	behavior.set("POST /api/db/update", Reply::status(StatusCode::ACCEPTED));

	let fixture = acceptance::session_fixture(behavior, Some("secret"), true).await;
	let outcome = fixture.controller.update_database().await;

	assert_eq!(outcome, AdminOutcome::AlreadyRunning);
	assert_eq!(
		messages(&fixture),
		vec![("Database update already in progress".to_string(), NotificationLevel::Info)]
	);
}

#[tokio::test]
async fn refused_update_surfaces_generic_failure() {
	let mut behavior = Behavior::healthy();

	behavior.set("POST /api/db/update", Reply::status(StatusCode::INTERNAL_SERVER_ERROR));

	let fixture = acceptance::session_fixture(behavior, Some("secret"), true).await;
	let callbacks = AtomicUsize::new(0);
	let outcome = fixture
		.controller
		.update_database_with(|| {
			callbacks.fetch_add(1, Ordering::SeqCst);
		})
		.await;

	assert_eq!(outcome, AdminOutcome::Failed);
	assert_eq!(callbacks.load(Ordering::SeqCst), 0);
	assert!(fixture.controller.is_authenticated());
	assert!(!fixture.controller.state().operation_in_progress);
	assert_eq!(
		messages(&fixture),
		vec![("Error: Update failed".to_string(), NotificationLevel::Error)]
	);
}

#[tokio::test]
async fn declined_drop_sends_nothing() {
	let fixture = acceptance::session_fixture(Behavior::healthy(), Some("secret"), false).await;
	let outcome = fixture.controller.drop_database().await;

	assert_eq!(outcome, AdminOutcome::Declined);
	assert_eq!(fixture.confirm.asked(), 1);
	assert!(fixture.backend.requests().is_empty());
	assert!(!fixture.controller.state().operation_in_progress);
	assert!(fixture.controller.is_authenticated());
	assert!(messages(&fixture).is_empty());
}

#[tokio::test]
async fn confirmed_drop_deletes_with_token() {
	let mut behavior = Behavior::healthy();

	behavior.accepted_token = Some("secret".to_string());

	let fixture = acceptance::session_fixture(behavior, Some("secret"), true).await;
	let outcome = fixture.controller.drop_database().await;

	assert_eq!(outcome, AdminOutcome::Completed);
	assert_eq!(fixture.backend.count(Method::DELETE, "/api/db"), 1);
	assert_eq!(
		messages(&fixture),
		vec![("Database Dropped".to_string(), NotificationLevel::Success)]
	);
}

#[tokio::test]
async fn refused_drop_surfaces_generic_failure() {
	let mut behavior = Behavior::healthy();

	behavior.set("DELETE /api/db", Reply::status(StatusCode::INTERNAL_SERVER_ERROR));

	let fixture = acceptance::session_fixture(behavior, Some("secret"), true).await;
	let outcome = fixture.controller.drop_database().await;

	assert_eq!(outcome, AdminOutcome::Failed);
	assert_eq!(
		messages(&fixture),
		vec![("Error: Drop failed".to_string(), NotificationLevel::Error)]
	);
}

#[tokio::test]
async fn transport_failure_becomes_error_notification() {
	let fixture = acceptance::session_fixture(Behavior::healthy(), Some("secret"), true).await;
	let controller = SessionController::new(
		ApiClient::from_base_url(acceptance::unreachable_base_url().await),
		fixture.session.clone(),
		fixture.confirm.clone(),
	)
	.with_notifier(fixture.notifier.clone());
	let outcome = controller.update_database().await;
	let messages = fixture.notifier.messages();

	assert_eq!(outcome, AdminOutcome::Failed);
	assert!(!controller.state().operation_in_progress);
	assert_eq!(messages.len(), 1);
	assert_eq!(messages[0].1, NotificationLevel::Error);
	assert!(messages[0].0.starts_with("Error: "), "unexpected message: {}", messages[0].0);
}

#[tokio::test]
async fn login_stores_token_and_authenticates() {
	let fixture = acceptance::session_fixture(Behavior::healthy(), None, true).await;
	let mut session_rx = fixture.controller.subscribe();

	assert!(!fixture.controller.is_authenticated());

	let accepted = fixture.controller.login("admin", "password").await.expect("Login failed.");

	assert!(accepted);
	assert!(session_rx.has_changed().expect("Session channel closed."));
	assert!(session_rx.borrow_and_update().is_authenticated);
	assert_eq!(
		fixture.session.token().expect("Failed to read token.").as_deref(),
		Some("issued-token")
	);

	let request = fixture.backend.requests().pop().expect("No request recorded.");
	let body: serde_json::Value = serde_json::from_str(&request.body).expect("Invalid login body.");

	assert_eq!(body, serde_json::json!({ "name": "admin", "password": "password" }));
	assert_eq!(
		messages(&fixture),
		vec![("Logged in successfully".to_string(), NotificationLevel::Success)]
	);
}

#[tokio::test]
async fn rejected_login_keeps_session_anonymous() {
	let mut behavior = Behavior::healthy();

	behavior.set("POST /api/login", Reply::status(StatusCode::UNAUTHORIZED));

	let fixture = acceptance::session_fixture(behavior, None, true).await;
	let accepted = fixture.controller.login("admin", "wrong").await.expect("Login failed.");

	assert!(!accepted);
	assert!(!fixture.controller.is_authenticated());
	assert_eq!(
		messages(&fixture),
		vec![("Invalid credentials".to_string(), NotificationLevel::Error)]
	);
}

#[tokio::test]
async fn concurrent_privileged_operations_are_not_serialized() {
	let mut behavior = Behavior::healthy();

	behavior.set(
		"POST /api/db/update",
		Reply::status(StatusCode::OK).delayed(Duration::from_millis(150)),
	);

	let fixture = acceptance::session_fixture(behavior, Some("secret"), true).await;
	let controller = &fixture.controller;
	let (first, second) = tokio::join!(controller.update_database(), async {
		let outcome = controller.drop_database().await;

		// The update is still in flight, so the advisory flag must still be raised.
		assert!(controller.state().operation_in_progress);

		outcome
	});

	assert_eq!(first, AdminOutcome::Completed);
	assert_eq!(second, AdminOutcome::Completed);
	assert!(!controller.state().operation_in_progress);
	assert_eq!(fixture.backend.requests().len(), 2);
}
