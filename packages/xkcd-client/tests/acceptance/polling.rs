use std::time::Duration;

use reqwest::{Method, StatusCode};

use crate::acceptance;
use xkcd_client::{ApiClient, DbStats, PollingController, PollingSnapshot, UpdateStatus};
use xkcd_testkit::{Behavior, MockBackend, Reply};

const STATS: &str = "/api/db/stats";
const STATUS: &str = "/api/db/status";

fn start(backend: &MockBackend, interval: Duration) -> PollingController {
	PollingController::start(ApiClient::from_base_url(backend.base_url()), interval)
}

#[tokio::test]
async fn first_poll_runs_immediately() {
	let backend = acceptance::start_backend(Behavior::healthy()).await;
	// Long enough that only the immediate tick can have fired.
	let controller = start(&backend, Duration::from_secs(60));
	let mut rx = controller.subscribe();

	tokio::time::timeout(
		Duration::from_secs(5),
		rx.wait_for(|snapshot| snapshot.stats.is_some() && snapshot.status == UpdateStatus::Idle),
	)
	.await
	.expect("Timed out waiting for the first poll.")
	.expect("Polling channel closed.");

	let snapshot = controller.snapshot();

	assert_eq!(snapshot.stats.map(|stats| stats.comics_total), Some(3_000));
	assert_eq!(backend.count(Method::GET, STATS), 1);
	assert_eq!(backend.count(Method::GET, STATUS), 1);

	controller.shutdown().await;
}

#[tokio::test]
async fn failing_stats_do_not_block_status() {
	let mut behavior = Behavior::healthy();

	behavior.set("GET /api/db/stats", Reply::status(StatusCode::INTERNAL_SERVER_ERROR));
	behavior.set("GET /api/db/status", Reply::json(serde_json::json!({ "status": "running" })));

	let backend = acceptance::start_backend(behavior).await;
	let controller = start(&backend, Duration::from_secs(60));
	let mut rx = controller.subscribe();

	tokio::time::timeout(
		Duration::from_secs(5),
		rx.wait_for(|snapshot| snapshot.status == UpdateStatus::Running),
	)
	.await
	.expect("Timed out waiting for status.")
	.expect("Polling channel closed.");

	assert_eq!(controller.snapshot().stats, None);

	controller.shutdown().await;
}

#[tokio::test]
async fn failures_keep_last_known_snapshot() {
	let backend = acceptance::start_backend(Behavior::healthy()).await;
	let controller = start(&backend, Duration::from_secs(60));
	let mut rx = controller.subscribe();

	tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|snapshot| snapshot.stats.is_some()))
		.await
		.expect("Timed out waiting for the first poll.")
		.expect("Polling channel closed.");

	let expected = PollingSnapshot {
		stats: Some(DbStats {
			words_total: 4_000,
			words_unique: 1_200,
			comics_fetched: 3_000,
			comics_total: 3_000,
		}),
		status: UpdateStatus::Idle,
	};

	assert!(
		acceptance::wait_until(Duration::from_secs(5), || controller.snapshot() == expected).await,
		"Snapshot never settled."
	);

	backend.update_behavior(|behavior| {
		behavior.set("GET /api/db/stats", Reply::status(StatusCode::SERVICE_UNAVAILABLE));
		behavior.set("GET /api/db/status", Reply::text("not json"));
	});
	controller.poll().await;

	assert_eq!(controller.snapshot(), expected);
	assert_eq!(backend.count(Method::GET, STATS), 2);

	controller.shutdown().await;
}

#[tokio::test]
async fn unreachable_backend_is_tolerated() {
	let controller = PollingController::start(
		ApiClient::from_base_url(acceptance::unreachable_base_url().await),
		Duration::from_millis(20),
	);

	controller.poll().await;

	assert_eq!(controller.snapshot(), PollingSnapshot::default());

	controller.shutdown().await;
}

#[tokio::test]
async fn no_fetch_after_shutdown() {
	let backend = acceptance::start_backend(Behavior::healthy()).await;
	let controller = start(&backend, Duration::from_millis(25));

	assert!(
		acceptance::wait_until(Duration::from_secs(5), || backend.count(Method::GET, STATS) >= 3)
			.await,
		"Polling never ticked."
	);

	controller.shutdown().await;

	let stats_after_shutdown = backend.count(Method::GET, STATS);
	let status_after_shutdown = backend.count(Method::GET, STATUS);

	tokio::time::sleep(Duration::from_millis(200)).await;

	assert_eq!(backend.count(Method::GET, STATS), stats_after_shutdown);
	assert_eq!(backend.count(Method::GET, STATUS), status_after_shutdown);
}

#[tokio::test]
async fn dropping_the_controller_stops_polling() {
	let backend = acceptance::start_backend(Behavior::healthy()).await;
	let controller = start(&backend, Duration::from_millis(25));

	assert!(
		acceptance::wait_until(Duration::from_secs(5), || backend.count(Method::GET, STATS) >= 2)
			.await,
		"Polling never ticked."
	);

	drop(controller);
	// Let an abort that raced with an already-running tick settle.
	tokio::time::sleep(Duration::from_millis(50)).await;

	let settled = backend.requests().len();

	tokio::time::sleep(Duration::from_millis(200)).await;

	assert_eq!(backend.requests().len(), settled);
}

#[tokio::test]
async fn slow_ticks_do_not_delay_the_schedule() {
	let mut behavior = Behavior::healthy();

	behavior.set(
		"GET /api/db/stats",
		Reply::json(serde_json::json!({ "comics_total": 1 })).delayed(Duration::from_millis(300)),
	);

	let backend = acceptance::start_backend(behavior).await;
	let controller = start(&backend, Duration::from_millis(40));

	// Each stats request takes 300ms; several must be in flight at once for this to pass.
	assert!(
		acceptance::wait_until(Duration::from_millis(250), || backend.count(Method::GET, STATS) >= 3)
			.await,
		"Ticks were serialized behind the slow request."
	);

	controller.shutdown().await;
}

#[tokio::test]
async fn detached_controller_fetches_only_on_demand() {
	let backend = acceptance::start_backend(Behavior::healthy()).await;
	let controller = PollingController::detached(ApiClient::from_base_url(backend.base_url()));

	tokio::time::sleep(Duration::from_millis(100)).await;

	assert!(backend.requests().is_empty());

	controller.poll().await;

	let snapshot = controller.snapshot();

	assert_eq!(snapshot.status, UpdateStatus::Idle);
	assert_eq!(snapshot.stats.map(|stats| stats.words_unique), Some(1_200));
	assert_eq!(backend.count(Method::GET, STATS), 1);
	assert_eq!(backend.count(Method::GET, STATUS), 1);

	controller.shutdown().await;
}
