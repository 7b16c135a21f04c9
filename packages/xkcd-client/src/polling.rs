//! Periodic statistics and status polling.
//!
//! The controller owns its timer task. Dropping the controller, or calling
//! [`PollingController::shutdown`], stops the timer and every in-flight tick; a closed flag is
//! consulted before each fetch so nothing reaches the backend after teardown.

use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use tokio::{
	sync::watch,
	task::{JoinHandle, JoinSet},
	time::{self, MissedTickBehavior},
};

use crate::{ApiClient, DbStats, UpdateStatus};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollingSnapshot {
	pub stats: Option<DbStats>,
	pub status: UpdateStatus,
}

#[derive(Clone, Copy, Debug)]
enum Half {
	Stats,
	Status,
}

#[derive(Debug, Default)]
struct AppliedSeq {
	stats: u64,
	status: u64,
}
impl AppliedSeq {
	fn slot(&mut self, half: Half) -> &mut u64 {
		match half {
			Half::Stats => &mut self.stats,
			Half::Status => &mut self.status,
		}
	}
}

struct PollingShared {
	api: ApiClient,
	closed: AtomicBool,
	next_seq: AtomicU64,
	applied: Mutex<AppliedSeq>,
	state: watch::Sender<PollingSnapshot>,
}
impl PollingShared {
	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	async fn poll(&self) {
		if self.is_closed() {
			return;
		}

		let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

		tokio::join!(self.poll_stats(seq), self.poll_status(seq));
	}

	async fn poll_stats(&self, seq: u64) {
		if self.is_closed() {
			return;
		}

		match self.api.stats().await {
			Ok(stats) => self.apply(seq, Half::Stats, |snapshot| {
				snapshot.stats = Some(stats);
			}),
			Err(err) => tracing::debug!(seq, error = %err, "Stats poll failed."),
		}
	}

	async fn poll_status(&self, seq: u64) {
		if self.is_closed() {
			return;
		}

		match self.api.status().await {
			Ok(status) => self.apply(seq, Half::Status, |snapshot| {
				snapshot.status = status;
			}),
			Err(err) => tracing::debug!(seq, error = %err, "Status poll failed."),
		}
	}

	/// Applies a completion unless a newer tick already landed for the same half.
	fn apply<U>(&self, seq: u64, half: Half, update: U)
	where
		U: FnOnce(&mut PollingSnapshot),
	{
		if self.is_closed() {
			return;
		}

		let mut applied = self.applied.lock().unwrap_or_else(|err| err.into_inner());
		let last = applied.slot(half);

		if *last > seq {
			tracing::debug!(seq, last = *last, half = ?half, "Discarding stale poll result.");

			return;
		}

		*last = seq;

		self.state.send_modify(update);
	}
}

pub struct PollingController {
	shared: Arc<PollingShared>,
	task: Option<JoinHandle<()>>,
}
impl PollingController {
	/// Polls once immediately, then every `interval`. Must be called inside a tokio runtime.
	pub fn start(api: ApiClient, interval: Duration) -> Self {
		let mut controller = Self::detached(api);

		controller.task = Some(tokio::spawn(run_ticks(controller.shared.clone(), interval)));

		tracing::debug!(interval_ms = interval.as_millis() as u64, "Polling started.");

		controller
	}

	/// A controller without a timer. Fetches happen only through [`Self::poll`].
	pub fn detached(api: ApiClient) -> Self {
		let shared = Arc::new(PollingShared {
			api,
			closed: AtomicBool::new(false),
			next_seq: AtomicU64::new(0),
			applied: Mutex::new(AppliedSeq::default()),
			state: watch::Sender::new(PollingSnapshot::default()),
		});

		Self { shared, task: None }
	}

	pub fn from_config(api: ApiClient, cfg: &xkcd_config::Polling) -> Self {
		Self::start(api, Duration::from_millis(cfg.interval_ms))
	}

	/// One tick outside the schedule. Both fetches are attempted and failures are swallowed.
	pub async fn poll(&self) {
		self.shared.poll().await;
	}

	pub fn snapshot(&self) -> PollingSnapshot {
		self.shared.state.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<PollingSnapshot> {
		self.shared.state.subscribe()
	}

	/// Stops the timer and waits until the timer task has fully terminated.
	pub async fn shutdown(mut self) {
		self.shared.closed.store(true, Ordering::SeqCst);

		if let Some(task) = self.task.take() {
			task.abort();

			let _ = task.await;
		}

		tracing::debug!("Polling stopped.");
	}
}
impl Drop for PollingController {
	fn drop(&mut self) {
		self.shared.closed.store(true, Ordering::SeqCst);

		if let Some(task) = self.task.take() {
			task.abort();
		}
	}
}

async fn run_ticks(shared: Arc<PollingShared>, interval: Duration) {
	let mut ticker = time::interval(interval);
	// Dropping the set on abort cancels ticks that are still waiting on the backend.
	let mut ticks = JoinSet::new();

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		ticker.tick().await;

		if shared.is_closed() {
			break;
		}

		while ticks.try_join_next().is_some() {}

		let shared = shared.clone();

		ticks.spawn(async move { shared.poll().await });
	}
}
