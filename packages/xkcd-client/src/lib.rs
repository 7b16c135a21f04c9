//! Client-side controllers for the xkcd comic search service.
//!
//! Four independent controllers share one [`ApiClient`] and one persistent store:
//! [`SessionController`], [`PollingController`], [`SearchController`], and
//! [`HistoryController`]. Observable state is published through `tokio::sync::watch` channels.

pub mod api;
pub mod history;
pub mod polling;
pub mod search;
pub mod session;
pub mod time_serde;

mod error;

pub use api::{ApiClient, Comic, DbStats, PingReport, SearchResult, UpdateStatus};
pub use error::{Error, Result};
pub use history::{HistoryController, HistoryEntry};
pub use polling::{PollingController, PollingSnapshot};
pub use search::{SearchController, SearchState};
pub use session::{AdminOutcome, RequestOptions, Session, SessionController};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
	Info,
	Success,
	Error,
}
impl NotificationLevel {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Info => "info",
			Self::Success => "success",
			Self::Error => "error",
		}
	}
}

/// Non-blocking user-visible messages, e.g. toasts.
pub trait Notifier
where
	Self: Send + Sync,
{
	fn notify(&self, message: &str, level: NotificationLevel);
}

/// Asks the user to approve a destructive action.
pub trait Confirm
where
	Self: Send + Sync,
{
	fn confirm<'a>(&'a self, message: &'a str) -> BoxFuture<'a, bool>;
}
