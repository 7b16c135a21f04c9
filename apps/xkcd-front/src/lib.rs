pub mod console;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre};
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

use xkcd_client::{
	AdminOutcome, ApiClient, Comic, Confirm, HistoryController, Notifier, PollingController,
	PollingSnapshot, SearchController, SessionController,
};
use xkcd_config::Config;
use xkcd_store::{FileStore, KeyValueStore, SessionContext};

use crate::console::{AutoConfirm, ConsoleNotifier, StdinConfirm};

#[derive(Debug, Parser)]
#[command(
	version = xkcd_cli::VERSION,
	rename_all = "kebab",
	styles = xkcd_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE", env = xkcd_cli::CONFIG_ENV)]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Search comics by phrase.
	Search { phrase: String },
	/// Record a visit to a comic in the local history.
	Open { id: i64, url: String },
	/// Show or clear the local history.
	History {
		#[command(subcommand)]
		action: Option<HistoryAction>,
	},
	/// Exchange credentials for an admin token.
	Login {
		name: String,
		/// Prompted for on stdin when omitted.
		#[arg(long)]
		password: Option<String>,
	},
	Logout,
	/// Fetch database statistics and update status once.
	Status,
	/// Poll statistics and status until interrupted.
	Watch,
	/// Report the health of every backend service.
	Ping,
	/// Trigger a database rebuild. Requires a token.
	UpdateDb,
	/// Delete all indexed data. Requires a token and confirmation.
	DropDb {
		/// Skip the confirmation prompt.
		#[arg(long)]
		yes: bool,
	},
}

#[derive(Clone, Copy, Debug, Subcommand)]
pub enum HistoryAction {
	List,
	Clear,
}

struct Context {
	config: Config,
	api: ApiClient,
	store: Arc<dyn KeyValueStore>,
	notifier: Arc<dyn Notifier>,
}
impl Context {
	fn session(&self, confirm: Arc<dyn Confirm>) -> SessionController {
		SessionController::new(
			self.api.clone(),
			SessionContext::new(self.store.clone()),
			confirm,
		)
		.with_notifier(self.notifier.clone())
	}
}

pub async fn run(args: Args) -> Result<()> {
	let config = xkcd_config::load(&args.config)?;

	init_tracing(&config)?;

	let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.storage.path)?);
	let api = ApiClient::new(&config.api)?;
	let cx = Context { config, api, store, notifier: Arc::new(ConsoleNotifier) };

	tracing::debug!(api = cx.api.base_url(), command = ?args.command, "Dispatching command.");

	match args.command {
		Command::Search { phrase } => search(&cx, phrase).await,
		Command::Open { id, url } => open(&cx, Comic { id, url }),
		Command::History { action } => history(&cx, action.unwrap_or(HistoryAction::List)),
		Command::Login { name, password } => login(&cx, &name, password).await,
		Command::Logout => {
			cx.session(Arc::new(StdinConfirm)).logout();

			Ok(())
		},
		Command::Status => status(&cx).await,
		Command::Watch => watch(&cx).await,
		Command::Ping => ping(&cx).await,
		Command::UpdateDb => {
			let outcome = cx.session(Arc::new(StdinConfirm)).update_database().await;

			admin_result(outcome)
		},
		Command::DropDb { yes } => {
			let confirm: Arc<dyn Confirm> =
				if yes { Arc::new(AutoConfirm) } else { Arc::new(StdinConfirm) };
			let outcome = cx.session(confirm).drop_database().await;

			admin_result(outcome)
		},
	}
}

fn init_tracing(config: &Config) -> Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

async fn search(cx: &Context, phrase: String) -> Result<()> {
	let controller = SearchController::from_config(cx.api.clone(), &cx.config.search);

	controller.set_query(phrase);
	controller.search().await;

	let state = controller.state();

	if !state.error_message.is_empty() {
		return Err(eyre::eyre!(state.error_message));
	}

	if let Some(results) = state.results {
		for comic in &results.comics {
			println!("{}\t{}", comic.id, comic.url);
		}

		eprintln!("{} of {} comics.", results.comics.len(), results.total);
	}

	Ok(())
}

fn open(cx: &Context, comic: Comic) -> Result<()> {
	let history = HistoryController::from_config(cx.store.clone(), &cx.config.history);

	history.add(&comic)?;
	println!("{}", comic.url);

	Ok(())
}

fn history(cx: &Context, action: HistoryAction) -> Result<()> {
	let history = HistoryController::from_config(cx.store.clone(), &cx.config.history);

	match action {
		HistoryAction::List =>
			for entry in history.entries() {
				println!("{}\t{}\t{}", entry.visited_at.format(&Rfc3339)?, entry.id, entry.url);
			},
		HistoryAction::Clear => {
			history.clear()?;
			eprintln!("History cleared.");
		},
	}

	Ok(())
}

async fn login(cx: &Context, name: &str, password: Option<String>) -> Result<()> {
	let password = match password {
		Some(password) => password,
		None => console::prompt("Password: ").await?,
	};
	let session = cx.session(Arc::new(StdinConfirm));

	if !session.login(name, &password).await? {
		return Err(eyre::eyre!("Login rejected for {name}."));
	}

	Ok(())
}

async fn status(cx: &Context) -> Result<()> {
	let polling = PollingController::detached(cx.api.clone());

	polling.poll().await;

	let snapshot = polling.snapshot();

	polling.shutdown().await;
	print_snapshot(&snapshot);

	Ok(())
}

async fn watch(cx: &Context) -> Result<()> {
	let polling = PollingController::from_config(cx.api.clone(), &cx.config.polling);
	let mut updates = polling.subscribe();

	loop {
		tokio::select! {
			changed = updates.changed() => {
				if changed.is_err() {
					break;
				}

				let snapshot = updates.borrow_and_update().clone();

				print_snapshot(&snapshot);
			},
			signal = tokio::signal::ctrl_c() => {
				signal?;

				break;
			},
		}
	}

	polling.shutdown().await;

	Ok(())
}

async fn ping(cx: &Context) -> Result<()> {
	let report = cx.api.ping().await?;

	for (service, reply) in &report.replies {
		println!("{service}\t{reply}");
	}

	if !report.all_ok() {
		return Err(eyre::eyre!("At least one backend service is unhealthy."));
	}

	Ok(())
}

fn print_snapshot(snapshot: &PollingSnapshot) {
	match snapshot.stats.as_ref() {
		Some(stats) => println!(
			"status={} comics={}/{} words={} unique_words={}",
			snapshot.status.as_str(),
			stats.comics_fetched,
			stats.comics_total,
			stats.words_total,
			stats.words_unique,
		),
		None => println!("status={} stats=unavailable", snapshot.status.as_str()),
	}
}

fn admin_result(outcome: AdminOutcome) -> Result<()> {
	match outcome {
		AdminOutcome::Completed | AdminOutcome::AlreadyRunning | AdminOutcome::Declined => Ok(()),
		AdminOutcome::Unauthorized =>
			Err(eyre::eyre!("The backend rejected the session. Run `login` first.")),
		AdminOutcome::Failed => Err(eyre::eyre!("The operation failed.")),
	}
}
