use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use xkcd_client::{BoxFuture, Confirm, NotificationLevel, Notifier};

/// Prints notifications to stderr so stdout stays machine-readable.
pub struct ConsoleNotifier;
impl Notifier for ConsoleNotifier {
	fn notify(&self, message: &str, level: NotificationLevel) {
		eprintln!("[{}] {message}", level.as_str());
	}
}

pub struct StdinConfirm;
impl Confirm for StdinConfirm {
	fn confirm<'a>(&'a self, message: &'a str) -> BoxFuture<'a, bool> {
		Box::pin(async move {
			match prompt(&format!("{message} [y/N] ")).await {
				Ok(answer) => is_yes(&answer),
				Err(err) => {
					tracing::warn!(error = %err, "Failed to read confirmation.");

					false
				},
			}
		})
	}
}

/// Used for `--yes`.
pub struct AutoConfirm;
impl Confirm for AutoConfirm {
	fn confirm<'a>(&'a self, message: &'a str) -> BoxFuture<'a, bool> {
		Box::pin(async move {
			tracing::debug!(prompt = message, "Confirmation skipped.");

			true
		})
	}
}

pub async fn prompt(message: &str) -> std::io::Result<String> {
	let mut stderr = io::stderr();

	stderr.write_all(message.as_bytes()).await?;
	stderr.flush().await?;

	let mut line = String::new();

	BufReader::new(io::stdin()).read_line(&mut line).await?;

	Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn is_yes(answer: &str) -> bool {
	matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
