use clap::Parser;

use xkcd_front::Args;

// Every command is one short exchange with the backend, so one thread is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	xkcd_front::run(Args::parse()).await
}
