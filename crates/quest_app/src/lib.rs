pub mod cli;
pub mod config;

use anyhow::Result;
use tracing::info;

use quest_domain::notifications::{Notice, NotificationSink};
use quest_store::JsonStore;

use crate::cli::Cli;
use crate::config::AppConfig;

/// Prints notices to stderr so they stay out of the command output.
pub struct StderrNotifier;

impl NotificationSink for StderrNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}: {}", notice.title, notice.body);
    }
}

/// Opens the store named by the configuration, runs the parsed command and
/// returns its output.
pub fn run(cli: Cli) -> Result<String> {
    let config = cli.apply(AppConfig::from_env()?);
    info!(data_dir = %config.data_dir.display(), "opening store");
    let store = JsonStore::open(&config.data_dir)?;
    let service = store
        .service_builder()
        .with_clock(config.clock())
        .with_difficulty_table(config.difficulty_table()?)
        .with_notification_sink(Box::new(StderrNotifier))
        .build()?;
    cli::execute(&service, cli.command, cli.json)
}
