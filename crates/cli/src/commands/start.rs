use crate::commands::{migrate_database, runtime, CommandResult};
use pillar_core::config::{AppConfig, LoadOptions};

/// Preflight for `pillar-server`: the same config, database and migration
/// steps the server runs before it opens the Slack socket.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "start",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = runtime().and_then(|runtime| runtime.block_on(migrate_database(&config)));

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "preflight passed; run `pillar-server` to connect to Slack (http on {}:{})",
                config.server.bind_address, config.server.port
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
