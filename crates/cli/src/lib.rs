pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pillar",
    about = "Pillar operator CLI",
    long_about = "Check Pillar's configuration, database and integrations before running the Slack server.",
    after_help = "Examples:\n  pillar doctor --json\n  pillar config\n  pillar migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks (config, database, migrations)")]
    Start,
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Show effective configuration with source attribution and redaction")]
    Config,
    #[command(about = "Check config, Slack tokens, database and optional integrations")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
