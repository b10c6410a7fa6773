pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "fred",
    about = "Fred operator CLI",
    long_about = "Operate Fred: history migrations, readiness checks, config inspection, legacy history import, and SQL guard checks.",
    after_help = "Examples:\n  fred doctor --json\n  fred import-history --source ./data/chat_histories\n  fred check-sql \"SELECT COUNT(*) FROM languages\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending history database migrations")]
    Migrate,
    #[command(about = "Validate config, history DB connectivity, and prompt context files")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Import legacy per-user JSON history files into the history database")]
    ImportHistory {
        #[arg(long, help = "Directory containing legacy `<email>.json` history files")]
        source: PathBuf,
        #[arg(long, help = "Turns to keep per user (at most history.max_turns, the default)")]
        max_turns: Option<usize>,
    },
    #[command(about = "Run the SQL safety guard on a statement and print its verdict")]
    CheckSql {
        #[arg(help = "Statement to validate")]
        sql: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::ImportHistory { source, max_turns } => {
            commands::import_history::run(&source, max_turns)
        }
        Command::CheckSql { sql } => commands::check_sql::run(&sql),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
