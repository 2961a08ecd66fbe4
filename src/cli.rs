//! CLI entry for Parley, defining clap subcommands and dispatching each command handler.

use clap::{Parser, Subcommand};

use crate::command;

// The Cli struct represents the root of the command line interface.
#[derive(Parser, Debug)]
#[command(
    about = "Parley: a multi-session chat server for OpenAI-compatible models",
    version = "0.1.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands; each one's args and `execute` live in the `command` module.
#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the chat HTTP server")]
    Serve(command::serve::ServeArgs),
}

/// Entry point of the Parley binary.
/// - Caution: This is a `synchronous` function, it's declared as `async` to be able to use `[tokio::main]`
/// - `args`: parse from command line if it's `None`, otherwise parse from the given args
#[tokio::main]
pub async fn parse(args: Option<&[&str]>) -> anyhow::Result<()> {
    parse_async(args).await
}

/// `async` version of the [parse] function
pub async fn parse_async(args: Option<&[&str]>) -> anyhow::Result<()> {
    let args = match args {
        Some(args) => Cli::try_parse_from(args)?,
        None => Cli::parse(),
    };
    match args.command {
        Commands::Serve(args) => command::serve::execute(args).await,
    }
}
