//! Colloquy CLI entry point.

use clap::Parser;

use colloquy::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
    };

    if let Err(err) = result {
        colloquy::cli::handle_error(&err);
    }
}
