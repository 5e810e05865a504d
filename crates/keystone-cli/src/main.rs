use clap::{Parser, Subcommand};
use keystone_core::Selector;
use std::path::PathBuf;

mod modules;
mod scenario;

#[derive(Debug, Parser)]
#[command(name = "keystone", version, about = "Module-dispatch kernel operator tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the selector derived from a declared call signature.
    Selector { signature: String },
    /// Run the built-in counter and governance walkthrough.
    Demo,
    /// Execute a JSON scenario file against a fresh kernel.
    Run { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keystone=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Selector { signature } => {
            println!("{}", Selector::from_signature(&signature));
            Ok(())
        }
        Command::Demo => scenario::run_demo(),
        Command::Run { path } => scenario::run_file(&path),
    }
}
