use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nagare::codegen;

/// Async call adapter for credit-based RPC transports
#[derive(Parser)]
#[command(name = "nagare")]
#[command(version)]
#[command(about = "Async call adapter for credit-based RPC transports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Rust client and server stubs from a service description
    Generate {
        /// The service description (TOML)
        service: PathBuf,

        /// Write the generated source here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { service, out } => {
            let source = match codegen::generate_from_file(&service) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Error: {}: {}", service.display(), e);
                    std::process::exit(1);
                }
            };

            match out {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, source) {
                        eprintln!("Error: could not write {}: {}", path.display(), e);
                        std::process::exit(1);
                    }
                    eprintln!("Wrote {}", path.display());
                }
                None => print!("{source}"),
            }
        }
    }
}
