mod cmd;
mod logging;

use clap::{Parser, Subcommand};
use shellrun_core::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shellrun",
    about = "Register shell scripts, run them, capture their output, stop them",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: config/config.yaml)
    #[arg(long, global = true, env = "SHELLRUN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Listen port (overrides http.port)
        #[arg(long, short)]
        port: Option<u16>,

        /// Ignore the database section and keep everything in memory
        #[arg(long)]
        memory: bool,
    },

    /// Print the resolved configuration as YAML
    Config,
}

fn main() {
    let cli = Cli::parse();

    let path = Config::resolve_path(cli.config.as_deref());
    let config = match Config::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to load {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    logging::init(config.env);

    let result = match cli.command {
        Commands::Serve { port, memory } => cmd::serve::run(config, port, memory),
        Commands::Config => cmd::config::run(&config),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
