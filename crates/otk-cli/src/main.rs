use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use otk_config::ConfigMode;

mod commands;

#[derive(Parser)]
#[command(name = "otk")]
#[command(about = "Order live-status tracker CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track one order until it reaches a terminal status.
    ///
    /// Prints every published snapshot as one JSON line on stdout. Exits 0 on
    /// terminal; Ctrl-C disposes the session and exits 130.
    Track {
        /// Order id to track
        #[arg(long)]
        order_id: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate a layered config and report unused keys
    ConfigCheck {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,

        /// Host the config is meant for
        #[arg(long, value_enum, default_value_t = ModeArg::Cli)]
        mode: ModeArg,

        /// Fail (exit non-zero) when unused keys exist
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Cli,
    Daemon,
}

impl From<ModeArg> for ConfigMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Cli => ConfigMode::Cli,
            ModeArg::Daemon => ConfigMode::Daemon,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    // stdout carries JSON lines; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Track {
            order_id,
            config_paths,
        } => {
            let code = commands::track::run(&order_id, &config_paths).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck {
            paths,
            mode,
            strict,
        } => {
            commands::config_check(&paths, mode.into(), strict)?;
        }
    }

    Ok(())
}
