use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use triage_rag::commands::{ask, index_dataset, resolve_selector, serve, show_status};
use triage_rag::config::{Config, resolve_config_dir, run_interactive_config, show_config};
use triage_rag::loader::DatasetPreset;

#[derive(Parser)]
#[command(name = "triage-rag")]
#[command(about = "Emergency care recommendations from hospital wait-time data")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector store (default ~/.triage-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, the language model and the HTTP server
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed a JSON dataset into the vector store
    Index {
        /// JSON file to index, e.g. waittimes.json
        file: PathBuf,
        /// Known dataset layout; inferred from the file name when omitted
        #[arg(long, value_enum)]
        dataset: Option<DatasetPreset>,
        /// Custom selector expression, e.g. '.[] | .Emergency[]'
        #[arg(long, conflicts_with = "dataset")]
        selector: Option<String>,
        /// Drop previously indexed documents first
        #[arg(long)]
        replace: bool,
    },
    /// Start the HTTP recommendation service
    Serve {
        /// Address to bind, overriding the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask for a recommendation once and print it
    Ask {
        /// Description of the situation, e.g. "broken wrist, NW Calgary"
        #[arg(long)]
        data: String,
        #[arg(long)]
        question: Option<String>,
    },
    /// Show collaborator health and stored document count
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Index {
            file,
            dataset,
            selector,
            replace,
        } => {
            let config = Config::load(&config_dir)?;
            let selector = resolve_selector(&file, dataset, selector.as_deref())?;
            index_dataset(&config, &file, selector, replace).await?;
        }
        Commands::Serve { host, port } => {
            serve(Config::load(&config_dir)?, host, port).await?;
        }
        Commands::Ask { data, question } => {
            ask(&Config::load(&config_dir)?, data, question).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}
