//! agentexec CLI: the main entry point.
//!
//! Commands:
//! - `run`        Execute an agent definition once and print the result
//! - `tools`      Sync and list the built-in tool catalog
//! - `remote`     Probe an agent's remote tool servers
//! - `executions` List recorded executions of an agent
//! - `stats`      Execution statistics for the current user
//! - `cancel`     Cancel a running execution
//! - `config`     Print the default configuration

use agentexec_config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod agent_file;
mod app;
mod commands;

#[derive(Parser)]
#[command(
    name = "agentexec",
    about = "agentexec: run tool-using language-model agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Acting user; executions and stats are scoped to it
    #[arg(long, global = true, env = "AGENTEXEC_USER", default_value = "local")]
    user: String,

    /// Config file (defaults to ~/.agentexec/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an agent once
    Run {
        /// Agent definition (TOML)
        #[arg(short, long)]
        agent: PathBuf,

        /// The user's message
        #[arg(short, long)]
        input: String,

        /// Session whose earlier turns are replayed as history
        #[arg(short, long)]
        session: Option<String>,

        /// Execution parameter, `key=value`; repeatable
        #[arg(short, long = "param", value_parser = commands::run::parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// List the built-in tools with their schemas
    Tools,

    /// Connect to an agent's remote tool servers and list what they offer
    Remote {
        /// Agent definition (TOML)
        #[arg(short, long)]
        agent: PathBuf,
    },

    /// List executions of an agent, newest first
    Executions {
        /// Agent id
        #[arg(short, long)]
        agent: String,

        #[arg(short, long)]
        session: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show execution statistics
    Stats,

    /// Cancel a running execution
    Cancel {
        /// Execution id
        execution_id: String,
    },

    /// Print the default configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Run {
            agent,
            input,
            session,
            params,
        } => commands::run::run(&config, &cli.user, &agent, input, session, params).await?,
        Commands::Tools => commands::tools::run(&config).await?,
        Commands::Remote { agent } => commands::remote::run(&config, &agent).await?,
        Commands::Executions {
            agent,
            session,
            limit,
            offset,
        } => {
            commands::executions::list(&config, &cli.user, &agent, session.as_deref(), limit, offset)
                .await?
        }
        Commands::Stats => commands::executions::stats(&config, &cli.user).await?,
        Commands::Cancel { execution_id } => {
            commands::executions::cancel(&config, &cli.user, &execution_id).await?
        }
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `logging.level`, or `debug` with `--verbose`.
fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}
