use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use toolver::config::{self, Config};
use toolver::engine::Engine;
use toolver::version::cache::Cache;
use toolver::version::types::ToolIdentity;

#[derive(Parser)]
#[command(name = "toolver")]
#[command(version, about = "Track containerized tool versions across local, registry and upstream sources")]
struct Cli {
    /// Tools to resolve, as NAME or NAMESPACE/NAME
    #[arg(required = true)]
    tools: Vec<String>,

    /// Image tag to resolve
    #[arg(long, default_value = "latest")]
    tag: String,

    /// Bypass the metadata cache for every tier
    #[arg(long)]
    force_refresh: bool,

    /// Path to a configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bound on concurrently resolved tools
    #[arg(long)]
    max_concurrent: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    std::fs::create_dir_all(config::data_dir())
        .with_context(|| format!("creating data directory {:?}", config::data_dir()))?;
    let file_appender = tracing_appender::rolling::never(config::data_dir(), "toolver.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(max_concurrent) = cli.max_concurrent {
        config.max_concurrent = max_concurrent;
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, config))
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    // An unusable cache store is the one fatal condition of a run
    let cache = Arc::new(Cache::open(&config::db_path()).context("opening metadata cache")?);
    let engine = Engine::new(&config, cache).context("connecting to the container runtime")?;

    let tools: Vec<ToolIdentity> = cli
        .tools
        .iter()
        .map(|raw| ToolIdentity::parse(raw, &config.namespace))
        .collect();

    let reports = engine
        .resolve_fleet(&tools, &cli.tag, cli.force_refresh)
        .await;

    // Rendering beyond JSON is a concern of downstream consumers
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
