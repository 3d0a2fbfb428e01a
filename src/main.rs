use clap::Parser;
use journey_export::config::{ENV_CONFIG, DEFAULT_CONFIG_FILE};
use journey_export::{
    timeline, ChromiumSession, Config, ConsoleReporter, Error, ExportLog, Exporter, FileConfig,
    FileProgressStore, Orchestrator, ResultWriter, Session,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Export Libby reading journeys through a logged-in Chromium profile
#[derive(Debug, Parser)]
#[command(name = "journey-export", version)]
struct Cli {
    /// Config file (JSON). Defaults to ./config.json
    #[arg(long, env = ENV_CONFIG)]
    config: Option<PathBuf>,

    /// Maximum number of titles exported at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Re-export the timeline file before exporting journeys
    #[arg(long)]
    refresh_timeline: bool,

    /// Run Chromium without a window
    #[arg(long)]
    headless: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli, &config).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, Error> {
    let root = std::env::current_dir()?;
    let file_path = cli
        .config
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_CONFIG_FILE));
    let file = FileConfig::load(&file_path)?;
    let env: HashMap<String, String> = std::env::vars().collect();

    let mut config = Config::resolve(file, &env, &root)?;
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrent = concurrency;
    }
    if cli.headless {
        config.headless = true;
    }
    config.validate()?;
    Ok(config)
}

async fn launch(config: &Config) -> Result<Arc<dyn Session>, Error> {
    let session = ChromiumSession::launch(&config.profile_path, config.headless).await?;
    Ok(Arc::new(session))
}

async fn run(cli: &Cli, config: &Config) -> Result<(), Error> {
    let store = Arc::new(FileProgressStore::new(config.progress_path()));
    let writer = ResultWriter::new(config.books_path());
    let export_log = ExportLog::new(config.export_log_path());
    let reporter = Arc::new(ConsoleReporter);

    if cli.refresh_timeline {
        let session = launch(config).await?;
        let exporter = Exporter::new(
            Arc::clone(&session),
            store.clone(),
            writer.clone(),
            config.policy,
            reporter.clone(),
        )
        .with_export_log(export_log.clone());
        let refreshed = exporter.refresh_timeline(&config.timeline_path()).await;
        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close browser session: {}", e);
        }
        println!("Timeline saved to {}", refreshed?.display());
    }

    let items = timeline::load_items(&config.timeline_path()).await?;
    let orchestrator = Orchestrator::new(
        store,
        writer,
        config.policy,
        config.max_concurrent,
        reporter,
    )
    .with_export_log(export_log);

    orchestrator.run(&items, || launch(config)).await?;
    Ok(())
}
