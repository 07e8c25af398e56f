use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use framepost::api::ApiClient;
use framepost::capture::FfmpegAcquirer;
use framepost::config::{self, ConfigError, RunConfig, SourceSpec};
use framepost::scheduler::CycleScheduler;
use framepost::shutdown;

/// framepost: periodic frame capture and detection forwarding agent
#[derive(Parser)]
#[command(name = "framepost")]
#[command(version, about = "Captures stills from video sources and forwards them for detection")]
#[command(after_help = "EXAMPLES:
    # Inline source definitions
    framepost --api-url https://api.example.com --api-key YOUR_KEY \\
        --source front-door:rtsp://192.168.1.100/stream

    # Sources from a TOML file
    framepost --api-url https://api.example.com --api-key YOUR_KEY \\
        --config sources.toml

    # Everything from the environment
    export API_URL=https://api.example.com
    export API_KEY=YOUR_KEY
    export SOURCES='[{\"id\":\"front-door\",\"address\":\"rtsp://192.168.1.100/stream\"}]'
    framepost")]
struct Cli {
    /// Detection API base URL
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// API key for authentication
    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,

    /// Path to a TOML file with [[sources]] definitions
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Source definition as id:address (can be repeated)
    #[arg(long = "source", short = 's')]
    sources: Vec<String>,

    /// Cycle interval in seconds
    #[arg(long, env = "INTERVAL", default_value_t = config::DEFAULT_INTERVAL_SECS)]
    interval: f64,

    /// Maximum capture attempts per source per cycle
    #[arg(long, env = "MAX_RETRIES", default_value_t = config::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Gather source definitions: config file, then inline flags, then the
/// SOURCES environment variable.
fn load_sources(cli: &Cli) -> Result<Vec<SourceSpec>, ConfigError> {
    if let Some(path) = &cli.config {
        let sources = config::sources_from_file(path)?;
        log::info!("loaded {} source(s) from {}", sources.len(), path.display());
        Ok(sources)
    } else if !cli.sources.is_empty() {
        cli.sources
            .iter()
            .map(|arg| config::source_from_arg(arg))
            .collect()
    } else if let Ok(json) = std::env::var("SOURCES") {
        config::sources_from_json(&json)
    } else {
        Ok(Vec::new())
    }
}

fn build_config(cli: &Cli) -> Result<RunConfig, ConfigError> {
    let sources = load_sources(cli)?;
    RunConfig::new(
        cli.api_url.clone().unwrap_or_default(),
        cli.api_key.clone().unwrap_or_default(),
        sources,
        cli.interval,
        cli.max_retries,
    )
}

fn main() {
    // Load .env before anything reads the environment; existing variables
    // are not overridden.
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let run_config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let api = match ApiClient::new(&run_config.api_url, &run_config.api_key) {
        Ok(client) => client,
        Err(e) => {
            log::error!("failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let (controller, token) = shutdown::channel();
    if let Err(e) = shutdown::wire_signals(controller) {
        log::error!("could not install signal handler: {}", e);
        std::process::exit(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let mut scheduler =
        CycleScheduler::new(Arc::new(run_config), FfmpegAcquirer::new(), api, token);
    rt.block_on(scheduler.run());
}
