use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Import the library
use vast_sdk_core::config::SdkConfig;
use vast_sdk_core::models::AdType;
use vast_sdk_core::tracking::TrackingDispatcher;
use vast_sdk_core::unwrap::{self, HttpFetcher};
use vast_sdk_core::{
    async_api, build_ad_request_url, extract_wrapper_uri, parser, VastData, MAX_WRAPPER_DEPTH,
};

const DEFAULT_LOG_FILTER: &str = "vast_sdk_core=info";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// VAST parser, wrapper resolver and ad request builder
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log every fallback step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a VAST file or URL
    Parse {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Wrapper redirects already followed to reach this document
        #[arg(short, long, default_value_t = 0)]
        depth: usize,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Follow wrapper redirects until an InLine ad is found
    Resolve {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Optional SDK config supplying the timeout and redirect cap
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Print the VASTAdTagURI of a Wrapper document
    WrapperUri {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,
    },

    /// Build the ad request URL from an SDK config
    RequestUrl {
        /// SDK config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured placement
        #[arg(long)]
        placement: Option<String>,

        /// Override the configured ad type (image, video, native)
        #[arg(long)]
        ad_type: Option<String>,
    },

    /// Fire tracking URLs and wait for the requests to finish
    Track {
        /// Tracking URL, may be repeated
        #[arg(short, long = "url", required = true)]
        urls: Vec<String>,

        /// Request timeout in milliseconds
        #[arg(short, long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("vast_sdk_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    // Also installs the bridge that forwards the library's `log` records
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_vast(vast: &VastData, pretty: bool) -> Result<(), serde_json::Error> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(vast)?);
    } else {
        println!("{}", serde_json::to_string(vast)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Parse { input, depth, pretty } => {
            let fetcher = HttpFetcher::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))?;
            let content = unwrap::fetch_vast_content(&fetcher, input).await?;

            let vast = parser::parse_vast(&content, *depth)?;
            print_vast(&vast, *pretty)?;
        }
        Commands::Resolve { input, config, pretty } => {
            let config = match config {
                Some(path) => Some(SdkConfig::load(path).await?),
                None => None,
            };
            let timeout_ms = config.as_ref().map_or(DEFAULT_TIMEOUT_MS, |c| c.timeout_ms);
            let fetcher = HttpFetcher::new(Duration::from_millis(timeout_ms))?;
            let content = unwrap::fetch_vast_content(&fetcher, input).await?;

            let vast = match &config {
                Some(config) => async_api::resolve_vast(config, &content).await?,
                None => unwrap::resolve_vast(&fetcher, &content, MAX_WRAPPER_DEPTH).await?,
            };
            print_vast(&vast, *pretty)?;
        }
        Commands::WrapperUri { input } => {
            let fetcher = HttpFetcher::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))?;
            let content = unwrap::fetch_vast_content(&fetcher, input).await?;

            match extract_wrapper_uri(&content) {
                Some(uri) => println!("{}", uri),
                None => return Err("No VASTAdTagURI found".into()),
            }
        }
        Commands::RequestUrl { config, placement, ad_type } => {
            let mut params = SdkConfig::load(config).await?.ad_request_params();
            if let Some(placement) = placement {
                params.placement_id = placement.clone();
            }
            if let Some(ad_type) = ad_type {
                params.ad_type = ad_type.parse::<AdType>()?;
            }

            println!("{}", build_ad_request_url(&params)?);
        }
        Commands::Track { urls, timeout_ms } => {
            let dispatcher = TrackingDispatcher::new(Duration::from_millis(*timeout_ms))?;
            let handles = dispatcher.spawn_all(urls);
            let sent = handles.len();
            for handle in handles {
                handle.await?;
            }
            println!("Sent {} tracking pings", sent);
        }
    }

    Ok(())
}
