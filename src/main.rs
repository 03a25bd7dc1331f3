mod block_finder;
mod block_source;
mod config;
mod pipeline_toml;

use anyhow::Error;
use block_finder::BlockFinder;
use block_source::RpcBlockSource;
use clap::Parser;
use config::Config;
use pipeline_toml::ForkWindow;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Prepare a fork test environment by pinning the pipeline window in pipeline.toml")]
struct Args {
    /// How far back from the chain head the fork window should start, in seconds
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    seconds_ago: u64,

    /// End of the pipeline window as a unix timestamp; defaults to the current time
    pipeline_end_ts: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    info!("🚀 Starting fork-prep v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = Config::new()?;

    let finder = BlockFinder::new(RpcBlockSource::new(config.rpc_url.clone()));
    let block = finder
        .find_block_at_or_before(args.seconds_ago)
        .await
        .map_err(|e| anyhow::anyhow!("Block search failed: {}", e))?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No block found at or before {} seconds ago; the window would start before genesis",
                args.seconds_ago
            )
        })?;

    let pipeline_end_ts = match args.pipeline_end_ts {
        Some(ts) => ts,
        None => unix_now()?,
    };

    let window = ForkWindow {
        start_ts: block.timestamp,
        end_ts: pipeline_end_ts,
        fork_start_block: block.number,
    };
    pipeline_toml::write_fork_window(Path::new(&config.toml_path), &window)?;

    info!("{}", "=".repeat(60));
    info!("✔ Fork prepared at block: {}", block.number);
    info!("⏰ Window start: {}", window.start_ts);
    info!("⏰ Window end:   {}", window.end_ts);
    info!("{}", "=".repeat(60));

    Ok(())
}

fn init_logging() {
    let parse_error = "Failed to parse env filter directive";
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        .add_directive("reqwest=off".parse().expect(parse_error))
        .add_directive("hyper_util=off".parse().expect(parse_error));

    tracing_subscriber::fmt()
        .with_env_filter(filter) // reads RUST_LOG
        .init();
}

fn unix_now() -> Result<u64, Error> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
