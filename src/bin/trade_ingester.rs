use anyhow::Context;
use clap::Parser;
use trade_scripts::bulk::BulkClient;
use trade_scripts::ingest::Ingester;
use trade_scripts::trade::TradeGenerator;
use trade_scripts::Config;

/// Generates synthetic trades and bulk-loads them into the search index.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Index of the last trade to ingest [default: ingest.default_count, 10000].
    count: Option<u64>,

    /// Index of the first trade to ingest, to resume an interrupted run.
    #[arg(long, default_value_t = 1)]
    start: u64,

    /// TOML file overriding the built-in defaults [default: config.toml, if present].
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::new(args.config.as_deref()).context("Error loading config")?;
    trade_scripts::init_tracing(&config.log_level);

    let ingest = config.ingest;
    let count = args.count.unwrap_or(ingest.default_count);
    let client = BulkClient::new(&ingest.es_url, &ingest.index)?;
    let mut ingester = Ingester::new(client, TradeGenerator::from_entropy(), ingest.batch_size);
    ingester.run(args.start, count).await?;
    Ok(())
}
