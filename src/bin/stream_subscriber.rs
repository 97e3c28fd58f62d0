use anyhow::Context;
use clap::Parser;
use trade_scripts::stream::Subscriber;
use trade_scripts::Config;

/// Opens several long-lived connections to the price stream and logs what arrives.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// TOML file overriding the built-in defaults [default: config.toml, if present].
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::new(args.config.as_deref()).context("Error loading config")?;
    trade_scripts::init_tracing(&config.log_level);

    Subscriber::new(config.stream)?.run().await;
    Ok(())
}
