// vermon: Gateway entry point

use clap::Parser;

use vermon::{GatewayConfig, Mode};

/// Runtime verification gateway for a shopping-style microservice app.
#[derive(Debug, Parser)]
#[command(name = "vermon", version, about)]
struct Args {
    /// Verification tier this process runs: objectives or requirements.
    #[arg(value_enum)]
    mode: Mode,

    /// host:port of the requirement verifier instance the bridge posts to.
    requirement_verifier: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = GatewayConfig::from_env(args.mode, args.requirement_verifier)?;
    vermon::run(config).await?;
    Ok(())
}
