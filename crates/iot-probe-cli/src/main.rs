use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "iot-probe")]
#[command(about = "End-to-end connectivity check for an AWS IoT thing")]
#[command(version)]
#[command(
    long_about = "Walks one complete device session against an AWS IoT endpoint: mutual-TLS connect, MQTT handshake and a subscribe/publish/echo exchange per topic group, or the same identity driving the HTTPS REST surface."
)]
struct Cli {
    #[command(flatten)]
    probe: commands::ProbeArgs,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider for TLS support
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    // The status log is the user interface, so INFO is the floor
    let default_filter = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    commands::execute(cli.probe).await
}
