use replay_harness::cli;
use replay_harness::server::{self, ServerConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "harness starting");

    let args = cli::parse();
    let config = ServerConfig {
        listen: args.listen,
        default_mode: args.default_mode,
        recording_path: args.recording_path,
        recording_dir: args.recording_dir,
        scenario_name: args.scenario_name,
    };

    if let Err(e) = server::run(config).await {
        error!(error = %e, "fatal server error");
        std::process::exit(1);
    }

    info!("harness shut down cleanly");
}
