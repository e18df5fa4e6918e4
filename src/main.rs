use clap::Parser;
use datasource_broker::{
    cli::{run, Cli},
    config::ObservabilityConfig,
    init_tracing,
};

fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let observability = ObservabilityConfig {
        log_level: if cli.verbose { "debug" } else { "warn" }.to_string(),
        ..ObservabilityConfig::default()
    };
    init_tracing(&observability)?;

    run(cli)
}
