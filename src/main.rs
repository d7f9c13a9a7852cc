use clap::Parser;

use vigil::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("vigil starting");
            vigil::app::run_supervisor(args).await?;
        }
        Commands::Worker => {
            let code = vigil::orchestration::worker::run_worker().await?;
            std::process::exit(code);
        }
    }

    Ok(())
}
