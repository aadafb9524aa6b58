//! meshspider command line entry point.

use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;

use meshspider_cli::commands::{self, is_usage_error};
use meshspider_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe(args) => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, waiting for running probes");
                    on_interrupt.cancel();
                }
            });

            match commands::probe(&args, cancel).await {
                Ok(report) => {
                    if let Some(summary) = report.summary {
                        tracing::info!(
                            "{} probed, {} succeeded, {} failed, {} timed out",
                            summary.dispatched,
                            summary.succeeded,
                            summary.failed,
                            summary.timed_out
                        );
                    }
                    for source in &report.failed_sources {
                        tracing::warn!("not merged: {source}");
                    }
                }
                Err(e) if is_usage_error(&e) => {
                    eprintln!("Error: {e:#}");
                    std::process::exit(2);
                }
                Err(e) => {
                    tracing::error!("{e:#}");
                    return Err(e);
                }
            }
        }

        Commands::Validate { dump } => match commands::validate(&dump) {
            Ok(stats) => {
                println!("Valid dump file: {dump}");
                print!("{stats}");
            }
            Err(e) => {
                eprintln!("Invalid dump file: {e:#}");
                std::process::exit(1);
            }
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "meshspider", &mut std::io::stdout());
        }
    }

    Ok(())
}
