use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webhook_workers::cli::{self, parse_parameter};
use webhook_workers::cloud::{AwsCli, DEFAULT_COMMAND_TIMEOUT, TokioCommandRunner};
use webhook_workers::config::Config;
use webhook_workers::credentials::{CredentialMinter, SystemClock};
use webhook_workers::dispatch::Dispatcher;
use webhook_workers::github::AppClient;
use webhook_workers::manifest;
use webhook_workers::server::{AppState, build_router};

/// Routes GitHub webhook deliveries to declarative workers.
#[derive(Parser, Debug)]
#[command(name = "webhook-workers", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the webhook endpoints (configured from WORKERS_* variables)
    Serve,

    /// Print the transport values for a workers directory as JSON
    EncodeManifest {
        /// Directory of worker definition files
        dir: PathBuf,
    },

    /// Print the events each enabled worker subscribes to
    Subscriptions {
        /// Directory of worker definition files
        dir: PathBuf,
    },

    /// Create or update the worker stack and wait for it to settle
    Deploy {
        /// Stack name
        #[arg(long)]
        stack: String,

        /// Template file
        #[arg(long)]
        template: PathBuf,

        /// Directory of worker definition files
        #[arg(long)]
        workers: PathBuf,

        /// Extra stack parameter as KEY=VALUE (repeatable)
        #[arg(long = "parameter", short = 'p')]
        parameters: Vec<String>,

        /// Seconds to wait for the stack to settle
        #[arg(long, default_value_t = 1800)]
        timeout_secs: u64,

        /// AWS CLI program
        #[arg(long, env = "WORKERS_AWS_CLI", default_value = "aws")]
        aws_cli: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_workers=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Commands::Serve => serve().await,
        Commands::EncodeManifest { dir } => {
            let values = cli::manifest_values(&dir)?;
            println!("{}", serde_json::to_string_pretty(&values)?);
            Ok(())
        }
        Commands::Subscriptions { dir } => {
            let subscriptions = cli::subscriptions(&dir)?;
            println!("{}", serde_json::to_string_pretty(&subscriptions)?);
            Ok(())
        }
        Commands::Deploy {
            stack,
            template,
            workers,
            parameters,
            timeout_secs,
            aws_cli,
        } => {
            let parameters = parameters
                .iter()
                .map(|raw| parse_parameter(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let client = AwsCli::new(aws_cli, TokioCommandRunner::new(DEFAULT_COMMAND_TIMEOUT));
            let report = cli::deploy(
                client,
                &stack,
                &template,
                &workers,
                parameters,
                Duration::from_secs(timeout_secs),
            )
            .await
            .with_context(|| format!("deploy of stack {} failed", stack))?;
            println!("{}: {}", stack, report.provider_status);
            Ok(())
        }
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;
    let aws = AwsCli::new(
        config.aws_cli.clone(),
        TokioCommandRunner::new(DEFAULT_COMMAND_TIMEOUT),
    );
    let clock = SystemClock;

    let minter = CredentialMinter::new(
        config.minter_settings(),
        aws.clone(),
        AppClient::new(config.github_api_url.clone()),
        clock,
    )?;
    let mut dispatcher = Dispatcher::new(
        config.dispatcher_settings(),
        aws.clone(),
        clock,
        minter,
        aws,
        manifest::values_from_env(),
    );

    // Fail at startup rather than on the first delivery.
    match dispatcher.manifest()? {
        Some(m) => tracing::info!(workers = m.len(), "Loaded worker manifest"),
        None => tracing::warn!("No worker manifest deployed"),
    }

    let app = build_router(AppState::new(dispatcher));

    tracing::info!("listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
