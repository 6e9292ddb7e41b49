use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agritrace::cli::{Cli, Command};
use agritrace::ui::{FetchProgress, print_json, report_error};
use agritrace::{ClientConfig, ReadClient, TraceError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "agritrace=debug" } else { "agritrace=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(base_delay_ms) = cli.base_delay_ms {
        config.base_delay_ms = base_delay_ms;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let client = ReadClient::from_config(&config)?;
    tracing::debug!(
        rpc = config.rpc_endpoints.len(),
        gateways = config.gateway_endpoints.len(),
        max_attempts = config.max_attempts,
        "client ready"
    );

    match cli.command {
        Command::Product { batch_id } => {
            let record = track(&format!("product {batch_id}"), client.fetch_record(&batch_id)).await?;
            print_json(&record)
        }
        Command::Summary { batch_id } => {
            let record = track(
                &format!("summary {batch_id}"),
                client.fetch_product_summary(&batch_id),
            )
            .await?;
            print_json(&record)
        }
        Command::User { address } => {
            let record = track(&format!("user {address}"), client.fetch_user(&address)).await?;
            print_json(&record)
        }
        Command::Registered { address } => {
            let registered = track(
                &format!("registration {address}"),
                client.is_user_registered(&address),
            )
            .await?;
            print_json(&registered)
        }
        Command::Verified { address } => {
            let verified = track(
                &format!("verification {address}"),
                client.is_user_verified(&address),
            )
            .await?;
            print_json(&verified)
        }
        Command::Events { batch_id } => {
            let events = track(&format!("events {batch_id}"), client.fetch_events(&batch_id)).await?;
            print_json(&events)
        }
        Command::History { batch_id } => {
            let history = track(
                &format!("history {batch_id}"),
                client.fetch_product_history(&batch_id),
            )
            .await?;
            print_json(&history)
        }
        Command::Batches => {
            let ids = track("batch ids", client.fetch_batch_ids()).await?;
            print_json(&ids)
        }
        Command::Count => {
            let count = track("product count", client.fetch_product_count()).await?;
            print_json(&count)
        }
        Command::Blob { hash, out } => {
            let bytes = track(&format!("blob {hash}"), client.fetch_blob(&hash)).await?;
            write_bytes(out.as_deref(), &bytes)
        }
        Command::Json { hash } => {
            let value = track(&format!("json {hash}"), client.fetch_json(&hash)).await?;
            print_json(&value)
        }
        Command::Cert { hash, out } => {
            let cert = track(&format!("certification {hash}"), client.fetch_certification(&hash)).await?;
            if let Some(path) = out.as_deref() {
                write_bytes(Some(path), &cert.file)?;
            }
            print_json(&serde_json::json!({
                "metadata": cert.metadata,
                "url": cert.url,
                "size": cert.file.len(),
            }))
        }
        Command::Url { hash } => {
            println!("{}", client.blob_url(&hash)?);
            Ok(())
        }
        Command::Status => print_json(&client.status()),
        Command::Health => {
            let progress = FetchProgress::start("health check");
            let report = client.health().await;
            if report.is_healthy() {
                progress.success("health check");
            } else {
                progress.failure("health check");
            }
            print_json(&report)?;
            if !report.is_healthy() {
                bail!("current endpoints are not healthy");
            }
            Ok(())
        }
    }
}

/// Run `fetch` under a spinner, reporting the outcome on stderr.
async fn track<T>(
    description: &str,
    fetch: impl Future<Output = Result<T, TraceError>>,
) -> Result<T, TraceError> {
    let progress = FetchProgress::start(description);
    match fetch.await {
        Ok(value) => {
            progress.success(description);
            Ok(value)
        }
        Err(err) => {
            progress.failure(description);
            Err(err)
        }
    }
}

fn write_bytes(out: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
