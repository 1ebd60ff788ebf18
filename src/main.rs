use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hookline::{
    config, CallResult, Operation, OperationType, OrchestratorError, Priority, QueueEvent,
    ReqwestTransport, WebhookService,
};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = cli::Cli::parse();
    let cfg = match &args.config {
        Some(path) => config::from_yaml_file(path)?,
        None => config::load()?,
    };

    let transport = Arc::new(ReqwestTransport::new()?);
    let service = WebhookService::new(cfg, transport)?;

    let result = match args.command {
        cli::Commands::Health => handle_health(&service).await,
        cli::Commands::Invoke { operation, payload } => {
            handle_invoke(&service, &operation, &payload).await
        }
        cli::Commands::Enqueue {
            op_type,
            payload,
            priority,
        } => handle_enqueue(&service, &op_type, &payload, &priority).await,
        cli::Commands::Endpoints => {
            let entries: Vec<Value> = service
                .endpoints()
                .into_iter()
                .map(|(op, path)| json!({"operation": op.as_str(), "path": path}))
                .collect();
            print_json(&entries)
        }
        cli::Commands::Status => handle_status(&service),
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            let code = e
                .downcast_ref::<OrchestratorError>()
                .map_or("internal_error", OrchestratorError::code);
            tracing::error!(code, "command failed: {:#}", e);
            eprintln!("error[{}]: {:#}", code, e);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` filters (default `hookline=info`); `HOOKLINE_LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hookline=info"));
    let json = std::env::var("HOOKLINE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn handle_health(service: &WebhookService) -> anyhow::Result<bool> {
    let result = service.test_connection().await?;
    print_json(&json!({
        "connection": result,
        "health": service.health_status(),
    }))?;
    Ok(result.success)
}

fn handle_status(service: &WebhookService) -> anyhow::Result<bool> {
    let config = service.config();
    print_json(&json!({
        "health": service.health_status(),
        "queue": service.batch_queue_status(),
        "timeoutMs": config.timeout_ms,
        "maxRetries": config.max_retries,
    }))?;
    print!("{}", service.render_metrics());
    Ok(true)
}

async fn handle_invoke(
    service: &WebhookService,
    operation: &str,
    payload: &str,
) -> anyhow::Result<bool> {
    let operation: Operation = operation.parse()?;
    let body = read_payload(payload)?;
    let result = service.invoke(operation, body).await?;
    print_result(&result)
}

async fn handle_enqueue(
    service: &WebhookService,
    op_type: &str,
    payload: &str,
    priority: &str,
) -> anyhow::Result<bool> {
    let op_type: OperationType = op_type.parse().map_err(anyhow::Error::msg)?;
    let priority: Priority = priority.parse().map_err(anyhow::Error::msg)?;
    let body = read_payload(payload)?;

    let mut events = service.subscribe_queue_events();
    let id = service.enqueue(op_type, body, priority)?;
    tracing::info!(operation_id = %id, "operation queued");
    service.wait_for_queue_idle().await;

    let mut outcome = None;
    while let Ok(event) = events.try_recv() {
        match event {
            QueueEvent::Completed { operation, result } if operation.id == id => {
                outcome = Some(result)
            }
            QueueEvent::Failed { operation, result } if operation.id == id => {
                outcome = Some(result)
            }
            QueueEvent::RetryScheduled {
                retry_count,
                max_retries,
                ..
            } => tracing::info!(retry_count, max_retries, "queued operation will be retried"),
            _ => {}
        }
    }

    match outcome {
        Some(result) => print_result(&result),
        None => anyhow::bail!("queue drained without reporting operation {}", id),
    }
}

fn read_payload(raw: &str) -> anyhow::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read payload file {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("payload is not valid JSON")
}

fn print_result(result: &CallResult) -> anyhow::Result<bool> {
    print_json(result)?;
    Ok(result.success)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(true)
}
