use std::process;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};

use gcbridge::{
    BridgeConfig, GcBridge, SidecarGateway, SqliteTaskStore, TaskProcessor, TaskStore,
    default_registry, init_tracing,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://gcbridge.db";
const DEFAULT_SIDECAR_ADDR: &str = "127.0.0.1:27060";
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    Enqueue { task_type: String, payload: String },
    Status { id: Option<i64> },
}

fn usage() {
    eprintln!("Usage: gcbridge <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run                     Process tasks until interrupted");
    eprintln!("  enqueue <TYPE> <JSON>   Queue a task and print its id");
    eprintln!("  status [ID]             Print task counts, or one task as JSON");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GCBRIDGE_DATABASE_URL   Task database [default: {DEFAULT_DATABASE_URL}]");
    eprintln!("  GCBRIDGE_SIDECAR_ADDR   Session sidecar address [default: {DEFAULT_SIDECAR_ADDR}]");
    eprintln!("  GCBRIDGE_LOG            debug|info|warn|error [default: info]");
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut rest = args.iter().skip(1).map(String::as_str);
    let command = match rest.next() {
        Some("run") => Command::Run,
        Some("enqueue") => {
            let task_type = rest.next().ok_or("enqueue requires <TYPE>")?;
            let payload = rest.next().ok_or("enqueue requires <JSON>")?;
            Command::Enqueue {
                task_type: task_type.to_string(),
                payload: payload.to_string(),
            }
        }
        Some("status") => {
            let id = rest
                .next()
                .map(|raw| {
                    raw.parse::<i64>()
                        .map_err(|_| format!("invalid task id: {raw}"))
                })
                .transpose()?;
            Command::Status { id }
        }
        Some("--help") | Some("-h") | None => return Err(String::new()),
        Some(other) => return Err(format!("unknown command: {other}")),
    };

    if let Some(extra) = rest.next() {
        return Err(format!("unexpected argument: {extra}"));
    }
    Ok(command)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

async fn open_store() -> anyhow::Result<Arc<SqliteTaskStore>> {
    let url = env_or("GCBRIDGE_DATABASE_URL", DEFAULT_DATABASE_URL);
    let store = SqliteTaskStore::connect(&url)
        .await
        .with_context(|| format!("failed to open task store at {url}"))?;
    store.init().await.context("failed to initialize task store")?;
    Ok(Arc::new(store))
}

/// Resolves once Ctrl-C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run() -> anyhow::Result<()> {
    let config = BridgeConfig::default();
    let store = open_store().await?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let sidecar_addr = env_or("GCBRIDGE_SIDECAR_ADDR", DEFAULT_SIDECAR_ADDR);
    let gateway = Arc::new(SidecarGateway::new(sidecar_addr.clone(), event_tx));
    let bridge = Arc::new(GcBridge::new(config.clone(), gateway));

    let registry = default_registry(Arc::clone(&bridge))?;
    registry.install_routes(&bridge)?;

    let processor = Arc::new(TaskProcessor::new(
        store,
        Arc::new(registry),
        config.poll_interval,
    ));
    processor.startup_check().await?;

    tracing::info!(
        version = gcbridge::VERSION,
        app_id = config.app_id,
        sidecar = %sidecar_addr,
        "Starting gcbridge"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    bridge.start().await;
    let event_loop = tokio::spawn(
        Arc::clone(&bridge).run_event_loop(event_rx, shutdown_rx.clone()),
    );
    let processing = tokio::spawn(Arc::clone(&processor).run(shutdown_rx));

    shutdown_signal().await;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    // Processor first: its in-flight task still needs the event loop.
    processing.await.context("task processor panicked")?;
    event_loop.await.context("event loop panicked")?;
    tracing::info!("gcbridge stopped");
    Ok(())
}

async fn enqueue(task_type: &str, payload: &str) -> anyhow::Result<()> {
    serde_json::from_str::<serde_json::Value>(payload)
        .with_context(|| format!("payload is not valid JSON: {payload}"))?;
    let store = open_store().await?;
    let id = store.enqueue(task_type, payload).await?;
    println!("{id}");
    Ok(())
}

async fn status(id: Option<i64>) -> anyhow::Result<()> {
    let store = open_store().await?;
    let json = match id {
        Some(id) => {
            let task = store
                .get(id)
                .await?
                .with_context(|| format!("no task with id {id}"))?;
            serde_json::to_string_pretty(&task)?
        }
        None => serde_json::to_string_pretty(&store.counts().await?)?,
    };
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            usage();
            process::exit(2);
        }
    };

    init_tracing();

    let result = match command {
        Command::Run => run().await,
        Command::Enqueue { task_type, payload } => enqueue(&task_type, &payload).await,
        Command::Status { id } => status(id).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("gcbridge")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_args(&args(&["run"])), Ok(Command::Run));
        assert_eq!(
            parse_args(&args(&["enqueue", "SUBMIT_VALUE", r#"{"accountId":1}"#])),
            Ok(Command::Enqueue {
                task_type: "SUBMIT_VALUE".into(),
                payload: r#"{"accountId":1}"#.into(),
            })
        );
        assert_eq!(parse_args(&args(&["status"])), Ok(Command::Status { id: None }));
        assert_eq!(
            parse_args(&args(&["status", "7"])),
            Ok(Command::Status { id: Some(7) })
        );
    }

    #[test]
    fn rejects_bad_usage() {
        assert_eq!(parse_args(&args(&[])), Err(String::new()));
        assert!(parse_args(&args(&["enqueue", "SUBMIT_VALUE"])).is_err());
        assert!(parse_args(&args(&["status", "seven"])).is_err());
        assert!(parse_args(&args(&["run", "now"])).is_err());
        assert!(parse_args(&args(&["serve"])).is_err());
    }
}
