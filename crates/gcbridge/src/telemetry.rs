//! Tracing setup shared by the binary and embedders.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Map a `GCBRIDGE_LOG` value onto a filter directive.
fn filter_directive(level: Option<&str>) -> String {
    let level = match level {
        Some("debug") => "debug",
        Some("trace") => "trace",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("gcbridge={level},gcbridge_cli={level}")
}

/// Install a stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `GCBRIDGE_LOG` picks the level for
/// this crate's targets. `LOG_FORMAT=json` switches to JSON lines. Calling
/// this twice is harmless.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directive(
            std::env::var("GCBRIDGE_LOG").ok().as_deref(),
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}
