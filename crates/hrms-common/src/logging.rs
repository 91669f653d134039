//! ---
//! hrms_section: "01-core-functionality"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Shared primitives for the access service runtime."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "HRMS_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Initialize the tracing subscriber based on configuration and environment variables.
///
/// * `HRMS_LOG` overrides the filter (e.g. `info`, `debug,hrms_access=trace`).
///   When unset `RUST_LOG` is honoured, finally defaulting to `info`.
/// * Stdout receives JSON or pretty output per [`LoggingConfig::format`]; a
///   daily rolling JSON file is always written under the configured directory.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let file_writer = guarded(
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log"))),
        &FILE_GUARD,
    );
    let stdout_writer = guarded(tracing_appender::non_blocking(std::io::stdout()), &STDOUT_GUARD);

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => timed_layer(stdout_writer, false, true),
        LogFormat::Pretty => timed_layer(stdout_writer, true, false),
    };

    tracing_subscriber::registry()
        .with(build_filter(std::env::var(LOG_ENV).ok()))
        .with(stdout_layer)
        .with(timed_layer(file_writer, true, true))
        .try_init()
        .ok();

    info!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    Ok(())
}

/// Keep the worker guard alive for the life of the process.
fn guarded(pair: (NonBlocking, WorkerGuard), slot: &OnceCell<WorkerGuard>) -> NonBlocking {
    let (writer, guard) = pair;
    let _ = slot.set(guard);
    writer
}

/// RFC 3339 timestamped fmt layer, plain or JSON.
fn timed_layer<S>(writer: NonBlocking, with_target: bool, json: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let layer = fmt::layer()
        .with_target(with_target)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Minimal stderr-only subscriber for one-shot CLI commands.
pub fn init_cli_tracing() {
    let _ = tracing_subscriber::registry()
        .with(build_filter(std::env::var(LOG_ENV).ok()))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn build_filter(directive: Option<String>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to {} logging",
                LOG_ENV, err, DEFAULT_DIRECTIVE
            );
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}
