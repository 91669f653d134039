//! ---
//! hrms_section: "01-core-functionality"
//! hrms_subsection: "binary"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Binary entrypoint for the HRMS access daemon."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hrms_access::{
    resolve, AccessMetrics, AliasTable, AuditLog, ResolveInput, ResolverPolicy, RoleDefaults,
};
use hrms_api::{spawn_api_server, ApiState};
use hrms_common::config::{AppConfig, OverridePrecedence};
use hrms_common::logging::{init_cli_tracing, init_tracing};
use hrms_persistence::{open_store, AccessStore};
use prometheus::Registry;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "HRMS section access daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the permissions API")]
    Run {
        #[arg(long, value_name = "ADDR", help = "Override api.listen")]
        listen: Option<SocketAddr>,
    },
    #[command(about = "Print the sections a role may open")]
    Resolve {
        #[arg(long, help = "Role key, e.g. MANAGER")]
        role: String,
        #[arg(
            long = "allowed",
            value_delimiter = ',',
            help = "Section hint carried on the session (comma separated)"
        )]
        allowed: Vec<String>,
        #[arg(long, help = "Override access.precedence (server-first | account-first)")]
        precedence: Option<OverridePrecedence>,
        #[arg(long, help = "Emit JSON instead of plain text")]
        json: bool,
    },
    #[command(about = "Print the effective section catalog")]
    Catalog {
        #[arg(long, help = "Emit JSON instead of plain text")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/hrms.toml"));
    candidates.push(PathBuf::from("configs/hrms.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Run { listen: None }) {
        Commands::Run { listen } => {
            init_tracing("hrmsd", &config.logging)?;
            info!(config_path = %loaded.source.display(), "configuration loaded");
            run_daemon(config, listen).await?
        }
        Commands::Resolve {
            role,
            allowed,
            precedence,
            json,
        } => {
            init_cli_tracing();
            print_resolution(&config, &role, &allowed, precedence, json)?
        }
        Commands::Catalog { json } => {
            init_cli_tracing();
            print_catalog(&config, json)?
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig, listen: Option<SocketAddr>) -> Result<()> {
    let metrics = if config.metrics.enabled {
        Some(AccessMetrics::new(Arc::new(Registry::new()))?)
    } else {
        info!("metrics disabled by configuration");
        None
    };

    let store = open_store(&config.store, metrics.clone()).context("failed to open access store")?;
    let mut state = ApiState::new(
        store,
        RoleDefaults::from_config(&config.access),
        ResolverPolicy::from(&config.access),
    );
    if let Some(metrics) = metrics {
        state = state.with_metrics(metrics);
    }
    if let Some(path) = &config.access.audit_log {
        let audit = AuditLog::new(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        info!(path = %path.display(), "grant audit log enabled");
        state = state.with_audit_log(audit);
    }

    let addr = listen.unwrap_or(config.api.listen);
    let server = spawn_api_server(Arc::new(state), addr)?;
    info!(address = %server.addr(), "daemon running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    Ok(())
}

fn print_resolution(
    config: &AppConfig,
    role: &str,
    allowed: &[String],
    precedence: Option<OverridePrecedence>,
    json: bool,
) -> Result<()> {
    let store = open_store(&config.store, None)?;
    let catalog = store.catalog()?;
    let overrides = store.role_access()?;
    let defaults = RoleDefaults::from_config(&config.access);
    let mut policy = ResolverPolicy::from(&config.access);
    if let Some(precedence) = precedence {
        policy.precedence = precedence;
    }

    let aliases = AliasTable::standard();
    let hint = aliases.canonicalize_keys(allowed);
    let access = resolve(
        &ResolveInput {
            role,
            account_override: (!hint.is_empty()).then_some(hint.as_slice()),
            server_overrides: &overrides,
            defaults: &defaults,
            catalog: &catalog,
            aliases,
        },
        &policy,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&access)?);
    } else {
        println!(
            "Role: {}\nSource: {}\nSections: {}",
            access.role.as_ref().map(|r| r.as_str()).unwrap_or("-"),
            access.source.as_str(),
            access
                .keys()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn print_catalog(config: &AppConfig, json: bool) -> Result<()> {
    let catalog = open_store(&config.store, None)?.catalog()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for section in catalog.iter() {
        println!(
            "{:<20} {:<24} {:<24} {}",
            section.key.as_str(),
            section.label,
            section.path,
            section.group.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
