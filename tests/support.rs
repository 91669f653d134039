//! ---
//! hrms_section: "15-testing-qa-runbook"
//! hrms_subsection: "integration-tests"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Integration and validation tests for the HRMS access stack."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Shared fixtures for the integration suites.

use std::sync::Arc;

use anyhow::Result;
use hrms_access::{AccessMetrics, AuditLog, ResolverPolicy, RoleDefaults};
use hrms_api::{spawn_api_server, ApiServer, ApiState};
use hrms_common::config::AppConfig;
use hrms_persistence::open_store;
use prometheus::Registry;

/// A running API server wired the way the daemon wires it.
pub struct Harness {
    pub server: ApiServer,
    pub base: String,
    pub metrics: AccessMetrics,
    pub client: reqwest::Client,
}

impl Harness {
    /// Spawn on an ephemeral port using `config` for store and access settings.
    pub fn spawn(config: &AppConfig) -> Result<Self> {
        let metrics = AccessMetrics::new(Arc::new(Registry::new()))?;
        let store = open_store(&config.store, Some(metrics.clone()))?;
        let mut state = ApiState::new(
            store,
            RoleDefaults::from_config(&config.access),
            ResolverPolicy::from(&config.access),
        )
        .with_metrics(metrics.clone());
        if let Some(path) = &config.access.audit_log {
            state = state.with_audit_log(AuditLog::new(path)?);
        }
        let server = spawn_api_server(Arc::new(state), "127.0.0.1:0".parse()?)?;
        let base = format!("http://{}", server.addr());
        Ok(Self {
            server,
            base,
            metrics,
            client: reqwest::Client::new(),
        })
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Stop the server.
    pub async fn stop(self) -> Result<()> {
        self.server.shutdown().await
    }
}

/// Parse a TOML configuration document.
pub fn config_from_toml(toml: &str) -> Result<AppConfig> {
    toml.parse()
}
