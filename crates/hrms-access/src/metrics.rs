//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

use crate::grant::GrantError;
use crate::resolver::AccessSource;

/// Access-control metrics exported via Prometheus.
#[derive(Clone)]
pub struct AccessMetrics {
    registry: Arc<Registry>,
    resolutions_total: IntCounterVec,
    grant_updates_total: IntCounter,
    grant_rejections_total: IntCounterVec,
    catalog_fallbacks_total: IntCounter,
    audit_failures_total: IntCounter,
}

impl AccessMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let resolutions_total = IntCounterVec::new(
            Opts::new(
                "hrms_access_resolutions_total",
                "Access resolutions by deciding rule",
            ),
            &["source"],
        )?;
        let grant_updates_total =
            IntCounter::new("hrms_grant_updates_total", "Stored role grants replaced")?;
        let grant_rejections_total = IntCounterVec::new(
            Opts::new("hrms_grant_rejections_total", "Refused grant updates by reason"),
            &["reason"],
        )?;
        let catalog_fallbacks_total = IntCounter::new(
            "hrms_catalog_fallbacks_total",
            "Reads served from a fallback source",
        )?;
        let audit_failures_total = IntCounter::new(
            "hrms_audit_failures_total",
            "Grant changes stored without an audit entry",
        )?;

        registry.register(Box::new(resolutions_total.clone()))?;
        registry.register(Box::new(grant_updates_total.clone()))?;
        registry.register(Box::new(grant_rejections_total.clone()))?;
        registry.register(Box::new(catalog_fallbacks_total.clone()))?;
        registry.register(Box::new(audit_failures_total.clone()))?;

        Ok(Self {
            registry,
            resolutions_total,
            grant_updates_total,
            grant_rejections_total,
            catalog_fallbacks_total,
            audit_failures_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count one resolution.
    pub fn observe_resolution(&self, source: AccessSource) {
        self.resolutions_total
            .with_label_values(&[source.as_str()])
            .inc();
    }

    /// Count a stored grant update.
    pub fn inc_grant_update(&self) {
        self.grant_updates_total.inc();
    }

    /// Count a refused grant update.
    pub fn observe_grant_rejection(&self, error: &GrantError) {
        self.grant_rejections_total
            .with_label_values(&[error.reason()])
            .inc();
    }

    /// Count a read that fell back to secondary or built-in data.
    pub fn inc_catalog_fallback(&self) {
        self.catalog_fallbacks_total.inc();
    }

    /// Count a grant change whose audit entry could not be written.
    pub fn inc_audit_failure(&self) {
        self.audit_failures_total.inc();
    }

    /// Resolutions recorded for `source`.
    pub fn resolutions(&self, source: AccessSource) -> u64 {
        self.resolutions_total
            .with_label_values(&[source.as_str()])
            .get()
    }

    /// Fallback reads recorded so far.
    pub fn catalog_fallbacks(&self) -> u64 {
        self.catalog_fallbacks_total.get()
    }

    /// Audit append failures recorded so far.
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_increment() {
        let registry = Arc::new(Registry::new());
        let metrics = AccessMetrics::new(registry.clone()).unwrap();
        metrics.observe_resolution(AccessSource::Locked);
        metrics.observe_resolution(AccessSource::Locked);
        metrics.inc_grant_update();
        metrics.observe_grant_rejection(&GrantError::MissingRole);
        metrics.inc_catalog_fallback();
        metrics.inc_audit_failure();
        assert_eq!(metrics.resolutions(AccessSource::Locked), 2);
        assert_eq!(metrics.resolutions(AccessSource::Baseline), 0);
        assert_eq!(metrics.catalog_fallbacks(), 1);
        assert_eq!(metrics.audit_failures(), 1);
        assert_eq!(registry.gather().len(), 5);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        AccessMetrics::new(registry.clone()).unwrap();
        assert!(AccessMetrics::new(registry).is_err());
    }
}
