//! ---
//! hrms_section: "01-core-functionality"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Shared primitives for the access service runtime."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Shared primitives for the HRMS workspace.
//! This crate exposes configuration loading and tracing setup consumed by
//! the access, persistence and API crates.

pub mod config;
pub mod logging;

pub use config::{
    AccessConfig, ApiConfig, AppConfig, LoggingConfig, MetricsConfig, OverridePrecedence,
    StoreConfig, StoreKind,
};
pub use logging::{init_tracing, LogFormat};
