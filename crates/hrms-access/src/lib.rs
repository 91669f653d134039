//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod audit;
pub mod canonical;
pub mod grant;
pub mod metrics;
pub mod navigation;
pub mod resolver;
pub mod role;
pub mod section;
pub mod session;

pub use audit::{AuditEntry, AuditLog};
pub use canonical::{canonicalize_key, canonicalize_keys, AliasEntry, AliasTable, ATTENDANCE};
pub use grant::{prepare_grant, role_access_view, GrantError, GrantRecord, GrantRequest};
pub use metrics::AccessMetrics;
pub use navigation::{FetchTicket, GateState, MenuItem, NavigationGate, NavigationOutcome};
pub use resolver::{expand_groups, resolve, AccessSource, ResolveInput, ResolvedAccess, ResolverPolicy};
pub use role::{is_locked_role, Role, RoleAccessMap, RoleDefaults, RoleKey, LOCKED_ROLES};
pub use section::{AppSection, SectionCatalog, SectionKey};
pub use session::{AccountSession, MemorySessionStorage, SessionStorage, SESSION_STORAGE_KEY};
