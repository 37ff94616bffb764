//! ---
//! sg_section: "01-permission-model"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Scope-based permission resolution and authorization engine."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod audit;
pub mod authorizer;
pub mod cache;
pub mod claim;
pub mod directive;
pub mod evaluator;
pub mod expander;
pub mod grant;
pub mod metrics;
pub mod params;
pub mod permission;
pub mod registry;
pub mod resolver;
pub mod role;
pub mod store;

pub use audit::{DecisionAuditLog, DecisionRecord};
pub use authorizer::{Authorizer, AuthorizerSettings, PrincipalClaims, CURRENT_SCHEME_VERSION};
pub use cache::CachedRoleStore;
pub use claim::{format_role_claim, ClaimError, ParsedRoleClaim, ROLE_CLAIM_TYPE};
pub use directive::{DirectiveError, Effect, ScopeDirective};
pub use evaluator::{AccessRequest, Decision, DecisionReason, ScopeEvaluator, Verdict};
pub use grant::PermissionGrant;
pub use metrics::AuthzMetrics;
pub use params::{ParameterError, Parameters};
pub use permission::{CatalogError, PermissionCatalog, PermissionDefinition, PermissionNode};
pub use registry::{RoleDefinitionRegistry, RoleResolution};
pub use resolver::{EffectiveScopes, PermissionResolver, RejectedClaim, StoreKind};
pub use role::{RoleAssignment, RoleDefinition, RoleError, ScopeTemplate, SystemRoleTable, TemplateValue};
pub use store::{AssignmentStore, InMemoryAssignmentStore, InMemoryRoleStore, RoleStore, StoreError};
