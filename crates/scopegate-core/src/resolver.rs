//! ---
//! sg_section: "04-resolution-evaluation"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Aggregates expanded role scopes and direct grants per request."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! Effective scopes are recomputed from live role and grant data on every
//! call; nothing expanded is ever cached in a token.
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::claim::{ClaimError, ParsedRoleClaim};
use crate::directive::ScopeDirective;
use crate::expander;
use crate::grant::PermissionGrant;
use crate::registry::RoleDefinitionRegistry;
use crate::role::RoleAssignment;
use crate::store::{bounded, AssignmentStore, StoreError};

/// A role claim that failed to decode and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedClaim {
    /// Raw claim as received.
    pub claim: String,
    /// Decode failure.
    pub error: ClaimError,
}

/// Which external store failed during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Custom role definitions.
    Roles,
    /// Role assignments.
    Assignments,
    /// Direct grants.
    Grants,
}

impl StoreKind {
    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Roles => "roles",
            StoreKind::Assignments => "assignments",
            StoreKind::Grants => "grants",
        }
    }
}

/// Effective directive set for one request plus resolution diagnostics.
#[derive(Debug, Clone, Default)]
pub struct EffectiveScopes {
    /// Union of expanded role scopes and grant directives, deduplicated, in insertion order.
    pub directives: Vec<ScopeDirective>,
    /// Claims skipped because they were malformed.
    pub rejected_claims: Vec<RejectedClaim>,
    /// Role codes that resolved to nothing.
    pub unresolved_roles: Vec<String>,
    /// Store failures that were absorbed by failing closed.
    pub store_failures: Vec<(StoreKind, StoreError)>,
}

impl EffectiveScopes {
    /// True when any store failure reduced the directive set.
    pub fn is_degraded(&self) -> bool {
        !self.store_failures.is_empty()
    }
}

/// Decode role claims, separating malformed ones.
pub fn parse_role_claims<S: AsRef<str>>(claims: &[S]) -> (Vec<ParsedRoleClaim>, Vec<RejectedClaim>) {
    let mut parsed = Vec::with_capacity(claims.len());
    let mut rejected = Vec::new();
    for claim in claims {
        let claim = claim.as_ref();
        match ParsedRoleClaim::try_parse(claim) {
            Ok(value) => parsed.push(value),
            Err(error) => {
                // Debug formatting escapes control characters in the raw claim.
                warn!(claim = ?claim, error = %error, "rejecting malformed role claim");
                rejected.push(RejectedClaim {
                    claim: claim.to_owned(),
                    error,
                });
            }
        }
    }
    (parsed, rejected)
}

/// Computes effective directives from roles, assignments and grants.
#[derive(Clone)]
pub struct PermissionResolver {
    registry: RoleDefinitionRegistry,
    assignments: Arc<dyn AssignmentStore>,
    timeout: Duration,
}

impl PermissionResolver {
    /// Resolver over a registry and an assignment/grant store.
    pub fn new(
        registry: RoleDefinitionRegistry,
        assignments: Arc<dyn AssignmentStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            assignments,
            timeout,
        }
    }

    /// Underlying role registry.
    pub fn registry(&self) -> &RoleDefinitionRegistry {
        &self.registry
    }

    /// Union of the expanded `assignments` and `grants`.
    pub async fn resolve_assignments(
        &self,
        assignments: &[RoleAssignment],
        grants: &[PermissionGrant],
    ) -> EffectiveScopes {
        let mut scopes = EffectiveScopes::default();
        let codes: Vec<String> = assignments.iter().map(|a| a.role_code.clone()).collect();
        let resolution = self.registry.resolve_by_codes(&codes).await;
        if let Some(err) = resolution.store_error {
            scopes.store_failures.push((StoreKind::Roles, err));
        }
        scopes.unresolved_roles = resolution.unresolved;

        let mut directives = IndexSet::new();
        for assignment in assignments {
            let role = resolution
                .roles
                .iter()
                .find(|role| role.code.eq_ignore_ascii_case(assignment.role_code.trim()));
            match role {
                Some(role) => directives.extend(expander::expand(assignment, role)),
                None => debug!(
                    user = %assignment.user_id,
                    role = %assignment.role_code,
                    "assignment contributes no scopes"
                ),
            }
        }
        directives.extend(grants.iter().map(PermissionGrant::to_directive));

        scopes.directives = directives.into_iter().collect();
        scopes
    }

    /// Decode `role_claims` for `user_id` and union with `grants`.
    ///
    /// Malformed claims are skipped individually.
    pub async fn resolve_claims<S: AsRef<str>>(
        &self,
        user_id: &str,
        role_claims: &[S],
        grants: &[PermissionGrant],
    ) -> EffectiveScopes {
        let (parsed, rejected) = parse_role_claims(role_claims);
        let assignments: Vec<RoleAssignment> = parsed
            .into_iter()
            .map(|claim| RoleAssignment::from_claim(user_id, claim))
            .collect();
        let mut scopes = self.resolve_assignments(&assignments, grants).await;
        scopes.rejected_claims = rejected;
        scopes
    }

    /// Fetch the user's grants under the store timeout. Failures yield no grants.
    pub async fn fetch_grants(&self, user_id: &str) -> Result<Vec<PermissionGrant>, StoreError> {
        bounded(self.timeout, self.assignments.get_grants(user_id))
            .await
            .inspect_err(|err| {
                warn!(user = %user_id, error = %err, "grant lookup failed; continuing without grants")
            })
    }

    /// Claims from the token, grants read fresh from the store.
    pub async fn resolve_user_claims<S: AsRef<str>>(
        &self,
        user_id: &str,
        role_claims: &[S],
    ) -> EffectiveScopes {
        let (grants, failure) = match self.fetch_grants(user_id).await {
            Ok(grants) => (grants, None),
            Err(err) => (Vec::new(), Some(err)),
        };
        let mut scopes = self.resolve_claims(user_id, role_claims, &grants).await;
        if let Some(err) = failure {
            scopes.store_failures.push((StoreKind::Grants, err));
        }
        scopes
    }

    /// Assignments and grants both read fresh from the store.
    pub async fn resolve_for_user(&self, user_id: &str) -> EffectiveScopes {
        let mut failures = Vec::new();
        let assignments =
            match bounded(self.timeout, self.assignments.get_assignments(user_id)).await {
                Ok(assignments) => assignments,
                Err(err) => {
                    warn!(user = %user_id, error = %err, "assignment lookup failed; continuing without roles");
                    failures.push((StoreKind::Assignments, err));
                    Vec::new()
                }
            };
        let grants = match self.fetch_grants(user_id).await {
            Ok(grants) => grants,
            Err(err) => {
                failures.push((StoreKind::Grants, err));
                Vec::new()
            }
        };
        let mut scopes = self.resolve_assignments(&assignments, &grants).await;
        scopes.store_failures.extend(failures);
        scopes
    }
}
