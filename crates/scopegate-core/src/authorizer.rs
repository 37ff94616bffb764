//! ---
//! sg_section: "04-resolution-evaluation"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Authorization entry point wiring resolver, evaluator, metrics and audit."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::audit::DecisionAuditLog;
use crate::cache::CachedRoleStore;
use crate::evaluator::{AccessRequest, Decision, DecisionReason, ScopeEvaluator, Verdict};
use crate::grant::PermissionGrant;
use crate::metrics::AuthzMetrics;
use crate::permission::PermissionCatalog;
use crate::registry::RoleDefinitionRegistry;
use crate::resolver::{EffectiveScopes, PermissionResolver};
use crate::role::SystemRoleTable;
use crate::store::{AssignmentStore, RoleStore};

/// Current authorization-scheme marker.
pub const CURRENT_SCHEME_VERSION: u32 = 2;

/// Tunables for [`Authorizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerSettings {
    /// Upper bound on every store call.
    pub store_timeout: Duration,
    /// Role cache lifetime; zero disables the cache.
    pub role_cache_ttl: Duration,
    /// Deny requests for permissions the catalog does not define.
    pub reject_unknown_permissions: bool,
    /// Scheme marker principals are expected to carry.
    pub scheme_version: u32,
}

impl Default for AuthorizerSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(250),
            role_cache_ttl: Duration::ZERO,
            reject_unknown_permissions: true,
            scheme_version: CURRENT_SCHEME_VERSION,
        }
    }
}

/// Authorization state carried by a principal's token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalClaims {
    /// Stable user identifier.
    pub user_id: String,
    /// Raw `role` claims.
    #[serde(default)]
    pub role_claims: Vec<String>,
    /// Authorization-scheme marker, if present.
    #[serde(default)]
    pub scheme_version: Option<u32>,
}

impl PrincipalClaims {
    /// Principal with no claims.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Add one role claim.
    pub fn with_role_claim(mut self, claim: impl Into<String>) -> Self {
        self.role_claims.push(claim.into());
        self
    }

    /// Set the scheme marker.
    pub fn with_scheme_version(mut self, version: u32) -> Self {
        self.scheme_version = Some(version);
        self
    }
}

/// Resolves effective scopes and answers authorization questions.
pub struct Authorizer {
    resolver: PermissionResolver,
    evaluator: ScopeEvaluator,
    settings: AuthorizerSettings,
    metrics: Option<AuthzMetrics>,
    audit: Option<Mutex<DecisionAuditLog>>,
}

impl Authorizer {
    /// Wire an authorizer over the given catalog, system roles and stores.
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        system_roles: Arc<SystemRoleTable>,
        role_store: Arc<dyn RoleStore>,
        assignment_store: Arc<dyn AssignmentStore>,
        settings: AuthorizerSettings,
    ) -> Self {
        let role_store: Arc<dyn RoleStore> = if settings.role_cache_ttl.is_zero() {
            role_store
        } else {
            Arc::new(CachedRoleStore::new(role_store, settings.role_cache_ttl))
        };
        let registry =
            RoleDefinitionRegistry::new(system_roles, role_store, catalog, settings.store_timeout);
        let resolver = PermissionResolver::new(registry, assignment_store, settings.store_timeout);
        Self {
            resolver,
            evaluator: ScopeEvaluator::new(),
            settings,
            metrics: None,
            audit: None,
        }
    }

    /// Export counters and latency to `metrics`.
    pub fn with_metrics(mut self, metrics: AuthzMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record every decision to the hash-chained log at `path`.
    pub fn with_audit_log(mut self, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        self.audit = Some(Mutex::new(DecisionAuditLog::open(path)?));
        Ok(self)
    }

    /// Underlying resolver.
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Active settings.
    pub fn settings(&self) -> &AuthorizerSettings {
        &self.settings
    }

    /// Decide using the principal's claims and a caller-supplied grant snapshot.
    pub async fn authorize(
        &self,
        principal: &PrincipalClaims,
        grants: &[PermissionGrant],
        request: &AccessRequest,
    ) -> Decision {
        let started = Instant::now();
        self.check_scheme(principal);
        if let Some(decision) = self.reject_unknown(request) {
            return self.finish(&principal.user_id, request, None, decision, started);
        }
        let scopes = self
            .resolver
            .resolve_claims(&principal.user_id, &principal.role_claims, grants)
            .await;
        let decision = self.decide(&principal.user_id, request, &scopes);
        self.finish(&principal.user_id, request, Some(&scopes), decision, started)
    }

    /// Decide using the principal's claims and grants read fresh from the store.
    pub async fn authorize_user(
        &self,
        principal: &PrincipalClaims,
        request: &AccessRequest,
    ) -> Decision {
        let started = Instant::now();
        self.check_scheme(principal);
        if let Some(decision) = self.reject_unknown(request) {
            return self.finish(&principal.user_id, request, None, decision, started);
        }
        let scopes = self
            .resolver
            .resolve_user_claims(&principal.user_id, &principal.role_claims)
            .await;
        let decision = self.decide(&principal.user_id, request, &scopes);
        self.finish(&principal.user_id, request, Some(&scopes), decision, started)
    }

    /// Decide from stored assignments and grants only, without token claims.
    pub async fn authorize_assigned(&self, user_id: &str, request: &AccessRequest) -> Decision {
        let started = Instant::now();
        if let Some(decision) = self.reject_unknown(request) {
            return self.finish(user_id, request, None, decision, started);
        }
        let scopes = self.resolver.resolve_for_user(user_id).await;
        let decision = self.decide(user_id, request, &scopes);
        self.finish(user_id, request, Some(&scopes), decision, started)
    }

    // Any failed store may have held a deny, so an allow over a partial set is withheld.
    fn decide(&self, principal: &str, request: &AccessRequest, scopes: &EffectiveScopes) -> Decision {
        let decision = self.evaluator.evaluate(request, &scopes.directives);
        if !decision.is_allow() || !scopes.is_degraded() {
            return decision;
        }
        let failed: Vec<&str> = scopes.store_failures.iter().map(|(kind, _)| kind.as_str()).collect();
        warn!(
            user = %principal,
            permission = ?request.permission,
            stores = ?failed,
            "withholding allow: directive set incomplete"
        );
        Decision {
            match_count: decision.match_count,
            ..Decision::deny(DecisionReason::Degraded)
        }
    }

    // The marker is diagnostic only; it never alters the directive set or the verdict.
    fn check_scheme(&self, principal: &PrincipalClaims) {
        match principal.scheme_version {
            Some(version) if version == self.settings.scheme_version => {}
            Some(version) => warn!(
                user = %principal.user_id,
                version,
                expected = self.settings.scheme_version,
                "principal carries an unexpected authorization scheme version"
            ),
            None => warn!(
                user = %principal.user_id,
                "principal carries no authorization scheme marker"
            ),
        }
    }

    fn reject_unknown(&self, request: &AccessRequest) -> Option<Decision> {
        let catalog = self.resolver.registry().catalog();
        if self.settings.reject_unknown_permissions && !catalog.contains(&request.permission) {
            debug!(permission = ?request.permission, "permission not in catalog");
            return Some(Decision::deny(DecisionReason::UnknownPermission));
        }
        None
    }

    fn finish(
        &self,
        principal: &str,
        request: &AccessRequest,
        scopes: Option<&EffectiveScopes>,
        decision: Decision,
        started: Instant,
    ) -> Decision {
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.verdict);
            metrics.observe_evaluation(started.elapsed().as_secs_f64());
            if let Some(scopes) = scopes {
                metrics.record_rejected("role_claim", scopes.rejected_claims.len());
                for (store, _) in &scopes.store_failures {
                    metrics.record_store_failure(*store);
                }
            }
        }

        let matched = decision.matched.as_ref().map(|d| d.format());
        match decision.verdict {
            Verdict::Allow => info!(
                user = %principal,
                permission = ?request.permission,
                reason = decision.reason.as_str(),
                matched = matched.as_deref().unwrap_or("-"),
                "access allowed"
            ),
            Verdict::Deny => info!(
                user = %principal,
                permission = ?request.permission,
                reason = decision.reason.as_str(),
                matched = matched.as_deref().unwrap_or("-"),
                degraded = scopes.is_some_and(EffectiveScopes::is_degraded),
                "access denied"
            ),
        }

        if let Some(audit) = &self.audit {
            if let Err(err) = audit.lock().record(principal, request, &decision) {
                error!(error = %err, "failed to append decision audit record");
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Effect;
    use crate::role::{RoleAssignment, RoleDefinition, ScopeTemplate};
    use crate::store::{InMemoryAssignmentStore, InMemoryRoleStore};
    use prometheus::Registry;
    use tempfile::tempdir;

    fn authorizer(
        roles: InMemoryRoleStore,
        assignments: InMemoryAssignmentStore,
        settings: AuthorizerSettings,
    ) -> Authorizer {
        Authorizer::new(
            Arc::new(PermissionCatalog::builtin()),
            Arc::new(SystemRoleTable::builtin()),
            Arc::new(roles),
            Arc::new(assignments),
            settings,
        )
    }

    fn default_authorizer() -> Authorizer {
        authorizer(
            InMemoryRoleStore::new(),
            InMemoryAssignmentStore::new(),
            AuthorizerSettings::default(),
        )
    }

    #[tokio::test]
    async fn user_role_scenario() {
        let authz = default_authorizer();
        let principal = PrincipalClaims::new("u-42")
            .with_role_claim("USER;userId=42")
            .with_scheme_version(CURRENT_SCHEME_VERSION);
        let own = AccessRequest::new("api:users:_read").with_resource("userId", "42");
        let other = AccessRequest::new("api:users:_read").with_resource("userId", "99");
        assert_eq!(authz.authorize(&principal, &[], &own).await.verdict, Verdict::Allow);
        assert_eq!(authz.authorize(&principal, &[], &other).await.verdict, Verdict::Deny);
    }

    #[tokio::test]
    async fn missing_scheme_marker_is_not_a_bypass() {
        let authz = default_authorizer();
        let legacy = PrincipalClaims::new("legacy");
        for permission in ["api:iam:roles:_write", "api:users:_read", "api"] {
            let decision = authz
                .authorize(&legacy, &[], &AccessRequest::new(permission))
                .await;
            assert_eq!(decision.verdict, Verdict::Deny, "{permission}");
        }
        let downlevel = PrincipalClaims::new("legacy").with_scheme_version(1);
        let decision = authz
            .authorize(&downlevel, &[], &AccessRequest::new("api:audit:_read"))
            .await;
        assert_eq!(decision.reason, DecisionReason::NoMatch);
    }

    #[tokio::test]
    async fn marker_does_not_remove_legitimate_scopes() {
        let authz = default_authorizer();
        let principal = PrincipalClaims::new("a-1").with_role_claim("AUDITOR");
        let decision = authz
            .authorize(&principal, &[], &AccessRequest::new("api:audit:_read"))
            .await;
        assert!(decision.is_allow());
    }

    #[tokio::test]
    async fn direct_deny_grant_overrides_role() {
        let authz = default_authorizer();
        let principal = PrincipalClaims::new("root").with_role_claim("ADMIN");
        let grants = [PermissionGrant::deny("root", "api:iam:grants")];
        let blocked = AccessRequest::new("api:iam:grants:_write").with_resource("userId", "7");
        let open = AccessRequest::new("api:iam:roles:_write");
        let decision = authz.authorize(&principal, &grants, &blocked).await;
        assert_eq!(decision.reason, DecisionReason::DenyOverride);
        assert!(authz.authorize(&principal, &grants, &open).await.is_allow());
    }

    #[tokio::test]
    async fn unknown_permissions_follow_settings() {
        let principal = PrincipalClaims::new("root").with_role_claim("ADMIN");
        let request = AccessRequest::new("api:reports:_read");

        let strict = default_authorizer();
        assert_eq!(
            strict.authorize(&principal, &[], &request).await.reason,
            DecisionReason::UnknownPermission
        );

        let lenient = authorizer(
            InMemoryRoleStore::new(),
            InMemoryAssignmentStore::new(),
            AuthorizerSettings {
                reject_unknown_permissions: false,
                ..AuthorizerSettings::default()
            },
        );
        assert!(lenient.authorize(&principal, &[], &request).await.is_allow());
    }

    #[tokio::test]
    async fn fresh_grants_and_assignments() {
        let assignments = InMemoryAssignmentStore::new();
        assignments.assign_role(RoleAssignment::new("u-5", "ORG_MEMBER").with_parameter("orgId", "acme"));
        assignments.grant_permission(PermissionGrant::allow("u-5", "api:audit:_read"));
        let authz = authorizer(
            InMemoryRoleStore::new(),
            assignments.clone(),
            AuthorizerSettings::default(),
        );
        let audit = AccessRequest::new("api:audit:_read");
        let principal = PrincipalClaims::new("u-5");
        assert!(authz.authorize_user(&principal, &audit).await.is_allow());

        assignments.revoke_grant("u-5", "api:audit:_read");
        assert!(!authz.authorize_user(&principal, &audit).await.is_allow());

        let org = AccessRequest::new("api:orgs:members:_read").with_resource("orgId", "acme");
        assert!(authz.authorize_assigned("u-5", &org).await.is_allow());
        assignments.set_offline(true);
        let decision = authz.authorize_assigned("u-5", &org).await;
        assert_eq!(decision.verdict, Verdict::Deny);
    }

    #[tokio::test]
    async fn grant_outage_never_lifts_a_deny_grant() {
        let assignments = InMemoryAssignmentStore::new();
        assignments.grant_permission(PermissionGrant::deny("root", "api:iam"));
        let authz = authorizer(
            InMemoryRoleStore::new(),
            assignments.clone(),
            AuthorizerSettings::default(),
        );
        let principal = PrincipalClaims::new("root").with_role_claim("ADMIN");
        let request = AccessRequest::new("api:iam:roles:_write");
        assert_eq!(
            authz.authorize_user(&principal, &request).await.reason,
            DecisionReason::DenyOverride
        );

        assignments.set_offline(true);
        let decision = authz.authorize_user(&principal, &request).await;
        assert_eq!(decision.verdict, Verdict::Deny);
        assert_eq!(decision.reason, DecisionReason::Degraded);
        assert!(decision.matched.is_none());
    }

    #[tokio::test]
    async fn role_outage_never_lifts_a_custom_deny() {
        let roles = InMemoryRoleStore::with_roles([RoleDefinition::custom("READ_ONLY", "Read only")
            .with_template(ScopeTemplate::new(Effect::Deny, "api:iam"))]);
        let authz = authorizer(roles.clone(), InMemoryAssignmentStore::new(), AuthorizerSettings::default());
        let principal = PrincipalClaims::new("root")
            .with_role_claim("ADMIN")
            .with_role_claim("READ_ONLY");
        let request = AccessRequest::new("api:iam:roles:_write");
        assert!(!authz.authorize(&principal, &[], &request).await.is_allow());

        roles.set_offline(true);
        let decision = authz.authorize(&principal, &[], &request).await;
        assert_eq!(decision.reason, DecisionReason::Degraded);

        // System-only principals never touch the role store.
        let admin = PrincipalClaims::new("root").with_role_claim("ADMIN");
        assert!(authz.authorize(&admin, &[], &request).await.is_allow());
    }

    #[tokio::test]
    async fn cached_custom_roles_resolve() {
        let roles = InMemoryRoleStore::with_roles([RoleDefinition::custom("SUPPORT", "Support")
            .with_template(ScopeTemplate::new(Effect::Allow, "api:users:_read"))]);
        let authz = authorizer(
            roles.clone(),
            InMemoryAssignmentStore::new(),
            AuthorizerSettings {
                role_cache_ttl: Duration::from_secs(60),
                ..AuthorizerSettings::default()
            },
        );
        let principal = PrincipalClaims::new("s-1").with_role_claim("SUPPORT");
        let request = AccessRequest::new("api:users:_read").with_resource("userId", "3");
        assert!(authz.authorize(&principal, &[], &request).await.is_allow());
        roles.set_offline(true);
        assert!(authz.authorize(&principal, &[], &request).await.is_allow());
    }

    #[tokio::test]
    async fn metrics_and_audit_are_recorded() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(Registry::new());
        let metrics = AuthzMetrics::new(registry).unwrap();
        let authz = default_authorizer()
            .with_metrics(metrics.clone())
            .with_audit_log(dir.path().join("decisions.log"))
            .unwrap();
        let principal = PrincipalClaims::new("u-1").with_role_claim("USER;userId=1").with_role_claim("BAD;=x");
        authz
            .authorize(&principal, &[], &AccessRequest::new("api:users:_read").with_resource("userId", "1"))
            .await;
        authz
            .authorize(&principal, &[], &AccessRequest::new("api:audit:_read"))
            .await;
        assert_eq!(metrics.decisions(Verdict::Allow), 1);
        assert_eq!(metrics.decisions(Verdict::Deny), 1);

        let log = DecisionAuditLog::open(dir.path().join("decisions.log")).unwrap();
        assert_eq!(log.records().unwrap().len(), 2);
        assert!(log.verify().unwrap());
    }
}
