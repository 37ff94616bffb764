//! ---
//! sg_section: "08-testing"
//! sg_subsection: "integration-tests"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "End-to-end authorization properties across the public API."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use scopegate_core::role::{RoleAssignment, USER_ROLE_ID};
use scopegate_core::{
    AccessRequest, Authorizer, AuthorizerSettings, AuthzMetrics, DecisionAuditLog, DecisionReason,
    Effect, InMemoryAssignmentStore, InMemoryRoleStore, ParsedRoleClaim, Parameters,
    PermissionCatalog, PermissionGrant, PrincipalClaims, RoleDefinition, ScopeDirective,
    ScopeEvaluator, ScopeTemplate, SystemRoleTable, Verdict,
};
use tempfile::tempdir;

struct Harness {
    roles: InMemoryRoleStore,
    assignments: InMemoryAssignmentStore,
    authorizer: Authorizer,
}

fn harness(settings: AuthorizerSettings) -> Harness {
    let roles = InMemoryRoleStore::new();
    let assignments = InMemoryAssignmentStore::new();
    let authorizer = Authorizer::new(
        Arc::new(PermissionCatalog::builtin()),
        Arc::new(SystemRoleTable::builtin()),
        Arc::new(roles.clone()),
        Arc::new(assignments.clone()),
        settings,
    );
    Harness {
        roles,
        assignments,
        authorizer,
    }
}

fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn user_reads_only_their_own_record() {
    let h = harness(AuthorizerSettings::default());
    let principal = PrincipalClaims::new("u-42")
        .with_role_claim("USER;userId=42")
        .with_scheme_version(2);

    let own = AccessRequest::new("api:users:_read").with_resource("userId", "42");
    let other = AccessRequest::new("api:users:_read").with_resource("userId", "99");

    let allowed = h.authorizer.authorize(&principal, &[], &own).await;
    assert_eq!(allowed.verdict, Verdict::Allow);
    assert_eq!(
        allowed.matched,
        Some(ScopeDirective::allow("api:users:_read").with_parameter("userId", "42"))
    );
    let denied = h.authorizer.authorize(&principal, &[], &other).await;
    assert_eq!(denied.verdict, Verdict::Deny);
    assert_eq!(denied.reason, DecisionReason::NoMatch);
}

#[test]
fn claim_and_directive_round_trip() {
    for (code, bindings) in [
        ("USER", params(&[("userId", "42")])),
        ("ORG_ADMIN", params(&[("orgId", "acme-co"), ("region", "eu west")])),
        ("AUDITOR", Parameters::new()),
    ] {
        let claim = ParsedRoleClaim {
            code: code.to_string(),
            parameters: bindings.clone(),
        };
        assert_eq!(ParsedRoleClaim::try_parse(&claim.format()).unwrap(), claim);

        let directive = ScopeDirective {
            effect: Effect::Deny,
            permission_path: "api:orgs:members".to_string(),
            parameters: bindings,
        };
        assert_eq!(ScopeDirective::parse(&directive.format()).unwrap(), directive);
    }
}

#[test]
fn control_characters_never_parse() {
    for bad in [
        "USER;userId=42\n",
        "USER;userId=4\n2",
        "USER;user\0Id=42",
        "US\0ER",
    ] {
        assert!(ParsedRoleClaim::try_parse(bad).is_err(), "{bad:?}");
    }
    for bad in [
        "allow;api:users:_read;userId=42\n",
        "allow;api:users\n:_read",
        "allow\0;api",
    ] {
        assert!(ScopeDirective::parse(bad).is_err(), "{bad:?}");
    }
}

#[test]
fn evaluator_core_properties() {
    let evaluator = ScopeEvaluator::new();
    let request = AccessRequest::new("api:x");
    assert_eq!(evaluator.evaluate(&request, &[]).verdict, Verdict::Deny);
    let both = [ScopeDirective::allow("api:x"), ScopeDirective::deny("api:x")];
    assert_eq!(evaluator.evaluate(&request, &both).verdict, Verdict::Deny);
    let mismatch = [ScopeDirective::allow("api:users:_read").with_parameter("userId", "123")];
    let request = AccessRequest::new("api:users:_read").with_resource("userId", "456");
    assert_eq!(evaluator.evaluate(&request, &mismatch).verdict, Verdict::Deny);
}

#[tokio::test]
async fn forged_custom_role_cannot_override_system_role() {
    let h = harness(AuthorizerSettings::default());
    let forged = RoleDefinition::custom("USER", "Escalated user")
        .with_template(ScopeTemplate::new(Effect::Allow, "api"));
    let mut forged_by_id = RoleDefinition::custom("SHADOW", "Escalated by id")
        .with_template(ScopeTemplate::new(Effect::Allow, "api"));
    forged_by_id.id = USER_ROLE_ID;
    for role in [forged, forged_by_id] {
        scopegate_core::RoleStore::create(&h.roles, role).await.unwrap();
    }

    let principal = PrincipalClaims::new("u-1")
        .with_role_claim("USER;userId=1")
        .with_role_claim("SHADOW");
    let admin_action = AccessRequest::new("api:iam:roles:_write");
    assert_eq!(
        h.authorizer.authorize(&principal, &[], &admin_action).await.verdict,
        Verdict::Deny
    );
}

#[tokio::test]
async fn template_dropped_when_binding_missing() {
    let h = harness(AuthorizerSettings::default());
    let principal = PrincipalClaims::new("m-1").with_role_claim("ORG_MEMBER");
    let scopes = h
        .authorizer
        .resolver()
        .resolve_claims(&principal.user_id, &principal.role_claims, &[])
        .await;
    assert!(scopes.directives.is_empty());

    let request = AccessRequest::new("api:orgs:_read").with_resource("orgId", "acme");
    assert_eq!(
        h.authorizer.authorize(&principal, &[], &request).await.verdict,
        Verdict::Deny
    );
}

#[tokio::test]
async fn multiple_roles_union() {
    let h = harness(AuthorizerSettings::default());
    let principal = PrincipalClaims::new("u-9")
        .with_role_claim("USER;userId=9")
        .with_role_claim("AUDITOR");
    for request in [
        AccessRequest::new("api:users:_write").with_resource("userId", "9"),
        AccessRequest::new("api:audit:_read"),
        AccessRequest::new("api:iam:roles:_read"),
    ] {
        assert!(h.authorizer.authorize(&principal, &[], &request).await.is_allow());
    }
}

#[tokio::test]
async fn no_scheme_marker_means_no_elevation() {
    let h = harness(AuthorizerSettings::default());
    let principal = PrincipalClaims::new("legacy-user");
    assert_eq!(principal.scheme_version, None);
    for permission in ["api", "api:iam:grants:_write", "api:users:_read"] {
        let decision = h
            .authorizer
            .authorize(&principal, &[], &AccessRequest::new(permission))
            .await;
        assert_eq!(decision.verdict, Verdict::Deny, "{permission}");
    }
}

#[tokio::test]
async fn role_and_grant_edits_apply_on_next_request() {
    let h = harness(AuthorizerSettings::default());
    let registry = h.authorizer.resolver().registry();
    registry
        .create_role(
            RoleDefinition::custom("SUPPORT", "Support").with_template(
                ScopeTemplate::new(Effect::Allow, "api:users:_read")
                    .with_placeholder("userId", "userId"),
            ),
        )
        .await
        .unwrap();
    let principal = PrincipalClaims::new("s-1").with_role_claim("SUPPORT;userId=5");
    let request = AccessRequest::new("api:users:_read").with_resource("userId", "5");
    assert!(h.authorizer.authorize_user(&principal, &request).await.is_allow());

    h.assignments
        .grant_permission(PermissionGrant::deny("s-1", "api:users").granted_by("admin", "incident"));
    assert!(!h.authorizer.authorize_user(&principal, &request).await.is_allow());
    h.assignments.revoke_grant("s-1", "api:users");
    assert!(h.authorizer.authorize_user(&principal, &request).await.is_allow());

    registry.delete_role("SUPPORT").await.unwrap();
    assert!(!h.authorizer.authorize_user(&principal, &request).await.is_allow());
}

#[tokio::test]
async fn store_outage_fails_closed_but_keeps_system_roles() {
    let h = harness(AuthorizerSettings {
        store_timeout: Duration::from_millis(20),
        ..AuthorizerSettings::default()
    });
    h.authorizer
        .resolver()
        .registry()
        .create_role(
            RoleDefinition::custom("REPORTER", "Reporter")
                .with_template(ScopeTemplate::new(Effect::Allow, "api:audit:_read")),
        )
        .await
        .unwrap();
    h.assignments
        .grant_permission(PermissionGrant::allow("r-1", "api:iam:permissions:_read"));
    h.roles.set_latency(Some(Duration::from_millis(200)));
    h.assignments.set_offline(true);

    let custom_only = AccessRequest::new("api:audit:_read");
    let granted_only = AccessRequest::new("api:iam:permissions:_read");
    let system = AccessRequest::new("api:iam:roles:_read");

    let reporter = PrincipalClaims::new("r-1").with_role_claim("REPORTER");
    assert!(!h.authorizer.authorize_user(&reporter, &custom_only).await.is_allow());
    assert!(!h.authorizer.authorize_user(&reporter, &granted_only).await.is_allow());

    // A custom role that cannot be read might carry denies, so nothing is allowed.
    let mixed = PrincipalClaims::new("r-1")
        .with_role_claim("REPORTER")
        .with_role_claim("AUDITOR");
    let decision = h.authorizer.authorize(&mixed, &[], &system).await;
    assert_eq!(decision.reason, DecisionReason::Degraded);

    // System roles alone never touch the slow role store.
    let auditor = PrincipalClaims::new("r-1").with_role_claim("AUDITOR");
    assert!(h.authorizer.authorize(&auditor, &[], &system).await.is_allow());
}

#[tokio::test]
async fn outage_never_turns_a_deny_grant_into_an_allow() {
    let h = harness(AuthorizerSettings::default());
    h.assignments
        .grant_permission(PermissionGrant::deny("root", "api:iam").granted_by("admin", "freeze"));
    let principal = PrincipalClaims::new("root").with_role_claim("ADMIN");
    let request = AccessRequest::new("api:iam:roles:_write");

    assert_eq!(
        h.authorizer.authorize_user(&principal, &request).await.verdict,
        Verdict::Deny
    );
    h.assignments.set_offline(true);
    let decision = h.authorizer.authorize_user(&principal, &request).await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert_eq!(decision.reason, DecisionReason::Degraded);
}

#[tokio::test]
async fn unbound_deny_template_does_not_widen_access() {
    let h = harness(AuthorizerSettings::default());
    h.authorizer
        .resolver()
        .registry()
        .create_role(
            RoleDefinition::custom("ORG_EDITOR", "Org editor")
                .with_template(ScopeTemplate::new(Effect::Allow, "api:orgs"))
                .with_template(
                    ScopeTemplate::new(Effect::Deny, "api:orgs:_write")
                        .with_placeholder("orgId", "orgId"),
                ),
        )
        .await
        .unwrap();
    let request = AccessRequest::new("api:orgs:_write").with_resource("orgId", "acme");

    let bound = PrincipalClaims::new("e-1").with_role_claim("ORG_EDITOR;orgId=acme");
    let unbound = PrincipalClaims::new("e-1").with_role_claim("ORG_EDITOR");
    assert!(!h.authorizer.authorize(&bound, &[], &request).await.is_allow());
    assert!(!h.authorizer.authorize(&unbound, &[], &request).await.is_allow());
}

#[tokio::test]
async fn assignment_driven_resolution() {
    let h = harness(AuthorizerSettings::default());
    h.assignments
        .assign_role(RoleAssignment::new("o-1", "ORG_ADMIN").with_parameter("orgId", "acme"));
    let inside = AccessRequest::new("api:orgs:members:_write").with_resource("orgId", "acme");
    let outside = AccessRequest::new("api:orgs:members:_write").with_resource("orgId", "globex");
    assert!(h.authorizer.authorize_assigned("o-1", &inside).await.is_allow());
    assert!(!h.authorizer.authorize_assigned("o-1", &outside).await.is_allow());
    assert!(h.assignments.revoke_role("o-1", "ORG_ADMIN"));
    assert!(!h.authorizer.authorize_assigned("o-1", &inside).await.is_allow());
}

#[tokio::test]
async fn decisions_are_counted_and_audited() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("decisions.log");
    let registry = Arc::new(Registry::new());
    let metrics = AuthzMetrics::new(registry.clone()).unwrap();
    let h = harness(AuthorizerSettings::default());
    let authorizer = h
        .authorizer
        .with_metrics(metrics.clone())
        .with_audit_log(&log_path)
        .unwrap();

    let principal = PrincipalClaims::new("u-3")
        .with_role_claim("USER;userId=3")
        .with_role_claim("USER;userId=3\n;orgId=x");
    authorizer
        .authorize(
            &principal,
            &[],
            &AccessRequest::new("api:users:_read").with_resource("userId", "3"),
        )
        .await;
    authorizer
        .authorize(&principal, &[], &AccessRequest::new("api:unknown"))
        .await;

    assert_eq!(metrics.decisions(Verdict::Allow), 1);
    assert_eq!(metrics.decisions(Verdict::Deny), 1);
    let families = registry.gather();
    let rejected = families
        .iter()
        .find(|family| family.get_name() == "scopegate_rejected_claims_total")
        .unwrap();
    assert_eq!(rejected.get_metric()[0].get_counter().get_value() as u64, 1);

    let log = DecisionAuditLog::open(&log_path).unwrap();
    let records = log.records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].reason, DecisionReason::UnknownPermission);
    assert!(log.verify().unwrap());
}
