//! ---
//! sg_section: "07-cli"
//! sg_subsection: "binary"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Offline authorization check against a policy fixture."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use prometheus::proto::MetricType;
use prometheus::Registry;
use scopegate_common::config::AppConfig;
use scopegate_core::authorizer::{Authorizer, AuthorizerSettings, PrincipalClaims};
use scopegate_core::evaluator::AccessRequest;
use scopegate_core::metrics::AuthzMetrics;
use scopegate_core::role::SystemRoleTable;
use scopegate_core::store::{InMemoryAssignmentStore, InMemoryRoleStore};
use scopegate_logging::{log_decision_event, sg_debug, sg_warn, LogContext};
use tokio::runtime::Runtime;

use crate::catalog::load_catalog;
use crate::codec::parse_params;
use crate::policy::PolicyFixture;

/// Exit status for a denied request.
const DENY_EXIT_CODE: u8 = 2;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Policy fixture with custom roles, assignments and grants.
    #[arg(long, value_name = "FILE")]
    policy: Option<PathBuf>,
    /// Principal identifier.
    #[arg(long)]
    user: String,
    /// Role claim carried by the principal; repeatable.
    #[arg(long = "claim", value_name = "CLAIM")]
    claims: Vec<String>,
    /// Ignore claims and resolve from the fixture's assignments.
    #[arg(long, conflicts_with = "claims")]
    assigned: bool,
    /// Authorization-scheme marker on the principal.
    #[arg(long)]
    scheme_version: Option<u32>,
    /// Requested permission path.
    #[arg(long)]
    permission: String,
    /// Resource parameter `name=value`; repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,
}

pub fn run(args: CheckArgs, config: &AppConfig) -> Result<ExitCode> {
    let catalog = Arc::new(load_catalog(config.authz.catalog.as_deref())?);
    let settings = AuthorizerSettings {
        store_timeout: config.authz.store_timeout,
        role_cache_ttl: config.authz.role_cache_ttl,
        reject_unknown_permissions: config.authz.reject_unknown_permissions,
        scheme_version: config.authz.scheme_version,
    };
    let assignments = InMemoryAssignmentStore::new();
    let mut authorizer = Authorizer::new(
        catalog,
        Arc::new(SystemRoleTable::builtin()),
        Arc::new(InMemoryRoleStore::new()),
        Arc::new(assignments.clone()),
        settings,
    );
    if let Some(path) = &config.authz.audit_log {
        authorizer = authorizer.with_audit_log(path)?;
    }
    let metrics_registry = if config.metrics.enabled {
        let registry = Arc::new(Registry::new());
        authorizer = authorizer.with_metrics(AuthzMetrics::new(registry.clone())?);
        Some(registry)
    } else {
        None
    };

    let request = AccessRequest {
        permission: args.permission.clone(),
        resource: parse_params(&args.params)?,
    };
    let principal = PrincipalClaims {
        user_id: args.user.clone(),
        role_claims: args.claims,
        scheme_version: args.scheme_version,
    };

    let context = LogContext::new()
        .with_principal(&principal.user_id)
        .with_permission(&request.permission);

    let runtime = Runtime::new()?;
    let decision = runtime.block_on(async {
        if let Some(path) = &args.policy {
            PolicyFixture::from_path(path)?
                .install(authorizer.resolver().registry(), &assignments)
                .await?;
            sg_debug!(context = context, "policy fixture {} installed", path.display());
        }
        let decision = if args.assigned {
            authorizer.authorize_assigned(&principal.user_id, &request).await
        } else {
            authorizer.authorize_user(&principal, &request).await
        };
        anyhow::Ok(decision)
    })?;

    if principal.scheme_version.is_none() && !args.assigned {
        sg_warn!(context = context, "principal has no authorization scheme marker");
    }
    log_decision_event(
        Some(&context),
        decision.is_allow().into(),
        decision.reason.as_str(),
    );

    let mut report = serde_json::json!({
        "user": principal.user_id,
        "permission": request.permission,
        "resource": request.resource,
        "verdict": decision.verdict,
        "reason": decision.reason,
        "matched": decision.matched.as_ref().map(|d| d.format()),
        "match_count": decision.match_count,
    });
    if let Some(registry) = &metrics_registry {
        report["metrics"] = metrics_snapshot(registry);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if decision.is_allow() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DENY_EXIT_CODE)
    })
}

/// Counter values and histogram sample counts keyed by `name{label=value,...}`.
fn metrics_snapshot(registry: &Registry) -> serde_json::Value {
    let mut snapshot = serde_json::Map::new();
    for family in registry.gather() {
        for metric in family.get_metric() {
            let labels: Vec<String> = metric
                .get_label()
                .iter()
                .map(|pair| format!("{}={}", pair.get_name(), pair.get_value()))
                .collect();
            let key = if labels.is_empty() {
                family.get_name().to_string()
            } else {
                format!("{}{{{}}}", family.get_name(), labels.join(","))
            };
            let value = match family.get_field_type() {
                MetricType::COUNTER => serde_json::json!(metric.get_counter().get_value()),
                MetricType::HISTOGRAM => serde_json::json!(metric.get_histogram().get_sample_count()),
                _ => continue,
            };
            snapshot.insert(key, value);
        }
    }
    serde_json::Value::Object(snapshot)
}
