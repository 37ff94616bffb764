//! ---
//! sg_section: "04-resolution-evaluation"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Deny-overrides-allow decision procedure over effective directives."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! Evaluation is pure: no I/O, no shared state. Any number of threads may
//! evaluate concurrently over their own directive snapshots.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::directive::{Effect, ScopeDirective};
use crate::params::Parameters;

/// Final answer to one authorization question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Access granted.
    Allow,
    /// Access refused.
    Deny,
}

impl Verdict {
    /// Lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
        }
    }

    /// Convenience for callers that only branch on the outcome.
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// A matching deny directive overrode everything else.
    DenyOverride,
    /// At least one allow matched and no deny did.
    Allowed,
    /// Nothing matched.
    NoMatch,
    /// The permission is not in the catalog and unknown permissions are rejected.
    UnknownPermission,
    /// An allow was withheld because a store that may hold denies failed.
    Degraded,
}

impl DecisionReason {
    /// Snake-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::DenyOverride => "deny_override",
            DecisionReason::Allowed => "allowed",
            DecisionReason::NoMatch => "no_match",
            DecisionReason::UnknownPermission => "unknown_permission",
            DecisionReason::Degraded => "degraded",
        }
    }
}

/// One authorization question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Requested permission path, e.g. `api:users:_read`.
    pub permission: String,
    /// Parameters describing the targeted resource.
    #[serde(default)]
    pub resource: Parameters,
}

impl AccessRequest {
    /// Request for `permission` with no resource parameters.
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            resource: Parameters::new(),
        }
    }

    /// Add one resource parameter.
    pub fn with_resource(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource.insert(name.into(), value.into());
        self
    }
}

/// Verdict plus the specificity trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Outcome.
    pub verdict: Verdict,
    /// How the outcome was reached.
    pub reason: DecisionReason,
    /// Most specific directive of the deciding effect, if any matched.
    pub matched: Option<ScopeDirective>,
    /// Number of directives that matched, of either effect.
    pub match_count: usize,
}

impl Decision {
    /// Deny without consulting directives.
    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason,
            matched: None,
            match_count: 0,
        }
    }

    /// True when access is granted.
    pub fn is_allow(&self) -> bool {
        self.verdict.is_allow()
    }
}

/// Stateless decision procedure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeEvaluator;

impl ScopeEvaluator {
    /// Evaluator instance.
    pub fn new() -> Self {
        Self
    }

    /// Decide `request` against `directives`.
    ///
    /// Any matching deny wins regardless of specificity. Otherwise any
    /// matching allow grants access. Otherwise the default is deny.
    pub fn evaluate(&self, request: &AccessRequest, directives: &[ScopeDirective]) -> Decision {
        let mut best_allow: Option<&ScopeDirective> = None;
        let mut best_deny: Option<&ScopeDirective> = None;
        let mut match_count = 0;

        for directive in directives
            .iter()
            .filter(|d| d.matches(&request.permission, &request.resource))
        {
            match_count += 1;
            let slot = match directive.effect {
                Effect::Allow => &mut best_allow,
                Effect::Deny => &mut best_deny,
            };
            // Strictly greater keeps the first of equally specific matches.
            if slot.map_or(true, |current| directive.specificity() > current.specificity()) {
                *slot = Some(directive);
            }
        }

        let (verdict, reason, matched) = match (best_deny, best_allow) {
            (Some(deny), _) => (Verdict::Deny, DecisionReason::DenyOverride, Some(deny)),
            (None, Some(allow)) => (Verdict::Allow, DecisionReason::Allowed, Some(allow)),
            (None, None) => (Verdict::Deny, DecisionReason::NoMatch, None),
        };
        Decision {
            verdict,
            reason,
            matched: matched.cloned(),
            match_count,
        }
    }
}
