//! ---
//! sg_section: "05-logging"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Structured logging context for authorization events."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
#![warn(missing_docs)]

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Target carried by every decision event, so sinks can route them separately.
pub const DECISION_TARGET: &str = "scopegate::decision";

/// Initialize a baseline tracing subscriber suitable for development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Principal the event concerns.
    pub principal: Option<&'a str>,
    /// Permission path being evaluated.
    pub permission: Option<&'a str>,
    /// Caller-supplied correlation id.
    pub request_id: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a principal.
    pub fn with_principal(mut self, principal: &'a str) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Attach a permission path.
    pub fn with_permission(mut self, permission: &'a str) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Attach a correlation id.
    pub fn with_request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Outcome of an authorization decision as seen by the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Access granted.
    Allowed,
    /// Access refused.
    Denied,
}

impl DecisionOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Allowed => "allowed",
            DecisionOutcome::Denied => "denied",
        }
    }
}

impl From<bool> for DecisionOutcome {
    fn from(allowed: bool) -> Self {
        if allowed {
            DecisionOutcome::Allowed
        } else {
            DecisionOutcome::Denied
        }
    }
}

/// Emit a standardized `authz.decision` event.
pub fn log_decision_event(context: Option<&LogContext>, outcome: DecisionOutcome, message: &str) {
    let ctx = context.cloned().unwrap_or_default();
    // `event!` needs a constant level per call site.
    match outcome {
        DecisionOutcome::Denied => tracing::warn!(
            target: DECISION_TARGET,
            event = "authz.decision",
            outcome = outcome.as_str(),
            principal = ctx.principal.unwrap_or(""),
            permission = ?ctx.permission.unwrap_or(""),
            request_id = ctx.request_id.unwrap_or(""),
            message = %message
        ),
        DecisionOutcome::Allowed => tracing::info!(
            target: DECISION_TARGET,
            event = "authz.decision",
            outcome = outcome.as_str(),
            principal = ctx.principal.unwrap_or(""),
            permission = ?ctx.permission.unwrap_or(""),
            request_id = ctx.request_id.unwrap_or(""),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_principal("u-42")
            .with_permission("api:users:_read");
        sg_info!(context = ctx.clone(), "resolved {} directives", 3);
        sg_debug!("debug message");
        sg_warn!(context = ctx.clone(), "claim rejected");
        sg_error!(context = ctx, "store error: {}", "offline");
    }

    #[test]
    fn decision_helper_emits() {
        init();
        let ctx = LogContext::new().with_principal("u-42").with_request_id("req-1");
        log_decision_event(Some(&ctx), DecisionOutcome::Allowed, "allow;api:users:_read");
        log_decision_event(None, false.into(), "no matching directive");
        assert_eq!(DecisionOutcome::from(true), DecisionOutcome::Allowed);
    }
}
