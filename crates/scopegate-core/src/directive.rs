//! ---
//! sg_section: "02-claim-codecs"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Scope directives and their `allow|deny;path;k=v` codec."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::{self, ParameterError, Parameters, SEGMENT_SEPARATOR};

/// Separator between hierarchical permission path segments.
pub const PATH_SEPARATOR: char = ':';

/// Whether a directive grants or withholds a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Grants the permission.
    Allow,
    /// Withholds the permission; overrides any matching allow.
    Deny,
}

impl Effect {
    /// Keyword used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        params::ensure_printable("effect", s)?;
        let keyword = s.trim();
        if keyword.is_empty() {
            return Err(DirectiveError::EmptyEffect);
        }
        if keyword.eq_ignore_ascii_case("allow") {
            Ok(Effect::Allow)
        } else if keyword.eq_ignore_ascii_case("deny") {
            Ok(Effect::Deny)
        } else {
            Err(DirectiveError::UnknownEffect(keyword.to_owned()))
        }
    }
}

/// Reasons a directive string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    /// Nothing before the first `;`.
    #[error("malformed directive: empty effect")]
    EmptyEffect,
    /// Effect keyword other than `allow`/`deny`.
    #[error("malformed directive: unknown effect {0:?}")]
    UnknownEffect(String),
    /// Missing or blank permission path.
    #[error("malformed directive: empty permission path")]
    EmptyPath,
    /// A parameter segment or token failed validation.
    #[error("malformed directive: {0}")]
    Parameter(#[from] ParameterError),
}

/// A concrete allow/deny statement about one permission subtree.
///
/// An empty `parameters` map means the directive is unconstrained and
/// matches any resource parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeDirective {
    /// Allow or deny.
    pub effect: Effect,
    /// Colon-separated permission path, e.g. `api:users:_read`.
    pub permission_path: String,
    /// Parameter name to literal value.
    #[serde(default)]
    pub parameters: Parameters,
}

impl ScopeDirective {
    /// Unconstrained directive for `path`.
    pub fn new(effect: Effect, permission_path: impl Into<String>) -> Self {
        Self {
            effect,
            permission_path: permission_path.into(),
            parameters: Parameters::new(),
        }
    }

    /// Shorthand for an unconstrained allow.
    pub fn allow(permission_path: impl Into<String>) -> Self {
        Self::new(Effect::Allow, permission_path)
    }

    /// Shorthand for an unconstrained deny.
    pub fn deny(permission_path: impl Into<String>) -> Self {
        Self::new(Effect::Deny, permission_path)
    }

    /// Bind a parameter, replacing any previous value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Parse `<effect>;<path>[;<name>=<value>]*`.
    pub fn parse(input: &str) -> Result<Self, DirectiveError> {
        let mut segments = input.split(SEGMENT_SEPARATOR);
        // `split` always yields at least one item.
        let effect: Effect = segments.next().unwrap_or_default().parse()?;
        let raw_path = segments.next().ok_or(DirectiveError::EmptyPath)?;
        params::ensure_printable("path", raw_path)?;
        let permission_path = raw_path.trim();
        if permission_path.is_empty() {
            return Err(DirectiveError::EmptyPath);
        }
        let parameters = params::parse_bindings(segments)?;
        Ok(Self {
            effect,
            permission_path: permission_path.to_owned(),
            parameters,
        })
    }

    /// Canonical wire form with parameters sorted by name.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(self.permission_path.len() + 16);
        out.push_str(self.effect.as_str());
        out.push(SEGMENT_SEPARATOR);
        out.push_str(&self.permission_path);
        params::write_bindings(&mut out, &self.parameters);
        out
    }

    /// True when this directive's path equals `requested` or is a
    /// colon-segment ancestor of it (`api:users` covers `api:users:_read`,
    /// not `api:usersettings`).
    pub fn covers(&self, requested: &str) -> bool {
        path_covers(&self.permission_path, requested)
    }

    /// True when every bound parameter is present in `resource` with an equal value.
    pub fn binds_subset_of(&self, resource: &Parameters) -> bool {
        self.parameters
            .iter()
            .all(|(name, value)| resource.get(name) == Some(value))
    }

    /// Path and parameter match for one authorization question.
    pub fn matches(&self, requested: &str, resource: &Parameters) -> bool {
        self.covers(requested) && self.binds_subset_of(resource)
    }

    /// Specificity used to rank matches: path depth, then bound parameter count.
    pub fn specificity(&self) -> (usize, usize) {
        (path_depth(&self.permission_path), self.parameters.len())
    }
}

impl fmt::Display for ScopeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for ScopeDirective {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Segment-prefix test between a granted path and a requested path.
pub fn path_covers(granted: &str, requested: &str) -> bool {
    match requested.strip_prefix(granted) {
        Some("") => true,
        Some(rest) => !granted.is_empty() && rest.starts_with(PATH_SEPARATOR),
        None => false,
    }
}

/// Number of colon-separated segments in a path.
pub fn path_depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split(PATH_SEPARATOR).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_effect_case_insensitively_and_trims() {
        let directive = ScopeDirective::parse("  ALLOW ; api:users:_read ; userId = 42 ").unwrap();
        assert_eq!(directive.effect, Effect::Allow);
        assert_eq!(directive.permission_path, "api:users:_read");
        assert_eq!(
            directive.parameters.get("userId").map(String::as_str),
            Some("42")
        );
        assert_eq!(ScopeDirective::parse("Deny;api").unwrap().effect, Effect::Deny);
    }

    #[test]
    fn formats_parameters_sorted() {
        let directive = ScopeDirective::parse("deny;api:orgs;userId=1;orgId=9").unwrap();
        assert_eq!(directive.format(), "deny;api:orgs;orgId=9;userId=1");
        assert_eq!(
            ScopeDirective::parse(&directive.format()).unwrap(),
            directive
        );
    }

    #[test]
    fn round_trip_holds_across_valid_inputs() {
        let cases = [
            ScopeDirective::allow("api"),
            ScopeDirective::deny("api:iam:grants:_write"),
            ScopeDirective::allow("api:users:_read").with_parameter("userId", "42"),
            ScopeDirective::deny("api:orgs:members")
                .with_parameter("orgId", "acme co")
                .with_parameter("region", "eu-west"),
            ScopeDirective::allow("api:x").with_parameter("filter", "a=b"),
            ScopeDirective::allow("api:users:_write").with_parameter("userId", "ü-7"),
        ];
        for directive in cases {
            let wire = directive.format();
            assert_eq!(ScopeDirective::parse(&wire).unwrap(), directive, "{wire}");
        }
    }

    #[test]
    fn rejects_malformed_directives() {
        assert_eq!(
            ScopeDirective::parse(";api:x"),
            Err(DirectiveError::EmptyEffect)
        );
        assert_eq!(
            ScopeDirective::parse("permit;api:x"),
            Err(DirectiveError::UnknownEffect("permit".into()))
        );
        assert_eq!(ScopeDirective::parse("allow"), Err(DirectiveError::EmptyPath));
        assert_eq!(
            ScopeDirective::parse("allow;  ;userId=1"),
            Err(DirectiveError::EmptyPath)
        );
        assert!(matches!(
            ScopeDirective::parse("allow;api:x;userId"),
            Err(DirectiveError::Parameter(ParameterError::MissingSeparator(_)))
        ));
        assert!(matches!(
            ScopeDirective::parse("allow;api:x;=1"),
            Err(DirectiveError::Parameter(ParameterError::EmptyName(_)))
        ));
        assert!(ScopeDirective::parse("").is_err());
    }

    #[test]
    fn rejects_injection_in_any_token() {
        assert!(ScopeDirective::parse("allow;api:x;userId=1\nX-Admin: true").is_err());
        assert!(ScopeDirective::parse("allow;api:x\0;userId=1").is_err());
        assert!(ScopeDirective::parse("allow;api:x;userId=1\0").is_err());
        assert!(ScopeDirective::parse("allow\n;api:x").is_err());
    }

    #[test]
    fn value_may_contain_equals() {
        let directive = ScopeDirective::parse("allow;api:x;filter=a=b").unwrap();
        assert_eq!(
            directive.parameters.get("filter").map(String::as_str),
            Some("a=b")
        );
    }

    #[test]
    fn covers_only_on_segment_boundaries() {
        let directive = ScopeDirective::allow("api:users");
        assert!(directive.covers("api:users"));
        assert!(directive.covers("api:users:_read"));
        assert!(!directive.covers("api:usersettings"));
        assert!(!directive.covers("api"));
        assert!(!ScopeDirective::allow("").covers("api"));
    }

    #[test]
    fn specificity_counts_depth_then_parameters() {
        let directive = ScopeDirective::allow("api:users:_read").with_parameter("userId", "1");
        assert_eq!(directive.specificity(), (3, 1));
    }
}
