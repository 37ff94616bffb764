//! ---
//! sg_section: "03-role-registry"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Role definitions, parameterised scope templates, system roles."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::claim::{format_role_claim, ParsedRoleClaim};
use crate::directive::{DirectiveError, Effect, ScopeDirective};
use crate::params::{self, Parameters, BINDING_SEPARATOR, SEGMENT_SEPARATOR};
use crate::permission::PermissionCatalog;
use crate::store::StoreError;

/// Errors from role validation and administration.
#[derive(Debug, Error)]
pub enum RoleError {
    /// Code is empty or not `[A-Z0-9_]+`.
    #[error("invalid role code {0:?}")]
    InvalidCode(String),
    /// Template references a permission missing from the catalog.
    #[error("role {code}: unknown permission {path}")]
    UnknownPermission {
        /// Role code.
        code: String,
        /// Offending permission path.
        path: String,
    },
    /// Template binds a parameter the permission does not accept.
    #[error("role {code}: permission {path} does not accept parameter {parameter}")]
    UnsupportedParameter {
        /// Role code.
        code: String,
        /// Permission path.
        path: String,
        /// Offending parameter name.
        parameter: String,
    },
    /// Attempt to shadow, edit or delete a system role.
    #[error("system role {0} cannot be created, modified or deleted")]
    SystemRoleImmutable(String),
    /// No role with the code exists.
    #[error("role not found: {0}")]
    NotFound(String),
    /// Backing store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Template parameter value: a literal or a `{name}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateValue {
    /// Fixed value copied verbatim into the directive.
    Literal(String),
    /// Filled from the role assignment's parameter of this name.
    Placeholder(String),
}

impl TemplateValue {
    fn from_wire(value: String) -> Self {
        match value
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .map(str::trim)
        {
            Some(name) if !name.is_empty() => TemplateValue::Placeholder(name.to_owned()),
            _ => TemplateValue::Literal(value),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::Literal(value) => f.write_str(value),
            TemplateValue::Placeholder(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// Directive shape whose parameter values may be unresolved placeholders.
///
/// Serialised in the directive wire grammar, e.g. `allow;api:users:_read;userId={userId}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeTemplate {
    /// Allow or deny.
    pub effect: Effect,
    /// Colon-separated permission path.
    pub permission_path: String,
    /// Parameter name to literal or placeholder.
    pub bindings: BTreeMap<String, TemplateValue>,
}

impl ScopeTemplate {
    /// Unconstrained template.
    pub fn new(effect: Effect, permission_path: impl Into<String>) -> Self {
        Self {
            effect,
            permission_path: permission_path.into(),
            bindings: BTreeMap::new(),
        }
    }

    /// Bind `name` to the placeholder `{placeholder}`.
    pub fn with_placeholder(mut self, name: impl Into<String>, placeholder: impl Into<String>) -> Self {
        self.bindings
            .insert(name.into(), TemplateValue::Placeholder(placeholder.into()));
        self
    }

    /// Bind `name` to a literal value.
    pub fn with_literal(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings
            .insert(name.into(), TemplateValue::Literal(value.into()));
        self
    }

    /// Parse the directive grammar, reading `{name}` values as placeholders.
    pub fn parse(input: &str) -> Result<Self, DirectiveError> {
        let directive = ScopeDirective::parse(input)?;
        Ok(Self {
            effect: directive.effect,
            permission_path: directive.permission_path,
            bindings: directive
                .parameters
                .into_iter()
                .map(|(name, value)| (name, TemplateValue::from_wire(value)))
                .collect(),
        })
    }

    /// Placeholder names this template needs filled.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.bindings.values().filter_map(|value| match value {
            TemplateValue::Placeholder(name) => Some(name.as_str()),
            TemplateValue::Literal(_) => None,
        })
    }

    /// Canonical wire form.
    pub fn format(&self) -> String {
        let mut out = format!(
            "{}{SEGMENT_SEPARATOR}{}",
            self.effect.as_str(),
            self.permission_path
        );
        for (name, value) in &self.bindings {
            out.push(SEGMENT_SEPARATOR);
            out.push_str(name);
            out.push(BINDING_SEPARATOR);
            out.push_str(&value.to_string());
        }
        out
    }
}

impl fmt::Display for ScopeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for ScopeTemplate {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ScopeTemplate {
    type Error = DirectiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScopeTemplate> for String {
    fn from(template: ScopeTemplate) -> Self {
        template.format()
    }
}

/// Named bundle of scope templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Stable identifier.
    pub id: Uuid,
    /// Uppercase unique code carried in role claims.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Description text.
    #[serde(default)]
    pub description: String,
    /// Compiled-in role; never stored externally.
    #[serde(default)]
    pub is_system_role: bool,
    /// Templates expanded per assignment.
    #[serde(default)]
    pub scope_templates: Vec<ScopeTemplate>,
}

impl RoleDefinition {
    /// New custom role with a random id.
    pub fn custom(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            description: String::new(),
            is_system_role: false,
            scope_templates: Vec::new(),
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: append a template.
    pub fn with_template(mut self, template: ScopeTemplate) -> Self {
        self.scope_templates.push(template);
        self
    }

    /// Union of placeholder names across all templates.
    pub fn required_parameters(&self) -> BTreeSet<String> {
        self.scope_templates
            .iter()
            .flat_map(|template| template.placeholders())
            .map(str::to_owned)
            .collect()
    }

    /// Check the code shape and every template against the catalog.
    pub fn validate(&self, catalog: &PermissionCatalog) -> Result<(), RoleError> {
        if !is_valid_role_code(&self.code) {
            return Err(RoleError::InvalidCode(self.code.clone()));
        }
        for template in &self.scope_templates {
            let node = catalog.lookup(&template.permission_path).ok_or_else(|| {
                RoleError::UnknownPermission {
                    code: self.code.clone(),
                    path: template.permission_path.clone(),
                }
            })?;
            if let Some(parameter) = template
                .bindings
                .keys()
                .find(|name| !node.accepts_parameter(name))
            {
                return Err(RoleError::UnsupportedParameter {
                    code: self.code.clone(),
                    path: template.permission_path.clone(),
                    parameter: parameter.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Role codes are non-empty `[A-Z0-9_]`.
pub fn is_valid_role_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// A role held by a user together with the parameter values it binds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Principal identifier.
    pub user_id: String,
    /// Uppercase role code.
    pub role_code: String,
    /// Values for the role's required parameters.
    #[serde(default)]
    pub parameter_values: Parameters,
}

impl RoleAssignment {
    /// Assignment with no parameters.
    pub fn new(user_id: impl Into<String>, role_code: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_code: role_code.into().to_uppercase(),
            parameter_values: Parameters::new(),
        }
    }

    /// Builder: bind a parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameter_values.insert(name.into(), value.into());
        self
    }

    /// Rebuild an assignment from a decoded claim.
    pub fn from_claim(user_id: impl Into<String>, claim: ParsedRoleClaim) -> Self {
        Self {
            user_id: user_id.into(),
            role_code: claim.code,
            parameter_values: claim.parameters,
        }
    }

    /// Wire claim carried in the principal's token.
    pub fn to_claim(&self) -> String {
        format_role_claim(&self.role_code, Some(&self.parameter_values))
    }

    /// Parameters that the role needs but this assignment does not bind to a usable value.
    pub fn missing_parameters(&self, role: &RoleDefinition) -> Vec<String> {
        role.required_parameters()
            .into_iter()
            .filter(|name| {
                !self
                    .parameter_values
                    .get(name)
                    .is_some_and(|value| params::is_wire_safe_value(value))
            })
            .collect()
    }
}

/// Compiled-in roles, indexed by id and code. Built once at startup.
#[derive(Debug, Clone)]
pub struct SystemRoleTable {
    roles: Vec<RoleDefinition>,
    by_code: HashMap<String, usize>,
    by_id: HashMap<Uuid, usize>,
}

/// Deterministic id of the `ADMIN` system role.
pub const ADMIN_ROLE_ID: Uuid = Uuid::from_u128(0x5c09e6a7_0000_4000_8000_000000000001);
/// Deterministic id of the `USER` system role.
pub const USER_ROLE_ID: Uuid = Uuid::from_u128(0x5c09e6a7_0000_4000_8000_000000000002);
/// Deterministic id of the `ORG_ADMIN` system role.
pub const ORG_ADMIN_ROLE_ID: Uuid = Uuid::from_u128(0x5c09e6a7_0000_4000_8000_000000000003);
/// Deterministic id of the `ORG_MEMBER` system role.
pub const ORG_MEMBER_ROLE_ID: Uuid = Uuid::from_u128(0x5c09e6a7_0000_4000_8000_000000000004);
/// Deterministic id of the `AUDITOR` system role.
pub const AUDITOR_ROLE_ID: Uuid = Uuid::from_u128(0x5c09e6a7_0000_4000_8000_000000000005);

impl SystemRoleTable {
    /// Index the provided roles; every entry is marked as a system role.
    pub fn new(roles: Vec<RoleDefinition>) -> Self {
        let roles: Vec<RoleDefinition> = roles
            .into_iter()
            .map(|mut role| {
                role.is_system_role = true;
                role.code = role.code.to_uppercase();
                role
            })
            .collect();
        let by_code = roles
            .iter()
            .enumerate()
            .map(|(idx, role)| (role.code.clone(), idx))
            .collect();
        let by_id = roles
            .iter()
            .enumerate()
            .map(|(idx, role)| (role.id, idx))
            .collect();
        Self {
            roles,
            by_code,
            by_id,
        }
    }

    /// Built-in roles: `ADMIN`, `USER`, `ORG_ADMIN`, `ORG_MEMBER`, `AUDITOR`.
    pub fn builtin() -> Self {
        let system = |id: Uuid, code: &str, name: &str, description: &str| RoleDefinition {
            id,
            code: code.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
            is_system_role: true,
            scope_templates: Vec::new(),
        };
        Self::new(vec![
            system(ADMIN_ROLE_ID, "ADMIN", "Administrator", "Full API access")
                .with_template(ScopeTemplate::new(Effect::Allow, "api")),
            system(USER_ROLE_ID, "USER", "User", "Manage own account")
                .with_template(
                    ScopeTemplate::new(Effect::Allow, "api:users:_read")
                        .with_placeholder("userId", "userId"),
                )
                .with_template(
                    ScopeTemplate::new(Effect::Allow, "api:users:_write")
                        .with_placeholder("userId", "userId"),
                )
                .with_template(ScopeTemplate::new(
                    Effect::Allow,
                    "api:iam:permissions:_read",
                )),
            system(
                ORG_ADMIN_ROLE_ID,
                "ORG_ADMIN",
                "Organisation administrator",
                "Full access to one organisation",
            )
            .with_template(
                ScopeTemplate::new(Effect::Allow, "api:orgs").with_placeholder("orgId", "orgId"),
            ),
            system(
                ORG_MEMBER_ROLE_ID,
                "ORG_MEMBER",
                "Organisation member",
                "Read access to one organisation",
            )
            .with_template(
                ScopeTemplate::new(Effect::Allow, "api:orgs:_read")
                    .with_placeholder("orgId", "orgId"),
            )
            .with_template(
                ScopeTemplate::new(Effect::Allow, "api:orgs:members:_read")
                    .with_placeholder("orgId", "orgId"),
            ),
            system(AUDITOR_ROLE_ID, "AUDITOR", "Auditor", "Read audit trail and roles")
                .with_template(ScopeTemplate::new(Effect::Allow, "api:audit:_read"))
                .with_template(ScopeTemplate::new(Effect::Allow, "api:iam:roles:_read")),
        ])
    }

    /// Role by uppercase code.
    pub fn by_code(&self, code: &str) -> Option<&RoleDefinition> {
        self.by_code.get(code).map(|idx| &self.roles[*idx])
    }

    /// Role by id.
    pub fn by_id(&self, id: &Uuid) -> Option<&RoleDefinition> {
        self.by_id.get(id).map(|idx| &self.roles[*idx])
    }

    /// True when `role` shares an id or code with a system role.
    pub fn shadows(&self, role: &RoleDefinition) -> bool {
        self.by_id.contains_key(&role.id) || self.by_code.contains_key(&role.code.to_uppercase())
    }

    /// All system roles in declaration order.
    pub fn roles(&self) -> &[RoleDefinition] {
        &self.roles
    }
}
