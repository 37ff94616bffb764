//! ---
//! sg_section: "04-resolution-evaluation"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Expands a role's scope templates for one assignment."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use tracing::{debug, warn};

use crate::directive::{Effect, ScopeDirective};
use crate::params::{self, Parameters};
use crate::role::{RoleAssignment, RoleDefinition, ScopeTemplate, TemplateValue};

/// Substitute placeholders in one template.
///
/// Returns `None` when any placeholder has no usable value in `values`
/// (absent, empty, or not wire-safe). A dropped template never widens
/// into an unconstrained directive.
pub fn instantiate(template: &ScopeTemplate, values: &Parameters) -> Option<ScopeDirective> {
    let mut parameters = Parameters::new();
    for (name, binding) in &template.bindings {
        let value = match binding {
            TemplateValue::Literal(value) => value.clone(),
            TemplateValue::Placeholder(placeholder) => {
                let value = values.get(placeholder)?;
                if !params::is_wire_safe_value(value) {
                    return None;
                }
                value.clone()
            }
        };
        parameters.insert(name.clone(), value);
    }
    Some(ScopeDirective {
        effect: template.effect,
        permission_path: template.permission_path.clone(),
        parameters,
    })
}

/// Expand every template of `role` for `assignment`, dropping incomplete ones.
///
/// An incomplete deny template voids the whole assignment: keeping the
/// role's allows without the deny that narrows them would widen access.
pub fn expand(assignment: &RoleAssignment, role: &RoleDefinition) -> Vec<ScopeDirective> {
    let mut directives = Vec::with_capacity(role.scope_templates.len());
    for template in &role.scope_templates {
        match instantiate(template, &assignment.parameter_values) {
            Some(directive) => directives.push(directive),
            None if template.effect == Effect::Deny => {
                warn!(
                    user = %assignment.user_id,
                    role = %role.code,
                    template = %template,
                    missing = ?assignment.missing_parameters(role),
                    "deny template unbound; assignment contributes no scopes"
                );
                return Vec::new();
            }
            None => debug!(
                user = %assignment.user_id,
                role = %role.code,
                template = %template,
                "template dropped: missing parameter binding"
            ),
        }
    }
    directives
}
