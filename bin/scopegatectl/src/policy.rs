//! ---
//! sg_section: "07-cli"
//! sg_subsection: "binary"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "TOML policy fixture: custom roles, assignments and grants."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! ```toml
//! [[role]]
//! code = "SUPPORT"
//! name = "Support"
//! scope_templates = ["allow;api:users:_read;userId={userId}"]
//!
//! [[assignment]]
//! user_id = "u-1"
//! role_code = "SUPPORT"
//! parameter_values = { userId = "7" }
//!
//! [[grant]]
//! user_id = "u-1"
//! permission_identifier = "api:audit:_read"
//! is_allow = true
//! ```
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use scopegate_core::grant::PermissionGrant;
use scopegate_core::registry::RoleDefinitionRegistry;
use scopegate_core::role::{RoleAssignment, RoleDefinition, ScopeTemplate};
use scopegate_core::store::InMemoryAssignmentStore;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFixture {
    #[serde(default, rename = "role")]
    pub roles: Vec<PolicyRole>,
    #[serde(default, rename = "assignment")]
    pub assignments: Vec<RoleAssignment>,
    #[serde(default, rename = "grant")]
    pub grants: Vec<PermissionGrant>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRole {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope_templates: Vec<ScopeTemplate>,
}

impl From<PolicyRole> for RoleDefinition {
    fn from(role: PolicyRole) -> Self {
        let mut definition =
            RoleDefinition::custom(role.code, role.name).with_description(role.description);
        if let Some(id) = role.id {
            definition.id = id;
        }
        definition.scope_templates = role.scope_templates;
        definition
    }
}

impl PolicyFixture {
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("unable to read policy {}", path.display()))?;
        toml::from_str(&source).with_context(|| format!("invalid policy {}", path.display()))
    }

    /// Create custom roles through the registry and load assignments and grants.
    pub async fn install(
        self,
        registry: &RoleDefinitionRegistry,
        assignments: &InMemoryAssignmentStore,
    ) -> Result<()> {
        for role in self.roles {
            let role = RoleDefinition::from(role);
            let code = role.code.clone();
            registry
                .create_role(role)
                .await
                .with_context(|| format!("policy role {code} rejected"))?;
        }
        for assignment in self.assignments {
            assignments.assign_role(assignment);
        }
        for grant in self.grants {
            assignments.grant_permission(grant);
        }
        Ok(())
    }
}
