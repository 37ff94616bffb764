//! ---
//! sg_section: "03-role-registry"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Direct, unconditional permission grants and revocations."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directive::{Effect, ScopeDirective};

/// Administrator-issued allow or deny on one permission for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Principal the grant applies to.
    pub user_id: String,
    /// Catalog identifier of the permission.
    pub permission_identifier: String,
    /// `true` grants, `false` revokes.
    pub is_allow: bool,
    /// Free-form justification.
    #[serde(default)]
    pub description: String,
    /// Administrator who issued the grant.
    #[serde(default)]
    pub granted_by: String,
    /// Issue timestamp.
    #[serde(default = "Utc::now")]
    pub granted_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// Allow grant issued now.
    pub fn allow(user_id: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::new(user_id, permission, true)
    }

    /// Deny grant issued now.
    pub fn deny(user_id: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::new(user_id, permission, false)
    }

    fn new(user_id: impl Into<String>, permission: impl Into<String>, is_allow: bool) -> Self {
        Self {
            user_id: user_id.into(),
            permission_identifier: permission.into(),
            is_allow,
            description: String::new(),
            granted_by: String::new(),
            granted_at: Utc::now(),
        }
    }

    /// Builder: record the issuing administrator and reason.
    pub fn granted_by(mut self, admin: impl Into<String>, description: impl Into<String>) -> Self {
        self.granted_by = admin.into();
        self.description = description.into();
        self
    }

    /// Effect carried by the grant.
    pub fn effect(&self) -> Effect {
        if self.is_allow {
            Effect::Allow
        } else {
            Effect::Deny
        }
    }

    /// Unconstrained directive equivalent to this grant.
    pub fn to_directive(&self) -> ScopeDirective {
        ScopeDirective::new(self.effect(), self.permission_identifier.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_become_unconstrained_directives() {
        let allow = PermissionGrant::allow("u-1", "api:audit:_read").granted_by("root", "audit");
        assert_eq!(allow.to_directive(), ScopeDirective::allow("api:audit:_read"));
        assert_eq!(allow.granted_by, "root");

        let deny = PermissionGrant::deny("u-1", " api:users:_write ");
        let directive = deny.to_directive();
        assert_eq!(directive.effect, Effect::Deny);
        assert_eq!(directive.permission_path, "api:users:_write");
        assert!(directive.parameters.is_empty());
    }
}
