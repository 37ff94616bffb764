//! ---
//! sg_section: "03-role-registry"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Merges immutable system roles with externally stored custom roles."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::permission::PermissionCatalog;
use crate::role::{RoleDefinition, RoleError, SystemRoleTable};
use crate::store::{bounded, RoleStore, StoreError};

/// Outcome of resolving a batch of role codes.
#[derive(Debug, Clone, Default)]
pub struct RoleResolution {
    /// Resolved roles, system roles first, in request order within each group.
    pub roles: Vec<RoleDefinition>,
    /// Codes that resolved to nothing.
    pub unresolved: Vec<String>,
    /// Set when the store lookup failed and only system roles were resolved.
    pub store_error: Option<StoreError>,
}

/// Role lookup with system-role precedence.
#[derive(Clone)]
pub struct RoleDefinitionRegistry {
    system: Arc<SystemRoleTable>,
    store: Arc<dyn RoleStore>,
    catalog: Arc<PermissionCatalog>,
    timeout: Duration,
}

impl RoleDefinitionRegistry {
    /// Registry over `store`, bounding every store call by `timeout`.
    pub fn new(
        system: Arc<SystemRoleTable>,
        store: Arc<dyn RoleStore>,
        catalog: Arc<PermissionCatalog>,
        timeout: Duration,
    ) -> Self {
        Self {
            system,
            store,
            catalog,
            timeout,
        }
    }

    /// System role table.
    pub fn system_roles(&self) -> &SystemRoleTable {
        &self.system
    }

    /// Permission catalog used for validation.
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Resolve one code. System roles never hit the store.
    pub async fn resolve_by_code(&self, code: &str) -> Option<RoleDefinition> {
        let mut resolution = self.resolve_by_codes(&[code.to_owned()]).await;
        if resolution.roles.is_empty() {
            None
        } else {
            Some(resolution.roles.swap_remove(0))
        }
    }

    /// Resolve many codes with at most one store round-trip.
    ///
    /// Store failures and timeouts leave custom roles unresolved; system
    /// roles always resolve.
    pub async fn resolve_by_codes(&self, codes: &[String]) -> RoleResolution {
        let mut resolution = RoleResolution::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for code in codes {
            let code = code.trim().to_uppercase();
            if !seen.insert(code.clone()) {
                continue;
            }
            match self.system.by_code(&code) {
                Some(role) => resolution.roles.push(role.clone()),
                None => pending.push(code),
            }
        }

        if pending.is_empty() {
            return resolution;
        }

        let stored = match bounded(self.timeout, self.store.get_by_codes(&pending)).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, codes = ?pending, "role store lookup failed; custom roles unresolved");
                resolution.unresolved = pending;
                resolution.store_error = Some(err);
                return resolution;
            }
        };

        for code in pending {
            let candidate = stored
                .iter()
                .find(|role| role.code.eq_ignore_ascii_case(&code));
            match candidate {
                Some(role) if self.system.shadows(role) => {
                    warn!(code = %role.code, id = %role.id, "stored role collides with a system role; ignoring");
                    resolution.unresolved.push(code);
                }
                Some(role) => {
                    let mut role = role.clone();
                    role.is_system_role = false;
                    resolution.roles.push(role);
                }
                None => {
                    debug!(code = %code, "unknown role code");
                    resolution.unresolved.push(code);
                }
            }
        }
        resolution
    }

    /// System roles followed by non-colliding custom roles.
    pub async fn list_roles(&self) -> Result<Vec<RoleDefinition>, RoleError> {
        let mut roles = self.system.roles().to_vec();
        let stored = bounded(self.timeout, self.store.list()).await?;
        roles.extend(stored.into_iter().filter(|role| {
            let shadowed = self.system.shadows(role);
            if shadowed {
                warn!(code = %role.code, id = %role.id, "stored role collides with a system role; hidden");
            }
            !shadowed
        }));
        Ok(roles)
    }

    /// Validate and persist a new custom role.
    pub async fn create_role(&self, role: RoleDefinition) -> Result<RoleDefinition, RoleError> {
        let role = self.prepare_custom(role)?;
        bounded(self.timeout, self.store.create(role.clone())).await?;
        Ok(role)
    }

    /// Validate and replace an existing custom role.
    pub async fn update_role(&self, role: RoleDefinition) -> Result<RoleDefinition, RoleError> {
        let role = self.prepare_custom(role)?;
        bounded(self.timeout, self.store.update(role.clone()))
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => RoleError::NotFound(role.code.clone()),
                other => RoleError::Store(other),
            })?;
        Ok(role)
    }

    /// Delete a custom role by code.
    pub async fn delete_role(&self, code: &str) -> Result<(), RoleError> {
        let code = code.trim().to_uppercase();
        if self.system.by_code(&code).is_some() {
            return Err(RoleError::SystemRoleImmutable(code));
        }
        if bounded(self.timeout, self.store.delete(&code)).await? {
            Ok(())
        } else {
            Err(RoleError::NotFound(code))
        }
    }

    fn prepare_custom(&self, mut role: RoleDefinition) -> Result<RoleDefinition, RoleError> {
        role.code = role.code.trim().to_uppercase();
        role.is_system_role = false;
        if self.system.shadows(&role) {
            return Err(RoleError::SystemRoleImmutable(role.code));
        }
        role.validate(&self.catalog)?;
        Ok(role)
    }
}
