//! ---
//! sg_section: "03-role-registry"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "External role and assignment store seams plus in-memory backends."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::grant::PermissionGrant;
use crate::role::{RoleAssignment, RoleDefinition};

/// Failures reported by external stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable or returned an error.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Call exceeded its time budget.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    /// Write conflicts with existing data.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Entity missing.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Persistence of custom role definitions.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fetch every stored role whose code is in `codes`, in one round-trip.
    async fn get_by_codes(&self, codes: &[String]) -> Result<Vec<RoleDefinition>, StoreError>;

    /// Every stored role.
    async fn list(&self) -> Result<Vec<RoleDefinition>, StoreError>;

    /// Insert a role; fails with `Conflict` when the code exists.
    async fn create(&self, role: RoleDefinition) -> Result<(), StoreError>;

    /// Replace the role with the same code; fails with `NotFound` otherwise.
    async fn update(&self, role: RoleDefinition) -> Result<(), StoreError>;

    /// Remove by code, returning whether anything was removed.
    async fn delete(&self, code: &str) -> Result<bool, StoreError>;
}

/// Read side of role assignments and direct grants.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Current role assignments of a user.
    async fn get_assignments(&self, user_id: &str) -> Result<Vec<RoleAssignment>, StoreError>;

    /// Current direct grants of a user.
    async fn get_grants(&self, user_id: &str) -> Result<Vec<PermissionGrant>, StoreError>;
}

#[async_trait]
impl<T: RoleStore + ?Sized> RoleStore for Arc<T> {
    async fn get_by_codes(&self, codes: &[String]) -> Result<Vec<RoleDefinition>, StoreError> {
        (**self).get_by_codes(codes).await
    }

    async fn list(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        (**self).list().await
    }

    async fn create(&self, role: RoleDefinition) -> Result<(), StoreError> {
        (**self).create(role).await
    }

    async fn update(&self, role: RoleDefinition) -> Result<(), StoreError> {
        (**self).update(role).await
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        (**self).delete(code).await
    }
}

/// Run a store call under `budget`, mapping expiry to [`StoreError::Timeout`].
pub async fn bounded<T, F>(budget: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(budget)),
    }
}

/// Shared switches used to simulate an unhealthy backend.
#[derive(Debug, Default)]
struct Faults {
    offline: AtomicBool,
    latency: RwLock<Option<Duration>>,
}

impl Faults {
    async fn check(&self, store: &str) -> Result<(), StoreError> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{store} offline")));
        }
        Ok(())
    }
}

/// In-memory role store for development and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRoleStore {
    roles: Arc<RwLock<IndexMap<String, RoleDefinition>>>,
    faults: Arc<Faults>,
}

impl InMemoryRoleStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `roles`, keyed by uppercase code. Later duplicates replace earlier ones.
    pub fn with_roles(roles: impl IntoIterator<Item = RoleDefinition>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.roles.write();
            for role in roles {
                guard.insert(role.code.to_uppercase(), role);
            }
        }
        store
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every call, e.g. to exercise timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.write() = latency;
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_by_codes(&self, codes: &[String]) -> Result<Vec<RoleDefinition>, StoreError> {
        self.faults.check("role store").await?;
        let guard = self.roles.read();
        Ok(codes
            .iter()
            .filter_map(|code| guard.get(&code.to_uppercase()).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        self.faults.check("role store").await?;
        Ok(self.roles.read().values().cloned().collect())
    }

    async fn create(&self, role: RoleDefinition) -> Result<(), StoreError> {
        self.faults.check("role store").await?;
        let mut guard = self.roles.write();
        let code = role.code.to_uppercase();
        if guard.contains_key(&code) {
            return Err(StoreError::Conflict(format!("role {code} already exists")));
        }
        if guard.values().any(|existing| existing.id == role.id) {
            return Err(StoreError::Conflict(format!("role id {} already exists", role.id)));
        }
        guard.insert(code, role);
        Ok(())
    }

    async fn update(&self, role: RoleDefinition) -> Result<(), StoreError> {
        self.faults.check("role store").await?;
        let mut guard = self.roles.write();
        let code = role.code.to_uppercase();
        match guard.get_mut(&code) {
            Some(existing) => {
                *existing = role;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("role {code}"))),
        }
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        self.faults.check("role store").await?;
        Ok(self
            .roles
            .write()
            .shift_remove(&code.to_uppercase())
            .is_some())
    }
}

/// In-memory assignment/grant store for development and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAssignmentStore {
    assignments: Arc<RwLock<HashMap<String, Vec<RoleAssignment>>>>,
    grants: Arc<RwLock<HashMap<String, Vec<PermissionGrant>>>>,
    faults: Arc<Faults>,
}

impl InMemoryAssignmentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a role, replacing an existing assignment of the same code.
    pub fn assign_role(&self, assignment: RoleAssignment) {
        let mut guard = self.assignments.write();
        let entries = guard.entry(assignment.user_id.clone()).or_default();
        entries.retain(|existing| existing.role_code != assignment.role_code);
        entries.push(assignment);
    }

    /// Remove a role assignment. Returns whether one existed.
    pub fn revoke_role(&self, user_id: &str, role_code: &str) -> bool {
        let code = role_code.to_uppercase();
        let mut guard = self.assignments.write();
        match guard.get_mut(user_id) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|existing| existing.role_code != code);
                before != entries.len()
            }
            None => false,
        }
    }

    /// Record a direct grant, replacing one for the same permission.
    pub fn grant_permission(&self, grant: PermissionGrant) {
        let mut guard = self.grants.write();
        let entries = guard.entry(grant.user_id.clone()).or_default();
        entries.retain(|existing| existing.permission_identifier != grant.permission_identifier);
        entries.push(grant);
    }

    /// Remove a direct grant. Returns whether one existed.
    pub fn revoke_grant(&self, user_id: &str, permission_identifier: &str) -> bool {
        let mut guard = self.grants.write();
        match guard.get_mut(user_id) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|existing| existing.permission_identifier != permission_identifier);
                before != entries.len()
            }
            None => false,
        }
    }

    /// Simulate an outage: every read fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every read.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.write() = latency;
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn get_assignments(&self, user_id: &str) -> Result<Vec<RoleAssignment>, StoreError> {
        self.faults.check("assignment store").await?;
        Ok(self
            .assignments
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_grants(&self, user_id: &str) -> Result<Vec<PermissionGrant>, StoreError> {
        self.faults.check("assignment store").await?;
        Ok(self.grants.read().get(user_id).cloned().unwrap_or_default())
    }
}
