//! ---
//! sg_section: "03-role-registry"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Short-TTL read-through cache in front of a role store."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! Invalidation contract: writes issued through the cache drop the affected
//! code immediately; writes issued directly against the inner store become
//! visible once the entry's TTL lapses, or after [`CachedRoleStore::invalidate_all`].
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::role::RoleDefinition;
use crate::store::{RoleStore, StoreError};

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    /// `None` records that the store has no role with this code.
    role: Option<RoleDefinition>,
}

/// Read-through cache for [`RoleStore::get_by_codes`].
#[derive(Debug)]
pub struct CachedRoleStore<S> {
    inner: S,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl<S: RoleStore> CachedRoleStore<S> {
    /// Wrap `inner`. A zero `ttl` disables caching entirely.
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drop one code from the cache.
    pub fn invalidate(&self, code: &str) {
        self.entries.write().remove(&code.to_uppercase());
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    /// Number of live (unexpired) entries.
    pub fn cached_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| now.duration_since(entry.fetched_at) < self.ttl)
            .count()
    }

    fn lookup_fresh(&self, codes: &[String]) -> (Vec<RoleDefinition>, Vec<String>) {
        let now = Instant::now();
        let guard = self.entries.read();
        let mut hits = Vec::new();
        let mut misses = Vec::new();
        for code in codes {
            let key = code.to_uppercase();
            match guard.get(&key) {
                Some(entry) if now.duration_since(entry.fetched_at) < self.ttl => {
                    hits.extend(entry.role.clone());
                }
                _ => misses.push(key),
            }
        }
        (hits, misses)
    }
}

#[async_trait]
impl<S: RoleStore> RoleStore for CachedRoleStore<S> {
    async fn get_by_codes(&self, codes: &[String]) -> Result<Vec<RoleDefinition>, StoreError> {
        if self.ttl.is_zero() {
            return self.inner.get_by_codes(codes).await;
        }
        let (mut roles, misses) = self.lookup_fresh(codes);
        if misses.is_empty() {
            trace!(codes = codes.len(), "role cache hit");
            return Ok(roles);
        }

        let fetched = self.inner.get_by_codes(&misses).await?;
        let fetched_at = Instant::now();
        {
            let mut guard = self.entries.write();
            guard.retain(|_, entry| fetched_at.duration_since(entry.fetched_at) < self.ttl);
            for code in &misses {
                let role = fetched
                    .iter()
                    .find(|role| role.code.eq_ignore_ascii_case(code))
                    .cloned();
                guard.insert(code.clone(), CacheEntry { fetched_at, role });
            }
        }
        trace!(hits = roles.len(), misses = misses.len(), "role cache refreshed");
        roles.extend(fetched);
        Ok(roles)
    }

    async fn list(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        self.inner.list().await
    }

    async fn create(&self, role: RoleDefinition) -> Result<(), StoreError> {
        let code = role.code.clone();
        let result = self.inner.create(role).await;
        self.invalidate(&code);
        result
    }

    async fn update(&self, role: RoleDefinition) -> Result<(), StoreError> {
        let code = role.code.clone();
        let result = self.inner.update(role).await;
        self.invalidate(&code);
        result
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        let result = self.inner.delete(code).await;
        self.invalidate(code);
        result
    }
}
