//! Registry of active tenants
//!
//! Each tenant owns a read/write gate. A rebuild holds the write side for the
//! whole drop/create/insert sequence, so a query either sees the finished
//! index or fails fast with `IndexNotFound`.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

struct TenantSlot {
    gate: Arc<RwLock<()>>,
    ready: AtomicBool,
}

impl TenantSlot {
    fn new(ready: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(RwLock::new(())),
            ready: AtomicBool::new(ready),
        })
    }
}

/// Exclusive hold on one tenant while its index is rebuilt or removed
pub struct RebuildGuard {
    tenant_id: String,
    slot: Arc<TenantSlot>,
    _write: OwnedRwLockWriteGuard<()>,
}

impl RebuildGuard {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

/// Shared hold on a ready tenant for the duration of a query
pub struct ReadGuard {
    _read: OwnedRwLockReadGuard<()>,
}

/// Tenant state as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    Ready,
    Rebuilding,
}

/// In-process registry of tenants, created at startup and owned by the caller
#[derive(Default)]
pub struct TenantRegistry {
    slots: Mutex<HashMap<String, Arc<TenantSlot>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register tenants whose indexes already exist (e.g. from a previous run)
    pub async fn seed<I, S>(&self, tenants: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots = self.slots.lock().await;
        for tenant in tenants {
            let tenant = tenant.into();
            debug!("Seeding tenant {}", tenant);
            slots.entry(tenant).or_insert_with(|| TenantSlot::new(true));
        }
    }

    /// Take exclusive hold of a tenant, adding it if unknown. Waits for any
    /// rebuild already in progress for the same tenant.
    pub async fn begin_rebuild(&self, tenant_id: &str) -> RebuildGuard {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(tenant_id.to_string())
                .or_insert_with(|| TenantSlot::new(false))
                .clone()
        };

        let write = slot.gate.clone().write_owned().await;
        slot.ready.store(false, Ordering::SeqCst);

        RebuildGuard {
            tenant_id: tenant_id.to_string(),
            slot,
            _write: write,
        }
    }

    /// Mark the rebuilt tenant queryable and release it
    pub async fn commit(&self, guard: RebuildGuard) {
        let mut slots = self.slots.lock().await;
        guard.slot.ready.store(true, Ordering::SeqCst);
        // A concurrent removal may have dropped the entry while we waited
        slots
            .entry(guard.tenant_id.clone())
            .or_insert_with(|| guard.slot.clone());
        debug!("Tenant {} ready", guard.tenant_id);
    }

    /// Forget the tenant held by `guard` and release it
    pub async fn abort(&self, guard: RebuildGuard) {
        let mut slots = self.slots.lock().await;
        if slots
            .get(&guard.tenant_id)
            .is_some_and(|current| Arc::ptr_eq(current, &guard.slot))
        {
            slots.remove(&guard.tenant_id);
        }
        debug!("Tenant {} dropped from registry", guard.tenant_id);
    }

    /// Shared hold for querying. Fails with `IndexNotFound` when the tenant is
    /// unknown or mid-rebuild.
    pub async fn read(&self, tenant_id: &str) -> Result<ReadGuard> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(tenant_id).cloned()
        }
        .ok_or_else(|| Error::IndexNotFound(format!("tenant '{}' is not registered", tenant_id)))?;

        let read = slot.gate.clone().try_read_owned().map_err(|_| {
            Error::IndexNotFound(format!("tenant '{}' is being rebuilt", tenant_id))
        })?;

        if !slot.ready.load(Ordering::SeqCst) {
            return Err(Error::IndexNotFound(format!(
                "tenant '{}' has no completed index",
                tenant_id
            )));
        }

        Ok(ReadGuard { _read: read })
    }

    pub async fn state(&self, tenant_id: &str) -> Option<TenantState> {
        let slots = self.slots.lock().await;
        let slot = slots.get(tenant_id)?;
        let ready = slot.ready.load(Ordering::SeqCst) && slot.gate.try_read().is_ok();
        Some(if ready {
            TenantState::Ready
        } else {
            TenantState::Rebuilding
        })
    }

    pub async fn contains(&self, tenant_id: &str) -> bool {
        self.slots.lock().await.contains_key(tenant_id)
    }

    /// Registered tenant ids, sorted
    pub async fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }
}
