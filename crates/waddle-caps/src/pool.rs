//! Feature-string interning.
//!
//! A [`FeaturePool`] maps feature namespaces to small integer ids so that
//! capability sets can be stored and compared as integer sets. Pools are
//! handed out by a [`FeatureRegistry`], which counts its users: the first
//! `init` allocates the pool and the last `finalize` drops it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::error::CapsError;

/// Interned feature namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u32);

#[derive(Debug, Default)]
struct PoolTable {
    names: Vec<String>,
    ids: HashMap<String, FeatureId>,
}

/// Shared interning table. Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct FeaturePool {
    table: Arc<RwLock<PoolTable>>,
}

impl FeaturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `ns`, returning the existing id if it was seen before.
    pub fn intern(&self, ns: &str) -> FeatureId {
        if let Some(id) = self.lookup(ns) {
            return id;
        }

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = table.ids.get(ns) {
            return *id;
        }
        let id = FeatureId(table.names.len() as u32);
        table.names.push(ns.to_string());
        table.ids.insert(ns.to_string(), id);
        id
    }

    /// Id of `ns` if anything in this pool ever interned it.
    pub fn lookup(&self, ns: &str) -> Option<FeatureId> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.ids.get(ns).copied()
    }

    pub fn inspect(&self, id: FeatureId) -> Option<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.names.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if both handles refer to the same table.
    pub fn same_pool(&self, other: &FeaturePool) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    users: usize,
    pool: Option<FeaturePool>,
}

/// Reference-counted owner of the process-wide feature pool.
///
/// Every connection manager sharing the registry calls [`init`](Self::init)
/// once when it starts and [`finalize`](Self::finalize) once when it stops.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and return the shared pool, allocating it on the
    /// first call.
    pub fn init(&self) -> FeaturePool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.users += 1;
        if state.pool.is_none() {
            debug!("allocating feature pool");
        }
        state.pool.get_or_insert_with(FeaturePool::new).clone()
    }

    /// Drop a user; the pool is released when the count reaches zero.
    pub fn finalize(&self) -> Result<(), CapsError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.users == 0 {
            return Err(CapsError::UnbalancedFinalize);
        }
        state.users -= 1;
        if state.users == 0 {
            debug!("releasing feature pool");
            state.pool = None;
        }
        Ok(())
    }

    pub fn users(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .users
    }

    /// The live pool, if any user has initialised it.
    pub fn pool(&self) -> Result<FeaturePool, CapsError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pool
            .clone()
            .ok_or(CapsError::NotInitialised)
    }
}
