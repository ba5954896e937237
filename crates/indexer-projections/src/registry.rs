//! Process-wide projection registry.
//!
//! Same `Lazy<RwLock<_>>` shape as `indexer_event`'s event registry (and, a
//! level further back, the teacher's opcode-handler registry): projections
//! register themselves once at start-up, and the sync binary discovers the
//! full set without hand-wiring each one into `main`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::{BlockProjection, Projection, TransactionProjection};

static REGISTRY: Lazy<RwLock<HashMap<&'static str, Arc<dyn Projection>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Errors raised while registering or listing projections.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A projection with this id is already registered.
    #[error("projection {0} is already registered")]
    AlreadyRegistered(&'static str),
    /// The registry's lock was poisoned by a panicking holder.
    #[error("projection registry lock poisoned")]
    LockPoisoned,
}

/// Register `projection` under its own `id()`. Errors if that id is already
/// taken.
pub fn register(projection: Arc<dyn Projection>) -> Result<(), RegistryError> {
    let mut registry = REGISTRY.write().map_err(|_| RegistryError::LockPoisoned)?;
    let id = projection.id();
    if registry.contains_key(id) {
        return Err(RegistryError::AlreadyRegistered(id));
    }
    registry.insert(id, projection);
    Ok(())
}

/// Every projection currently registered, in unspecified order.
pub fn registered_projections() -> Result<Vec<Arc<dyn Projection>>, RegistryError> {
    let registry = REGISTRY.read().map_err(|_| RegistryError::LockPoisoned)?;
    Ok(registry.values().cloned().collect())
}

/// Register the projections shipped with the core: [`BlockProjection`] and
/// [`TransactionProjection`]. Safe to call once at process start-up; calling
/// it twice in the same process returns an error from the second
/// registration rather than silently double-registering.
pub fn register_projections() -> Result<(), RegistryError> {
    register(Arc::new(BlockProjection))?;
    register(Arc::new(TransactionProjection))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_registered() {
        INIT.call_once(|| {
            register_projections().unwrap();
        });
    }

    #[test]
    fn registers_both_core_projections() {
        ensure_registered();
        let projections = registered_projections().unwrap();
        let ids: Vec<_> = projections.iter().map(|p| p.id()).collect();
        assert!(ids.contains(&"view_blocks"));
        assert!(ids.contains(&"view_transactions"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        ensure_registered();
        let err = register(Arc::new(BlockProjection)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered("view_blocks")));
    }
}
