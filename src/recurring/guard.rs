//! Per-template mutual exclusion for materialization and template edits.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::database_id::TemplateId;

/// A registry of locks keyed by template ID.
///
/// Work on different templates runs in parallel, while work on the same template is
/// serialised. Always take a template lock before the database connection lock, never
/// the other way around.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct TemplateLocks {
    locks: Arc<Mutex<HashMap<TemplateId, Arc<Mutex<()>>>>>,
}

impl TemplateLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `template_id`.
    ///
    /// A lock poisoned by a panic in an earlier holder is taken over, since the guarded
    /// state lives in the database and is protected by its transactions.
    pub fn with_lock<T>(&self, template_id: TemplateId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(template_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        f()
    }

    /// Drop the lock for a deleted template.
    pub fn forget(&self, template_id: TemplateId) {
        self.registry().remove(&template_id);
    }

    fn lock_for(&self, template_id: TemplateId) -> Arc<Mutex<()>> {
        self.registry().entry(template_id).or_default().clone()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<TemplateId, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.registry().len()
    }
}
