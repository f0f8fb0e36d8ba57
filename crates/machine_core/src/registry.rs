//! Ordered, id-unique collection of machine resources.
//!
//! Insertion order is iteration order; the first head is the machine's
//! default head. The registry has no internal locking, `Machine` wraps it.

use std::{fmt, sync::Arc};

use shared::error::RegistryError;

use crate::resources::RegistryItem;

pub struct ResourceRegistry<R: ?Sized + RegistryItem> {
    items: Vec<Arc<R>>,
}

impl<R: ?Sized + RegistryItem> ResourceRegistry<R> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn add(&mut self, item: Arc<R>) -> Result<(), RegistryError> {
        if self.position(item.id()).is_some() {
            return Err(RegistryError::DuplicateIdentifier {
                kind: R::KIND,
                id: item.id().to_string(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Removes `item` by identity. Absent items are a no-op and yield `None`.
    pub fn remove(&mut self, item: &Arc<R>) -> Option<Arc<R>> {
        let index = self
            .items
            .iter()
            .position(|existing| Arc::ptr_eq(existing, item))?;
        Some(self.items.remove(index))
    }

    pub fn remove_by_id(&mut self, id: &str) -> Result<Arc<R>, RegistryError> {
        match self.position(id) {
            Some(index) => Ok(self.items.remove(index)),
            None => Err(self.not_found(id)),
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<R>, RegistryError> {
        self.position(id)
            .map(|index| Arc::clone(&self.items[index]))
            .ok_or_else(|| self.not_found(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn list(&self) -> &[Arc<R>] {
        &self.items
    }

    pub fn first(&self) -> Option<Arc<R>> {
        self.items.first().cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn not_found(&self, id: &str) -> RegistryError {
        RegistryError::NotFound {
            kind: R::KIND,
            id: id.to_string(),
        }
    }
}

impl<R: ?Sized + RegistryItem> Default for ResourceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ?Sized + RegistryItem> fmt::Debug for ResourceRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("kind", &R::KIND)
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
