//! Memory arenas
//!
//! Arenas are named scopes tracked by id. Deleting them all at shutdown does
//! not clear the ids stored in the process globals; a stale id is detected on
//! its next use.

use super::error::{sqlstate, BackendError, Result};
use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

#[derive(Debug, Clone)]
struct ArenaInfo {
    name: &'static str,
    parent: Option<ContextId>,
    resets: u64,
}

#[derive(Debug, Default)]
pub struct MemoryArenas {
    next_id: u64,
    live: AHashMap<ContextId, ArenaInfo>,
}

impl MemoryArenas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &'static str, parent: Option<ContextId>) -> Result<ContextId> {
        if let Some(p) = parent {
            self.check(p)?;
        }
        self.next_id += 1;
        let id = ContextId(self.next_id);
        self.live.insert(id, ArenaInfo { name, parent, resets: 0 });
        Ok(id)
    }

    pub fn is_live(&self, id: ContextId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn check(&self, id: ContextId) -> Result<()> {
        if self.is_live(id) {
            Ok(())
        } else {
            Err(BackendError::new(
                sqlstate::INTERNAL_ERROR,
                format!("stale memory context reference {}", id.0),
            ))
        }
    }

    /// Release everything allocated in `id`, keeping the arena itself.
    pub fn reset(&mut self, id: ContextId) -> Result<()> {
        match self.live.get_mut(&id) {
            Some(info) => {
                info.resets += 1;
                Ok(())
            }
            None => self.check(id),
        }
    }

    /// Delete `id` and all of its descendants.
    pub fn delete(&mut self, id: ContextId) {
        let children: Vec<ContextId> = self
            .live
            .iter()
            .filter(|(_, info)| info.parent == Some(id))
            .map(|(child, _)| *child)
            .collect();
        for child in children {
            self.delete(child);
        }
        self.live.remove(&id);
    }

    pub fn delete_all(&mut self) {
        self.live.clear();
    }

    pub fn name(&self, id: ContextId) -> Option<&'static str> {
        self.live.get(&id).map(|info| info.name)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_cascades_to_children() {
        let mut arenas = MemoryArenas::new();
        let top = arenas.create("TopMemoryContext", None).unwrap();
        let msg = arenas.create("MessageContext", Some(top)).unwrap();
        let nested = arenas.create("PortalContext", Some(msg)).unwrap();
        arenas.delete(msg);
        assert!(arenas.is_live(top));
        assert!(!arenas.is_live(msg));
        assert!(!arenas.is_live(nested));
        assert_eq!(arenas.name(top), Some("TopMemoryContext"));
    }

    #[test]
    fn test_stale_ids_are_detected() {
        let mut arenas = MemoryArenas::new();
        let top = arenas.create("TopMemoryContext", None).unwrap();
        arenas.delete_all();
        assert!(arenas.check(top).is_err());
        assert!(arenas.reset(top).is_err());
        assert!(arenas.create("Child", Some(top)).is_err());
    }
}
