// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-context entity cache with change tracking.

use std::collections::HashMap;

use crate::error::Result;

/// Entities the cache can track.
pub(crate) trait CachedEntity: Clone + PartialEq {
    fn cache_id(&self) -> &str;
}

#[derive(Debug)]
enum EntryState<E> {
    Inserted,
    Loaded { original: E },
    Deleted { persisted: bool },
}

#[derive(Debug)]
struct Entry<E> {
    entity: E,
    state: EntryState<E>,
}

/// Identity map for one unit of work: every entity is loaded at most once,
/// and [`flush`](EntityCache::flush) writes inserts, changed entities and
/// deletes in first-touched order.
#[derive(Debug)]
pub(crate) struct EntityCache<E> {
    entries: HashMap<String, Entry<E>>,
    order: Vec<String>,
}

impl<E> Default for EntityCache<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<E: CachedEntity> EntityCache<E> {
    fn track(&mut self, entity: E, state: EntryState<E>) {
        let id = entity.cache_id().to_string();
        if !self.entries.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.entries.insert(id, Entry { entity, state });
    }

    /// Whether the id was seen by this unit of work (including deletes).
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Whether the id was deleted in this unit of work.
    pub fn is_deleted(&self, id: &str) -> bool {
        matches!(
            self.entries.get(id).map(|e| &e.state),
            Some(EntryState::Deleted { .. })
        )
    }

    /// Cached, non-deleted entity.
    pub fn get(&self, id: &str) -> Option<&E> {
        self.entries
            .get(id)
            .filter(|e| !matches!(e.state, EntryState::Deleted { .. }))
            .map(|e| &e.entity)
    }

    /// Mutable access to a cached, non-deleted entity.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut E> {
        self.entries
            .get_mut(id)
            .filter(|e| !matches!(e.state, EntryState::Deleted { .. }))
            .map(|e| &mut e.entity)
    }

    /// Register a row read from the store. Already cached ids keep their
    /// in-memory version.
    pub fn loaded(&mut self, entity: E) {
        if !self.contains(entity.cache_id()) {
            let original = entity.clone();
            self.track(entity, EntryState::Loaded { original });
        }
    }

    /// Register a new entity.
    pub fn inserted(&mut self, entity: E) {
        self.track(entity, EntryState::Inserted);
    }

    /// Mark an entity deleted. Returns the entity as it was.
    pub fn delete(&mut self, id: &str) -> Option<E> {
        let entry = self.entries.get_mut(id)?;
        let persisted = match entry.state {
            EntryState::Inserted => false,
            EntryState::Loaded { .. } => true,
            EntryState::Deleted { .. } => return None,
        };
        entry.state = EntryState::Deleted { persisted };
        Some(entry.entity.clone())
    }

    /// Merge store rows with the cache: deleted rows are dropped, cached rows
    /// win over stored ones, and cached entities matching `predicate` that
    /// the store does not know yet are appended.
    pub fn merge(&mut self, rows: Vec<E>, predicate: impl Fn(&E) -> bool) -> Vec<E> {
        let mut result = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for row in rows {
            let id = row.cache_id().to_string();
            if self.is_deleted(&id) {
                continue;
            }
            self.loaded(row);
            if let Some(entity) = self.get(&id) {
                if predicate(entity) {
                    result.push(entity.clone());
                }
            }
            seen.insert(id);
        }

        for id in &self.order {
            if seen.contains(id) {
                continue;
            }
            if let Some(entity) = self.get(id) {
                if predicate(entity) {
                    result.push(entity.clone());
                }
            }
        }

        result
    }

    /// Write pending changes through the given store operations.
    pub fn flush(
        &mut self,
        mut insert: impl FnMut(&E) -> Result<()>,
        mut update: impl FnMut(&E) -> Result<()>,
        mut delete: impl FnMut(&str) -> Result<()>,
    ) -> Result<()> {
        for id in &self.order {
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            match &entry.state {
                EntryState::Inserted => insert(&entry.entity)?,
                EntryState::Loaded { original } if *original != entry.entity => {
                    update(&entry.entity)?
                }
                EntryState::Loaded { .. } => {}
                EntryState::Deleted { persisted: true } => delete(id)?,
                EntryState::Deleted { persisted: false } => {}
            }
        }
        self.entries.clear();
        self.order.clear();
        Ok(())
    }

    /// Number of writes the next flush will perform.
    pub fn pending_changes(&self) -> usize {
        self.entries
            .values()
            .filter(|e| match &e.state {
                EntryState::Inserted => true,
                EntryState::Loaded { original } => *original != e.entity,
                EntryState::Deleted { persisted } => *persisted,
            })
            .count()
    }
}
