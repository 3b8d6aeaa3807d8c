/**
 * Local mirror of the tracked collection
 *
 * The synchronizer is the only writer. Readers, including the event sink,
 * only ever see `Arc` snapshots of entries, never references into the map.
 */
use super::config::RelistDiff;
use super::entity::{Entity, EntityKey};
use super::event::ChangeEvent;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

type Entries<K> = BTreeMap<EntityKey, Arc<K>>;

#[derive(Debug)]
pub struct MirrorStore<K> {
    entries: Arc<RwLock<Entries<K>>>,
    version: Option<String>,
}

impl<K> Default for MirrorStore<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            version: None,
        }
    }
}

impl<K: Entity> MirrorStore<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloneable read-only handle that stays valid while the store is written
    #[must_use]
    pub fn reader(&self) -> StoreReader<K> {
        StoreReader {
            entries: self.entries.clone(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<Arc<K>> {
        read(&self.entries).get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<EntityKey> {
        read(&self.entries).keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    /// Version token of the last full replace
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Insert or replace an entity, returning what it replaced
    pub(crate) fn put(&mut self, entity: Arc<K>) -> Option<Arc<K>> {
        let key = entity.key();
        self.write().insert(key, entity)
    }

    pub(crate) fn delete(&mut self, key: &EntityKey) -> Option<Arc<K>> {
        self.write().remove(key)
    }

    /// Swap in a complete snapshot and return the net difference against the
    /// previous contents.
    ///
    /// Additions and updates come in snapshot order, deletions follow in key
    /// order. When a key repeats in the snapshot the last copy wins.
    pub(crate) fn replace(
        &mut self,
        entities: Vec<K>,
        version: Option<String>,
        diff: RelistDiff,
    ) -> Vec<ChangeEvent<K>> {
        let mut fresh: Entries<K> = BTreeMap::new();
        let mut order = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = entity.key();
            if fresh.insert(key.clone(), Arc::new(entity)).is_none() {
                order.push(key);
            }
        }

        let mut entries = self.write();
        let mut changes = Vec::new();

        for key in &order {
            let new = &fresh[key];
            match entries.get(key) {
                None => changes.push(ChangeEvent::Added(new.clone())),
                Some(old) if changed(old.as_ref(), new.as_ref(), diff) => changes.push(ChangeEvent::Modified {
                    old: old.clone(),
                    new: new.clone(),
                }),
                Some(_) => {}
            }
        }

        let kept: HashSet<&EntityKey> = order.iter().collect();
        changes.extend(
            entries
                .iter()
                .filter(|(key, _)| !kept.contains(key))
                .map(|(_, old)| ChangeEvent::Deleted(old.clone())),
        );

        *entries = fresh;
        drop(entries);
        self.version = version;
        changes
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Entries<K>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn changed<K: Entity>(old: &K, new: &K, diff: RelistDiff) -> bool {
    match (diff, old.version(), new.version()) {
        (RelistDiff::ByVersion, Some(a), Some(b)) => a != b,
        // without version tokens only the content can tell
        (RelistDiff::ByVersion, _, _) => !old.same_content(new),
        (RelistDiff::ByContent, _, _) => !old.same_content(new),
    }
}

fn read<K>(entries: &RwLock<Entries<K>>) -> RwLockReadGuard<'_, Entries<K>> {
    entries.read().unwrap_or_else(PoisonError::into_inner)
}

/// Shared read access to a [`MirrorStore`]
#[derive(Debug)]
pub struct StoreReader<K> {
    entries: Arc<RwLock<Entries<K>>>,
}

impl<K> Clone for StoreReader<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K> StoreReader<K> {
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<Arc<K>> {
        read(&self.entries).get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        read(&self.entries).contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<EntityKey> {
        read(&self.entries).keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    /// Every entry, in key order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<K>> {
        read(&self.entries).values().cloned().collect()
    }
}
