/**
 * Event sink contract
 *
 * Callbacks run on the synchronizer's own task, one at a time and in
 * delivery order. A callback that blocks stalls the synchronizer, and a
 * callback that panics stops it.
 *
 * After a relist the sink may see `on_add` for an entity it was already
 * told about (its previous state was lost with a failed watch), so
 * callbacks must tolerate duplicates.
 */
use super::event::ChangeEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

pub trait EventSink<K>: Send {
    fn on_add(&mut self, entity: &K);

    fn on_update(&mut self, old: &K, new: &K);

    fn on_delete(&mut self, entity: &K);

    /// Entry point used by the synchronizer
    fn on_event(&mut self, event: &ChangeEvent<K>) {
        match event {
            ChangeEvent::Added(e) => self.on_add(e),
            ChangeEvent::Modified { old, new } => self.on_update(old, new),
            ChangeEvent::Deleted(e) => self.on_delete(e),
        }
    }
}

type EntityFn<K> = Box<dyn FnMut(&K) + Send>;
type UpdateFn<K> = Box<dyn FnMut(&K, &K) + Send>;

/// Sink assembled from optional closures; missing callbacks are no-ops
pub struct HandlerFns<K> {
    add: Option<EntityFn<K>>,
    update: Option<UpdateFn<K>>,
    delete: Option<EntityFn<K>>,
}

impl<K> Default for HandlerFns<K> {
    fn default() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }
}

impl<K> HandlerFns<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_add(mut self, f: impl FnMut(&K) + Send + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_update(mut self, f: impl FnMut(&K, &K) + Send + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_delete(mut self, f: impl FnMut(&K) + Send + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<K> EventSink<K> for HandlerFns<K> {
    fn on_add(&mut self, entity: &K) {
        if let Some(f) = self.add.as_mut() {
            f(entity);
        }
    }

    fn on_update(&mut self, old: &K, new: &K) {
        if let Some(f) = self.update.as_mut() {
            f(old, new);
        }
    }

    fn on_delete(&mut self, entity: &K) {
        if let Some(f) = self.delete.as_mut() {
            f(entity);
        }
    }
}

/// Forwards every change to a channel; a dropped receiver is ignored
impl<K: Clone + Send + Sync> EventSink<K> for mpsc::UnboundedSender<ChangeEvent<K>> {
    fn on_add(&mut self, entity: &K) {
        let _ = self.send(ChangeEvent::Added(Arc::new(entity.clone())));
    }

    fn on_update(&mut self, old: &K, new: &K) {
        let _ = self.send(ChangeEvent::Modified {
            old: Arc::new(old.clone()),
            new: Arc::new(new.clone()),
        });
    }

    fn on_delete(&mut self, entity: &K) {
        let _ = self.send(ChangeEvent::Deleted(Arc::new(entity.clone())));
    }

    fn on_event(&mut self, event: &ChangeEvent<K>) {
        let _ = self.send(event.clone());
    }
}
