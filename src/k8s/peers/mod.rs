/**
 * Peer watching
 *
 * A `Synchronizer` mirrors every entity matching a `Selector` into a local
 * `MirrorStore` and reports each change to an `EventSink`.
 */
pub mod backoff;
pub mod config;
pub mod entity;
pub mod event;
pub mod remote;
pub mod sink;
pub mod stats;
pub mod store;
pub mod synchronizer;

#[cfg(test)]
mod fake;

pub use backoff::Backoff;
pub use config::{BackoffConfig, RelistDiff, SyncConfig};
pub use entity::{Entity, EntityKey};
pub use event::{ChangeEvent, RemoteEvent};
pub use remote::{EventStream, KubeCollection, ListPage, RemoteCollection, RemoteError};
pub use sink::{EventSink, HandlerFns};
pub use stats::{StatsHandle, SyncState, SyncStats};
pub use store::{MirrorStore, StoreReader};
pub use synchronizer::{SyncError, Synchronizer};
