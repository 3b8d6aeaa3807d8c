/**
 * Peer synchronizer
 *
 * Keeps a `MirrorStore` in line with the remote collection by cycling
 * through Listing, Watching and Backoff until cancelled:
 *
 * - Listing swaps in a full snapshot and delivers the net difference.
 * - Watching applies stream events one by one, in arrival order.
 * - Backoff sleeps with a jittered, growing delay before the next List.
 *
 * Callbacks for one key follow the remote order inside a single watch
 * session. Across a relist only the net difference is delivered; states the
 * remote passed through in between are not replayed.
 */
use super::backoff::Backoff;
use super::config::SyncConfig;
use super::entity::{Entity, EntityKey};
use super::event::{ChangeEvent, RemoteEvent};
use super::remote::RemoteCollection;
use super::sink::EventSink;
use super::stats::{StatsHandle, SyncState};
use super::store::{MirrorStore, StoreReader};
use crate::k8s::selector::Selector;
use futures::StreamExt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Cursor used when a List returned no version token
const ANY_VERSION: &str = "0";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{callback} panicked for {key}: {message}")]
    HandlerPanicked {
        callback: &'static str,
        key: EntityKey,
        message: String,
    },
}

/// Outcome of applying one watch event to the store
enum Applied<K> {
    Change(ChangeEvent<K>),
    Nothing,
    Malformed(String),
}

pub struct Synchronizer<K, R> {
    id: String,
    remote: Arc<R>,
    selector: Selector,
    config: SyncConfig,
    store: MirrorStore<K>,
    cursor: Option<String>,
    resync_at: Option<Instant>,
    backoff: Backoff,
    stats: StatsHandle,
}

impl<K, R> Synchronizer<K, R>
where
    K: Entity,
    R: RemoteCollection<K> + 'static,
{
    #[must_use]
    pub fn new(remote: Arc<R>, selector: Selector, config: SyncConfig) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            remote,
            selector,
            backoff: Backoff::new(config.backoff.clone()),
            config,
            store: MirrorStore::new(),
            cursor: None,
            resync_at: None,
            stats: StatsHandle::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    #[must_use]
    pub const fn store(&self) -> &MirrorStore<K> {
        &self.store
    }

    #[must_use]
    pub fn reader(&self) -> StoreReader<K> {
        self.store.reader()
    }

    #[must_use]
    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// Version token the next watch resumes from
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Run on a task of its own until the token is cancelled
    pub fn spawn<S>(mut self, mut sink: S, token: CancellationToken) -> JoinHandle<Result<(), SyncError>>
    where
        S: EventSink<K> + 'static,
    {
        tokio::spawn(async move { self.run(&mut sink, token).await })
    }

    /// Drive the list/watch cycle until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HandlerPanicked` when a sink callback panics. The store
    /// already holds the change that was being delivered.
    pub async fn run<S>(&mut self, sink: &mut S, token: CancellationToken) -> Result<(), SyncError>
    where
        S: EventSink<K> + ?Sized,
    {
        let span = info_span!("peers", id = %self.id, selector = %self.selector);
        let result = self.cycle(sink, &token).instrument(span).await;
        self.stats.update(|s| s.state = SyncState::Stopped);
        result
    }

    async fn cycle<S>(&mut self, sink: &mut S, token: &CancellationToken) -> Result<(), SyncError>
    where
        S: EventSink<K> + ?Sized,
    {
        info!("🔍 Starting peer synchronizer");
        let mut state = SyncState::Listing;

        while state != SyncState::Stopped {
            self.stats.update(|s| s.state = state);
            state = match state {
                SyncState::Listing => self.list(sink, token).await?,
                SyncState::Watching => self.watch(sink, token).await?,
                SyncState::Backoff => self.wait(token).await,
                SyncState::Stopped => SyncState::Stopped,
            };
        }

        info!("🛑 Peer synchronizer stopped");
        Ok(())
    }

    async fn list<S>(&mut self, sink: &mut S, token: &CancellationToken) -> Result<SyncState, SyncError>
    where
        S: EventSink<K> + ?Sized,
    {
        let listed = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(SyncState::Stopped),
            listed = self.remote.list(&self.selector) => listed,
        };

        let page = match listed {
            Ok(page) => page,
            Err(e) => {
                warn!("❌ List failed: {}", e);
                self.record_failure();
                return Ok(SyncState::Backoff);
            }
        };

        let items: Vec<K> = page
            .items
            .into_iter()
            .filter(|e| self.selector.matches(e.labels()))
            .collect();
        let changes = self
            .store
            .replace(items, page.version.clone(), self.config.relist_diff);
        self.cursor = page.version;
        self.resync_at = self.config.resync_period().map(|p| Instant::now() + p);

        let peers = self.store.len();
        self.stats.update(|s| {
            s.lists += 1;
            s.peers = peers;
            s.last_list = Some(chrono::Utc::now());
        });
        info!(
            "📋 Listed {} peers at version {} ({} changes)",
            peers,
            self.cursor.as_deref().unwrap_or("?"),
            changes.len()
        );

        for change in &changes {
            self.deliver(sink, change)?;
        }
        Ok(SyncState::Watching)
    }

    async fn watch<S>(&mut self, sink: &mut S, token: &CancellationToken) -> Result<SyncState, SyncError>
    where
        S: EventSink<K> + ?Sized,
    {
        let since = self.cursor.clone().unwrap_or_else(|| ANY_VERSION.to_string());
        let resync = resync_timer(self.resync_at);
        tokio::pin!(resync);

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(SyncState::Stopped),
            () = &mut resync => return Ok(self.forced_relist("resync interval elapsed")),
            opened = self.remote.watch(&self.selector, &since) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("❌ Watch from {} failed to open: {}", since, e);
                self.record_failure();
                return Ok(SyncState::Backoff);
            }
        };
        self.stats.update(|s| s.watch_sessions += 1);
        debug!("👀 Watching from version {}", since);

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return Ok(SyncState::Stopped),
                () = &mut resync => return Ok(self.forced_relist("resync interval elapsed")),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    self.record_progress();
                    match self.apply(event) {
                        Applied::Change(change) => self.deliver(sink, &change)?,
                        Applied::Nothing => {}
                        Applied::Malformed(reason) => return Ok(self.forced_relist(&reason)),
                    }
                }
                Some(Err(e)) if e.is_expired() => {
                    warn!("⌛ Watch cursor {} expired: {}", since, e);
                    self.record_failure();
                    return Ok(SyncState::Backoff);
                }
                Some(Err(e)) => {
                    warn!("❌ Watch stream failed: {}", e);
                    self.record_failure();
                    return Ok(SyncState::Backoff);
                }
                None => {
                    debug!("🔍 Watch stream ended, relisting");
                    self.record_progress();
                    return Ok(SyncState::Backoff);
                }
            }
        }
    }

    async fn wait(&mut self, token: &CancellationToken) -> SyncState {
        let delay = self.backoff.next_delay();
        info!(
            "⏳ Relisting in {}ms (attempt {})",
            delay.as_millis(),
            self.backoff.attempts()
        );
        tokio::select! {
            biased;
            () = token.cancelled() => SyncState::Stopped,
            () = sleep(delay) => SyncState::Listing,
        }
    }

    /// Apply one watch event to the store and advance the cursor
    fn apply(&mut self, event: RemoteEvent<K>) -> Applied<K> {
        let version = event.version().map(ToString::to_string);
        let applied = match event {
            RemoteEvent::Bookmark(_) => Applied::Nothing,
            RemoteEvent::Added(entity) | RemoteEvent::Modified(entity)
                if !self.selector.matches(entity.labels()) =>
            {
                // no longer selected, so it leaves the peer set
                self.store
                    .delete(&entity.key())
                    .map_or(Applied::Nothing, |_| Applied::Change(ChangeEvent::Deleted(Arc::new(entity))))
            }
            RemoteEvent::Added(entity) => {
                let new = Arc::new(entity);
                match self.store.get(&new.key()) {
                    None => {
                        self.store.put(new.clone());
                        Applied::Change(ChangeEvent::Added(new))
                    }
                    Some(old) if old.version() == new.version() && new.version().is_some() => {
                        Applied::Nothing
                    }
                    Some(old) => {
                        self.store.put(new.clone());
                        Applied::Change(ChangeEvent::Modified { old, new })
                    }
                }
            }
            RemoteEvent::Modified(entity) => {
                let new = Arc::new(entity);
                match self.store.get(&new.key()) {
                    None => {
                        return Applied::Malformed(format!("modification of unknown peer {}", new.key()));
                    }
                    Some(old) => {
                        self.store.put(new.clone());
                        Applied::Change(ChangeEvent::Modified { old, new })
                    }
                }
            }
            RemoteEvent::Deleted(entity) => self
                .store
                .delete(&entity.key())
                .map_or(Applied::Nothing, |_| Applied::Change(ChangeEvent::Deleted(Arc::new(entity)))),
        };

        if version.is_some() {
            self.cursor = version;
        }
        applied
    }

    fn deliver<S>(&self, sink: &mut S, change: &ChangeEvent<K>) -> Result<(), SyncError>
    where
        S: EventSink<K> + ?Sized,
    {
        debug!(
            "📨 {} {} @{}",
            change.callback_name(),
            change.key(),
            change.version().unwrap_or("?")
        );

        catch_unwind(AssertUnwindSafe(|| sink.on_event(change))).map_err(|payload| {
            let err = SyncError::HandlerPanicked {
                callback: change.callback_name(),
                key: change.key(),
                message: panic_message(payload.as_ref()),
            };
            error!("💥 {}", err);
            err
        })?;

        let peers = self.store.len();
        self.stats.update(|s| {
            s.events_delivered += 1;
            s.peers = peers;
        });
        Ok(())
    }

    fn forced_relist(&mut self, reason: &str) -> SyncState {
        info!("🔄 Forcing relist: {}", reason);
        self.backoff.reset();
        self.stats.update(|s| {
            s.forced_relists += 1;
            s.consecutive_failures = 0;
        });
        SyncState::Listing
    }

    fn record_failure(&self) {
        self.stats.update(|s| s.consecutive_failures += 1);
    }

    fn record_progress(&mut self) {
        if self.backoff.attempts() > 0 {
            self.backoff.reset();
            self.stats.update(|s| s.consecutive_failures = 0);
        }
    }
}

async fn resync_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
