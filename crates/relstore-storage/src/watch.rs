//! Watch Hub and Watcher Sessions
//!
//! Per-table change notification. Writers signal a version-bumped notifier
//! after every successful commit; watcher tasks loop over (query, wait)
//! cycles, reading revisions past their cursor and emitting events over a
//! bounded channel. The hub itself holds no queue, so nothing can be
//! dropped: a slow consumer blocks its own watcher from reading further
//! rows, which is the backpressure.
//!
//! ## Session Loop
//!
//! 1. Resolve the starting cursor: a fresh watch snapshots current live
//!    objects as ADDED events (terminated by an initial-events-end BOOKMARK
//!    when requested) and starts after the snapshot revision; an explicit
//!    resource version resumes there, failing `Expired` when it has been
//!    compacted away. Requesting initial events together with an explicit
//!    resource version snapshots as of that revision, not the present.
//! 2. Mark the notifier seen, then query revisions past the cursor.
//! 3. Emit events in id order, advancing the cursor per row; re-query
//!    immediately while rows keep coming.
//! 4. On an empty round, wait for the notifier, the wait deadline (which
//!    re-queries, picking up writes committed by peer servers sharing the
//!    database, and emits a keepalive bookmark when the client opted in),
//!    consumer departure, or factory shutdown.
//!
//! Within one table events are strictly increasing in revision id; across
//! tables no ordering is promised.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use relstore_core::{
    Error, ListOptions, ResourceVersionMatch, Result, StorageObject, WatchEvent,
};

use crate::store::{RevisionRow, RevisionStore};

/// Per-table broadcast primitive. Writers bump the notifier with the id they
/// committed; every subscribed watcher wakes and re-queries.
#[derive(Clone)]
pub struct WatchHub {
    notifier: Arc<watch::Sender<i64>>,
}

impl WatchHub {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            notifier: Arc::new(tx),
        }
    }

    /// Called by the store strictly after a commit succeeds.
    pub(crate) fn broadcast(&self, id: i64) {
        self.notifier.send_replace(id);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<i64> {
        self.notifier.subscribe()
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Capacity of each watcher's outbound event channel.
    pub channel_capacity: usize,
    /// Maximum rows read per catch-up query.
    pub batch_limit: i64,
    /// Deadline on an idle wait before the watcher re-queries.
    pub wait_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let wait_secs = std::env::var("RELSTORE_WATCH_WAIT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);

        Self {
            channel_capacity: 100,
            batch_limit: 500,
            wait_timeout: Duration::from_secs(wait_secs),
        }
    }
}

/// A running watch session. Dropping it cancels the session promptly; the
/// event channel closes once the session exits.
#[derive(Debug)]
pub struct Watcher<K> {
    rx: mpsc::Receiver<WatchEvent<K>>,
    handle: JoinHandle<()>,
}

impl<K> Watcher<K> {
    /// Next event, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<WatchEvent<K>> {
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl<K> Drop for Watcher<K> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Why a session loop ended.
enum Stop {
    /// Consumer went away or the factory shut down.
    Cancelled,
    /// Storage failure to surface on the stream.
    Failed(Error),
}

impl From<Error> for Stop {
    fn from(err: Error) -> Self {
        Stop::Failed(err)
    }
}

pub(crate) async fn start<K: StorageObject>(
    store: RevisionStore<K>,
    namespace: String,
    opts: ListOptions,
) -> Result<Watcher<K>> {
    let cfg = store.watch_config().clone();
    let fresh = opts.is_fresh();

    // Fresh consumers (and explicit requests) get the initial snapshot; the
    // terminating bookmark additionally requires the client to understand
    // bookmarks or to have asked for initial events outright.
    let initial_snapshot = fresh || opts.send_initial_events == Some(true);
    let initial_bookmark =
        opts.send_initial_events == Some(true) || (opts.allow_watch_bookmarks && fresh);

    let start_cursor = if fresh {
        None
    } else {
        let requested = opts.resource_version.parse::<i64>().map_err(|_| {
            Error::Invalid(format!(
                "resourceVersion {:?} is not a revision id",
                opts.resource_version
            ))
        })?;
        let watermark = store.watermark().await?;
        // A plain resume only replays revisions past the cursor, so the
        // cursor itself may sit on the watermark. An initial snapshot is a
        // historical list *at* the requested revision, which compaction has
        // destroyed once the watermark reaches it.
        let expired = if initial_snapshot {
            requested <= watermark
        } else {
            requested < watermark
        };
        if expired {
            return Err(Error::Expired {
                resource_version: requested,
                watermark,
            });
        }
        Some(requested)
    };

    let (tx, rx) = mpsc::channel(cfg.channel_capacity);
    let session = WatchSession {
        store,
        namespace,
        opts,
        cfg,
        tx,
        initial_snapshot,
        initial_bookmark,
        start_cursor,
    };
    let handle = tokio::spawn(session.run());
    Ok(Watcher { rx, handle })
}

struct WatchSession<K: StorageObject> {
    store: RevisionStore<K>,
    namespace: String,
    opts: ListOptions,
    cfg: WatchConfig,
    tx: mpsc::Sender<WatchEvent<K>>,
    initial_snapshot: bool,
    initial_bookmark: bool,
    start_cursor: Option<i64>,
}

impl<K: StorageObject> WatchSession<K> {
    async fn run(mut self) {
        match self.stream().await {
            Ok(()) | Err(Stop::Cancelled) => {}
            Err(Stop::Failed(err)) => {
                // Best effort: the consumer may already be gone.
                let _ = self.tx.send(WatchEvent::Error(err)).await;
            }
        }
        debug!(table = %self.store.table(), "watch session closed");
    }

    async fn stream(&mut self) -> std::result::Result<(), Stop> {
        let label = self.opts.label_selector.clone().unwrap_or_default();
        let field = self.opts.field_selector.clone().unwrap_or_default();
        let pushdown = self.store.pushdown(&label, &field);
        let mut notifier = self.store.hub().subscribe();
        let mut shutdown = self.store.shutdown_signal();

        let mut cursor = self.start_cursor.unwrap_or(0);
        if self.initial_snapshot {
            cursor = self.send_initial().await?;
            if self.initial_bookmark {
                self.send(WatchEvent::Bookmark {
                    resource_version: cursor,
                    initial_events_end: true,
                })
                .await?;
            }
        }

        loop {
            // Mark the notifier seen before querying: a commit landing
            // between this query and the wait below then wakes us
            // immediately instead of being missed.
            notifier.borrow_and_update();

            let rows = self
                .store
                .since(cursor, &self.namespace, &pushdown, self.cfg.batch_limit)
                .await?;

            if !rows.is_empty() {
                for row in &rows {
                    cursor = row.id;
                    if !self.store.matches(row, &label, &field)? {
                        continue;
                    }
                    self.send(classify(row)?).await?;
                }
                // More rows may be pending past the batch limit.
                continue;
            }

            tokio::select! {
                changed = notifier.changed() => {
                    if changed.is_err() {
                        return Err(Stop::Cancelled);
                    }
                }
                _ = tokio::time::sleep(self.cfg.wait_timeout) => {
                    if self.opts.progress_notify && self.opts.allow_watch_bookmarks {
                        self.send(WatchEvent::Bookmark {
                            resource_version: cursor,
                            initial_events_end: false,
                        })
                        .await?;
                    }
                }
                _ = self.tx.closed() => return Err(Stop::Cancelled),
                _ = shutdown.changed() => return Err(Stop::Cancelled),
            }
        }
    }

    /// Emits the live objects as ADDED events, paging through the snapshot,
    /// and returns the snapshot revision as the new cursor. A caller that
    /// supplied an explicit resource version gets the snapshot as of that
    /// revision; fresh watches snapshot the latest committed state.
    async fn send_initial(&self) -> std::result::Result<i64, Stop> {
        let snapshot = match self.start_cursor {
            Some(requested) => requested,
            None => self.store.max_id().await?,
        };
        if snapshot == 0 {
            return Ok(0);
        }

        let mut list_opts = ListOptions {
            resource_version: snapshot.to_string(),
            resource_version_match: ResourceVersionMatch::Exact,
            limit: self.cfg.batch_limit,
            label_selector: self.opts.label_selector.clone(),
            field_selector: self.opts.field_selector.clone(),
            ..Default::default()
        };
        loop {
            let page = self.store.list(&self.namespace, &list_opts).await?;
            for obj in page.items {
                self.send(WatchEvent::Added(obj)).await?;
            }
            match page.continue_token {
                Some(token) => list_opts.continue_token = Some(token),
                None => break,
            }
        }
        Ok(snapshot)
    }

    async fn send(&self, event: WatchEvent<K>) -> std::result::Result<(), Stop> {
        self.tx.send(event).await.map_err(|_| Stop::Cancelled)
    }
}

fn classify<K: StorageObject>(row: &RevisionRow) -> Result<WatchEvent<K>> {
    let obj = row.decode::<K>()?;
    Ok(if row.is_tombstone() {
        WatchEvent::Deleted(obj)
    } else if row.is_create() {
        WatchEvent::Added(obj)
    } else {
        WatchEvent::Modified(obj)
    })
}
