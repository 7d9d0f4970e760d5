//! Revision Store
//!
//! The log-structured storage for one resource kind. Every mutation inserts
//! an immutable row whose database-assigned id doubles as the object's
//! resource version; updates and deletes chain to their predecessor through
//! the unique `previous_id` column, so a racing second updater or deleter
//! hits the unique index and observes a conflict. Creates have no
//! predecessor to collide on (their `previous_id` is NULL, and NULLs are
//! distinct under a unique index); racing creates of one key serialize on a
//! per-key transaction lock instead (see the write path below).
//!
//! ## Write Path
//!
//! Every write runs in a single transaction: read the current revision for
//! the key (with `FOR UPDATE` where the dialect has row locks), insert the
//! new row, commit. A create first takes the dialect's per-key transaction
//! lock ([`crate::dialect::Dialect::key_lock`]) because a first-time create
//! has no row for `FOR UPDATE` to lock; on SQLite the single-writer
//! transaction model already refuses the losing insert. The watch hub is
//! signalled strictly after a successful commit, so watchers never observe
//! an id that could still roll back.
//!
//! ## Read Path
//!
//! Gets resolve the highest-id live revision of a key. Lists are cut at a
//! snapshot revision: a row is visible when it is the highest id for its key
//! at or below the snapshot and not a tombstone. Pages are ordered by
//! `(namespace, name)` and resume through an opaque continue token pinned to
//! the same snapshot.

use std::sync::Arc;

use chrono::Utc;
use sqlx::any::AnyRow;
use sqlx::{Any, Row, Transaction};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use relstore_core::kind::ResourceKind;
use relstore_core::selector::{FieldSelector, LabelSelector};
use relstore_core::{
    codec, fields, ContinueToken, DeleteOptions, Error, ListOptions, ObjectList,
    ResourceVersionMatch, Result, StorageObject,
};

use crate::db::{map_sqlx_error, Db};
use crate::sql::{ListQuery, SinceQuery, SqlParam, TableContext};
use crate::watch::{WatchConfig, WatchHub, Watcher};

/// One persisted revision row.
#[derive(Debug, Clone)]
pub(crate) struct RevisionRow {
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub uid: String,
    #[allow(dead_code)]
    pub previous_id: Option<i64>,
    pub created: Option<i64>,
    pub deleted: i64,
    pub value: String,
}

impl RevisionRow {
    pub(crate) fn from_any(row: &AnyRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id").map_err(Error::internal)?,
            name: row.try_get("name").map_err(Error::internal)?,
            namespace: row.try_get("namespace").map_err(Error::internal)?,
            uid: row.try_get("uid").map_err(Error::internal)?,
            previous_id: row.try_get("previous_id").map_err(Error::internal)?,
            created: row.try_get("created").map_err(Error::internal)?,
            deleted: row.try_get("deleted").map_err(Error::internal)?,
            value: row.try_get("value").map_err(Error::internal)?,
        })
    }

    pub(crate) fn is_tombstone(&self) -> bool {
        self.deleted != 0
    }

    pub(crate) fn is_create(&self) -> bool {
        self.created.unwrap_or(0) != 0
    }

    pub(crate) fn decode<K: StorageObject>(&self) -> Result<K> {
        codec::decode(&self.value, self.id)
    }
}

/// Storage engine handle for one resource kind. Cheap to clone; all clones
/// share the factory's pool, watch hub, and shutdown signal.
pub struct RevisionStore<K: StorageObject> {
    db: Arc<Db>,
    ctx: Arc<TableContext>,
    hub: WatchHub,
    watch_cfg: WatchConfig,
    shutdown: watch::Receiver<bool>,
    _kind: std::marker::PhantomData<fn() -> K>,
}

impl<K: StorageObject> Clone for RevisionStore<K> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            ctx: self.ctx.clone(),
            hub: self.hub.clone(),
            watch_cfg: self.watch_cfg.clone(),
            shutdown: self.shutdown.clone(),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<K: StorageObject> RevisionStore<K> {
    pub(crate) fn new(
        db: Arc<Db>,
        ctx: Arc<TableContext>,
        hub: WatchHub,
        watch_cfg: WatchConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            ctx,
            hub,
            watch_cfg,
            shutdown,
            _kind: std::marker::PhantomData,
        }
    }

    pub fn kind(&self) -> &'static ResourceKind {
        K::kind()
    }

    pub fn table(&self) -> &str {
        &self.ctx.table
    }

    pub(crate) fn hub(&self) -> &WatchHub {
        &self.hub
    }

    pub(crate) fn watch_config(&self) -> &WatchConfig {
        &self.watch_cfg
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Persists a new object. Fails `AlreadyExists` when a live current
    /// revision holds the key; a tombstoned key is re-created with a fresh
    /// chain.
    pub async fn create(&self, obj: &K) -> Result<K> {
        let meta = obj.metadata();
        if meta.name.is_empty() {
            return Err(Error::Invalid("metadata.name is required".into()));
        }
        if !meta.resource_version.is_empty() {
            return Err(Error::Invalid(
                "resourceVersion must be empty on create".into(),
            ));
        }

        let mut stored = obj.clone();
        {
            let m = stored.metadata_mut();
            if m.uid.is_empty() {
                m.uid = Uuid::new_v4().to_string();
            }
            if m.creation_timestamp.is_none() {
                m.creation_timestamp = Some(Utc::now());
            }
            if m.generation == 0 {
                m.generation = 1;
            }
        }
        let (payload, value) = codec::encode(&stored)?;
        let field_values = self.field_values(&value);
        let uid = stored.metadata().uid.clone();

        let mut tx = self.begin().await?;
        // A first-time create has no current row for FOR UPDATE to lock;
        // racing creates of the same key serialize on the key itself, so the
        // loser re-reads after the winner's commit and fails AlreadyExists.
        self.lock_key_on(&mut tx, &meta.namespace, &meta.name)
            .await?;
        if let Some(current) = self
            .current_on(&mut tx, &meta.namespace, &meta.name, true)
            .await?
        {
            if !current.is_tombstone() {
                return Err(Error::AlreadyExists(
                    self.describe(&meta.namespace, &meta.name),
                ));
            }
        }
        let id = self
            .insert_on(
                &mut tx,
                &meta.name,
                &meta.namespace,
                &uid,
                None,
                Some(1),
                0,
                &payload,
                &field_values,
            )
            .await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        self.hub.broadcast(id);

        debug!(
            table = %self.ctx.table,
            namespace = %meta.namespace,
            name = %meta.name,
            id,
            "created"
        );
        codec::decode(&payload, id)
    }

    /// Returns the current live revision for the key, never a tombstone.
    pub async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        let sql = self.ctx.current(false);
        let row = self
            .db
            .fetch_optional(
                &sql,
                vec![
                    SqlParam::Text(namespace.to_string()),
                    SqlParam::Text(name.to_string()),
                ],
            )
            .await?;
        match row.as_ref().map(RevisionRow::from_any).transpose()? {
            Some(row) if !row.is_tombstone() => row.decode(),
            _ => Err(Error::NotFound(self.describe(namespace, name))),
        }
    }

    /// Replaces the object; the claimed resource version must name the
    /// current revision.
    pub async fn update(&self, obj: &K) -> Result<K> {
        let meta = obj.metadata();
        if meta.name.is_empty() {
            return Err(Error::Invalid("metadata.name is required".into()));
        }
        let claimed = parse_revision(&meta.resource_version)?;

        let mut tx = self.begin().await?;
        let current = match self
            .current_on(&mut tx, &meta.namespace, &meta.name, true)
            .await?
        {
            Some(row) if !row.is_tombstone() => row,
            _ => {
                return Err(Error::NotFound(self.describe(&meta.namespace, &meta.name)));
            }
        };
        if current.id != claimed {
            return Err(Error::Conflict(format!(
                "resourceVersion {claimed} is stale for {}: current is {}",
                self.describe(&meta.namespace, &meta.name),
                current.id
            )));
        }

        let mut stored = obj.clone();
        stored.metadata_mut().uid = current.uid.clone();
        let (payload, value) = codec::encode(&stored)?;
        let field_values = self.field_values(&value);

        let id = self
            .insert_on(
                &mut tx,
                &meta.name,
                &meta.namespace,
                &current.uid,
                Some(claimed),
                None,
                0,
                &payload,
                &field_values,
            )
            .await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        self.hub.broadcast(id);

        debug!(
            table = %self.ctx.table,
            namespace = %meta.namespace,
            name = %meta.name,
            id,
            previous = claimed,
            "updated"
        );
        codec::decode(&payload, id)
    }

    /// Inserts a tombstone and returns the pre-delete object.
    pub async fn delete(&self, namespace: &str, name: &str, opts: &DeleteOptions) -> Result<K> {
        let mut tx = self.begin().await?;
        let current = match self.current_on(&mut tx, namespace, name, true).await? {
            Some(row) if !row.is_tombstone() => row,
            _ => return Err(Error::NotFound(self.describe(namespace, name))),
        };

        if let Some(pre) = &opts.preconditions {
            if let Some(uid) = &pre.uid {
                if uid != &current.uid {
                    return Err(Error::Conflict(format!(
                        "uid precondition failed for {}: have {}, want {uid}",
                        self.describe(namespace, name),
                        current.uid
                    )));
                }
            }
            if let Some(rv) = &pre.resource_version {
                let claimed = parse_revision(rv)?;
                if claimed != current.id {
                    return Err(Error::Conflict(format!(
                        "resourceVersion {claimed} is stale for {}: current is {}",
                        self.describe(namespace, name),
                        current.id
                    )));
                }
            }
        }

        // The tombstone carries the pre-delete payload so watchers receive
        // the final object state with the DELETED event.
        let value: serde_json::Value =
            serde_json::from_str(&current.value).map_err(Error::internal)?;
        let field_values = self.field_values(&value);

        let id = self
            .insert_on(
                &mut tx,
                name,
                namespace,
                &current.uid,
                Some(current.id),
                None,
                1,
                &current.value,
                &field_values,
            )
            .await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        self.hub.broadcast(id);

        debug!(
            table = %self.ctx.table,
            namespace,
            name,
            id,
            previous = current.id,
            "deleted"
        );
        current.decode()
    }

    /// Lists current live revisions at a consistent snapshot. See the module
    /// docs for pagination semantics.
    pub async fn list(&self, namespace: &str, opts: &ListOptions) -> Result<ObjectList<K>> {
        let watermark = self.watermark().await?;

        let (snapshot, mut after) = if let Some(token) = &opts.continue_token {
            let token = ContinueToken::decode(token)?;
            if token.resource_version <= watermark {
                return Err(Error::Expired {
                    resource_version: token.resource_version,
                    watermark,
                });
            }
            (token.resource_version, Some((token.namespace, token.name)))
        } else if opts.is_fresh() {
            (self.max_id().await?, None)
        } else {
            let requested = parse_revision(&opts.resource_version)?;
            match opts.resource_version_match {
                ResourceVersionMatch::Exact => {
                    if requested <= watermark {
                        return Err(Error::Expired {
                            resource_version: requested,
                            watermark,
                        });
                    }
                    (requested, None)
                }
                // NotOlderThan (and unset) are satisfied by the newest
                // committed state.
                _ => (self.max_id().await?, None),
            }
        };

        let label = opts.label_selector.clone().unwrap_or_default();
        let field = opts.field_selector.clone().unwrap_or_default();
        let pushdown = self.pushdown(&label, &field);
        let needs_filter = !label.is_empty() || !field.is_empty();

        let limit = opts.limit.max(0);
        let target = if limit > 0 {
            limit as usize + 1
        } else {
            usize::MAX
        };
        let batch = if limit > 0 {
            (limit + 1).min(LIST_BATCH)
        } else {
            LIST_BATCH
        };

        let mut items: Vec<K> = Vec::new();
        let mut more = false;
        'pages: loop {
            let (sql, params) = self.ctx.list(&ListQuery {
                snapshot,
                namespace: namespace.to_string(),
                after: after.clone(),
                pushdown: pushdown.clone(),
                limit: batch,
            });
            let rows = self.db.fetch_all(&sql, params).await?;
            let exhausted = (rows.len() as i64) < batch;
            for raw in &rows {
                let row = RevisionRow::from_any(raw)?;
                after = Some((row.namespace.clone(), row.name.clone()));
                if needs_filter && !self.matches(&row, &label, &field)? {
                    continue;
                }
                items.push(row.decode()?);
                if items.len() >= target {
                    more = true;
                    break 'pages;
                }
            }
            if exhausted {
                break;
            }
        }

        let mut continue_token = None;
        if more {
            items.truncate(limit as usize);
            let last = items.last().expect("page has limit items");
            continue_token = Some(
                ContinueToken {
                    resource_version: snapshot,
                    namespace: last.namespace().to_string(),
                    name: last.name().to_string(),
                }
                .encode(),
            );
        }

        Ok(ObjectList {
            items,
            resource_version: snapshot.to_string(),
            continue_token,
            remaining_item_count: None,
        })
    }

    /// Streams change events for the namespace. See [`crate::watch`].
    pub async fn watch(&self, namespace: &str, opts: &ListOptions) -> Result<Watcher<K>> {
        crate::watch::start(self.clone(), namespace.to_string(), opts.clone()).await
    }

    /// Current compaction watermark for this table.
    pub async fn watermark(&self) -> Result<i64> {
        self.db.watermark(&self.ctx.table).await
    }

    /// Runs one compaction cycle immediately instead of waiting for the
    /// background interval.
    pub async fn compact(&self) -> Result<crate::compactor::CompactionOutcome> {
        crate::compactor::compact_table(&self.db, &self.ctx).await
    }

    /// Highest id ever committed to this table, 0 when empty.
    pub(crate) async fn max_id(&self) -> Result<i64> {
        let row = self
            .db
            .fetch_optional(&self.ctx.max_id(), Vec::new())
            .await?
            .ok_or_else(|| Error::internal("max id query returned no row"))?;
        row.try_get("id").map_err(Error::internal)
    }

    /// Revisions newer than `cursor`, oldest first.
    pub(crate) async fn since(
        &self,
        cursor: i64,
        namespace: &str,
        pushdown: &[(String, String)],
        limit: i64,
    ) -> Result<Vec<RevisionRow>> {
        let (sql, params) = self.ctx.since(&SinceQuery {
            cursor,
            namespace: namespace.to_string(),
            pushdown: pushdown.to_vec(),
            limit,
        });
        let rows = self.db.fetch_all(&sql, params).await?;
        rows.iter().map(RevisionRow::from_any).collect()
    }

    /// Indexed equality predicates derivable from the selectors.
    pub(crate) fn pushdown(
        &self,
        label: &LabelSelector,
        field: &FieldSelector,
    ) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (path, value) in field.equalities() {
            if let Some(col) = self.ctx.indexed_column(path) {
                out.push((col.to_string(), value.to_string()));
            }
        }
        for (key, value) in label.equalities() {
            let path = format!("metadata.labels.{key}");
            if let Some(col) = self.ctx.indexed_column(&path) {
                out.push((col.to_string(), value.to_string()));
            }
        }
        out
    }

    /// Evaluates both selectors against a row's payload.
    pub(crate) fn matches(
        &self,
        row: &RevisionRow,
        label: &LabelSelector,
        field: &FieldSelector,
    ) -> Result<bool> {
        let value: serde_json::Value =
            serde_json::from_str(&row.value).map_err(Error::internal)?;
        if !label.is_empty() {
            let labels: std::collections::BTreeMap<String, String> = value
                .get("metadata")
                .and_then(|m| m.get("labels"))
                .and_then(|l| serde_json::from_value(l.clone()).ok())
                .unwrap_or_default();
            if !label.matches(&labels) {
                return Ok(false);
            }
        }
        if !field.is_empty() && !field.matches(|path| fields::extract(&value, path)) {
            return Ok(false);
        }
        Ok(true)
    }

    fn field_values(&self, value: &serde_json::Value) -> Vec<Option<String>> {
        self.ctx
            .field_paths
            .iter()
            .map(|p| fields::extract(value, p))
            .collect()
    }

    async fn begin(&self) -> Result<Transaction<'static, Any>> {
        self.db.pool().begin().await.map_err(map_sqlx_error)
    }

    /// Takes the dialect's transaction-scoped lock on `(table, namespace,
    /// name)`. Held until the transaction commits or rolls back.
    async fn lock_key_on(
        &self,
        tx: &mut Transaction<'static, Any>,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let Some(sql) = self.db.dialect().key_lock() else {
            return Ok(());
        };
        let key = format!("{}/{namespace}/{name}", self.ctx.table);
        self.db
            .fetch_optional_on(&mut **tx, sql, vec![SqlParam::Text(key)])
            .await
            .map(|_| ())
    }

    async fn current_on(
        &self,
        tx: &mut Transaction<'static, Any>,
        namespace: &str,
        name: &str,
        lock: bool,
    ) -> Result<Option<RevisionRow>> {
        let sql = self.ctx.current(lock);
        let row = self
            .db
            .fetch_optional_on(
                &mut **tx,
                &sql,
                vec![
                    SqlParam::Text(namespace.to_string()),
                    SqlParam::Text(name.to_string()),
                ],
            )
            .await?;
        row.as_ref().map(RevisionRow::from_any).transpose()
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_on(
        &self,
        tx: &mut Transaction<'static, Any>,
        name: &str,
        namespace: &str,
        uid: &str,
        previous_id: Option<i64>,
        created: Option<i64>,
        deleted: i64,
        payload: &str,
        field_values: &[Option<String>],
    ) -> Result<i64> {
        let mut params = vec![
            SqlParam::Text(name.to_string()),
            SqlParam::Text(namespace.to_string()),
            SqlParam::Text(uid.to_string()),
            previous_id.map_or(SqlParam::Null, SqlParam::BigInt),
            created.map_or(SqlParam::Null, SqlParam::BigInt),
            SqlParam::BigInt(deleted),
            SqlParam::Text(payload.to_string()),
        ];
        for v in field_values {
            params.push(v.clone().map_or(SqlParam::Null, SqlParam::Text));
        }

        let row = self
            .db
            .fetch_optional_on(&mut **tx, &self.ctx.insert(), params)
            .await?
            .ok_or_else(|| Error::internal("insert returned no id"))?;
        row.try_get("id").map_err(Error::internal)
    }

    fn describe(&self, namespace: &str, name: &str) -> String {
        let key = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}/{name}")
        };
        format!("{} {key:?}", K::kind())
    }
}

/// Internal page size for snapshot scans and selector refills.
const LIST_BATCH: i64 = 500;

fn parse_revision(rv: &str) -> Result<i64> {
    rv.parse::<i64>()
        .map_err(|_| Error::Invalid(format!("resourceVersion {rv:?} is not a revision id")))
}
