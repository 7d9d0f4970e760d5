//! Storage Factory
//!
//! A [`Factory`] scopes everything one database's stores share: the
//! connection pool, the per-table watch hubs, the compactor tasks, and the
//! shutdown signal. Nothing is process-global, so multiple factories (for
//! example one per database in tests) coexist without interference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use relstore_core::{Result, StorageObject};

use crate::compactor::{CompactionConfig, Compactor};
use crate::db::{Db, PoolConfig};
use crate::log::SqlLogConfig;
use crate::sql::TableContext;
use crate::store::RevisionStore;
use crate::watch::{WatchConfig, WatchHub};

#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    pub pool: PoolConfig,
    pub compaction: CompactionConfig,
    pub watch: WatchConfig,
    pub sql_log: SqlLogConfig,
}

pub struct Factory {
    db: Arc<Db>,
    config: FactoryConfig,
    hubs: Mutex<HashMap<String, WatchHub>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory").finish_non_exhaustive()
    }
}

impl Factory {
    /// Opens the database with default configuration. See
    /// [`crate::db::Db::connect`] for the accepted DSN formats.
    pub async fn open(dsn: &str) -> Result<Self> {
        Self::open_with(dsn, FactoryConfig::default()).await
    }

    pub async fn open_with(dsn: &str, config: FactoryConfig) -> Result<Self> {
        let db = Db::connect(dsn, config.pool.clone(), config.sql_log.clone()).await?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            db: Arc::new(db),
            config,
            hubs: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown,
        })
    }

    /// Returns the store for a kind, migrating its table on first use and
    /// starting its compactor.
    pub async fn store<K: StorageObject>(&self) -> Result<RevisionStore<K>> {
        let ctx = Arc::new(TableContext::new(K::kind(), self.db.dialect()));
        self.db.ensure_table(&ctx).await?;

        let hub = {
            let mut hubs = self.hubs.lock().expect("hub registry lock");
            match hubs.get(&ctx.table) {
                Some(hub) => hub.clone(),
                None => {
                    let hub = WatchHub::new();
                    hubs.insert(ctx.table.clone(), hub.clone());

                    let compactor = Compactor::new(
                        self.db.clone(),
                        ctx.clone(),
                        self.config.compaction.clone(),
                    );
                    let handle = compactor.start(self.shutdown.subscribe());
                    self.tasks.lock().expect("task registry lock").push(handle);
                    hub
                }
            }
        };

        Ok(RevisionStore::new(
            self.db.clone(),
            ctx,
            hub,
            self.config.watch.clone(),
            self.shutdown.subscribe(),
        ))
    }

    /// Verifies the database is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    /// Signals every watcher and compactor to stop, waits for the background
    /// tasks, and closes the pool.
    pub async fn destroy(&self) {
        let _ = self.shutdown.send(true);

        let tasks: Vec<_> = {
            let mut tasks = self.tasks.lock().expect("task registry lock");
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(%err, "background task failed during shutdown");
                }
            }
        }

        self.db.pool().close().await;
        info!("storage factory destroyed");
    }
}
