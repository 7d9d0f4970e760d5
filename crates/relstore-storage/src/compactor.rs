//! Background Revision Compaction
//!
//! One compactor runs per table, reclaiming superseded revisions so the log
//! does not grow without bound. Each cycle runs in a single transaction:
//!
//! 1. Find the watermark candidate: the highest id among revisions that have
//!    a successor (a row whose `previous_id` points at them).
//! 2. Delete every superseded revision at or below the watermark.
//! 3. Upsert the watermark row so resuming clients get a clean `Expired`
//!    instead of a silent gap.
//!
//! The current revision of every live object has no successor and is never
//! touched; neither is the newest tombstone of a chain, so a client that
//! deletes and then watches from a stale revision either sees the tombstone
//! or a well-defined `Expired`. The watermark never decreases.
//!
//! Compaction failures are logged and never surfaced to clients; a failed
//! cycle just defers reclamation to the next one.

use std::sync::Arc;
use std::time::Duration;

use sqlx::Row;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use relstore_core::{Error, Result};

use crate::db::{map_sqlx_error, Db};
use crate::sql::{SqlParam, TableContext};

#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// How often each table is compacted.
    pub interval: Duration,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        let secs = std::env::var("RELSTORE_COMPACTION_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(15 * 60);

        Self {
            interval: Duration::from_secs(secs),
        }
    }
}

/// Result of one compaction cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionOutcome {
    pub watermark: i64,
    pub rows_deleted: u64,
}

/// Background compaction task for one table.
pub struct Compactor {
    db: Arc<Db>,
    ctx: Arc<TableContext>,
    cfg: CompactionConfig,
}

impl Compactor {
    pub(crate) fn new(db: Arc<Db>, ctx: Arc<TableContext>, cfg: CompactionConfig) -> Self {
        Self { db, ctx, cfg }
    }

    pub(crate) fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.cfg.interval, self.cfg.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(
                table = %self.ctx.table,
                interval = ?self.cfg.interval,
                "compactor started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match compact_table(&self.db, &self.ctx).await {
                            Ok(outcome) if outcome.rows_deleted > 0 => {
                                info!(
                                    table = %self.ctx.table,
                                    watermark = outcome.watermark,
                                    rows_deleted = outcome.rows_deleted,
                                    "compacted"
                                );
                            }
                            Ok(_) => {}
                            Err(err) => {
                                error!(table = %self.ctx.table, %err, "compaction cycle failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!(table = %self.ctx.table, "compactor shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Runs one compaction cycle for the table.
pub(crate) async fn compact_table(db: &Db, ctx: &TableContext) -> Result<CompactionOutcome> {
    let previous = db.watermark(&ctx.table).await?;

    let mut tx = db.pool().begin().await.map_err(map_sqlx_error)?;

    let candidate = db
        .fetch_optional_on(&mut *tx, &ctx.watermark_candidate(), Vec::new())
        .await?
        .map(|row| row.try_get::<Option<i64>, _>("id"))
        .transpose()
        .map_err(Error::internal)?
        .flatten();

    let Some(candidate) = candidate else {
        // Nothing superseded yet.
        return Ok(CompactionOutcome {
            watermark: previous,
            rows_deleted: 0,
        });
    };

    let watermark = candidate.max(previous);
    let rows_deleted = db
        .execute_on(
            &mut *tx,
            &ctx.compaction_delete(),
            vec![SqlParam::BigInt(watermark)],
        )
        .await?;
    db.set_watermark_on(&mut *tx, &ctx.table, watermark).await?;
    tx.commit().await.map_err(map_sqlx_error)?;

    Ok(CompactionOutcome {
        watermark,
        rows_deleted,
    })
}
