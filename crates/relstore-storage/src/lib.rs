//! Relstore Storage Engine
//!
//! SQL-backed storage offering Kubernetes-style CRUD+Watch semantics.
//! Every revision of every object is an immutable row; the database-assigned
//! row id is the resource version, the monotonic stream watchers follow, and
//! the snapshot anchor paginated lists pin to. PostgreSQL is the production
//! target; SQLite serves development and tests. Because all authoritative
//! state (including the revision stream) lives in SQL, API servers sharing
//! one database are stateless.
//!
//! ## Components
//!
//! - [`sql`]: per-resource SQL template registry rendered per dialect
//! - [`db`]: connection pool, ping, serialized additive migrations
//! - [`store`]: the revision store (create/get/list/update/delete/watch)
//! - [`watch`]: per-table watch hub and watcher sessions
//! - [`compactor`]: background reclamation of superseded revisions
//! - [`factory`]: scopes pool, hubs, and compactors per database
//!
//! ## Example
//!
//! ```ignore
//! use relstore_storage::Factory;
//!
//! let factory = Factory::open("sqlite://data/relstore.db").await?;
//! let widgets = factory.store::<Widget>().await?;
//!
//! let created = widgets.create(&widget).await?;
//! let mut watcher = widgets.watch("default", &Default::default()).await?;
//! while let Some(event) = watcher.recv().await {
//!     println!("{} {:?}", event.type_str(), event.object());
//! }
//! ```

pub mod compactor;
pub mod db;
pub mod dialect;
pub mod factory;
pub mod log;
pub mod sql;
pub mod store;
pub mod watch;

pub use compactor::{CompactionConfig, CompactionOutcome};
pub use db::{Db, PoolConfig};
pub use dialect::Dialect;
pub use factory::{Factory, FactoryConfig};
pub use log::SqlLogConfig;
pub use store::RevisionStore;
pub use watch::{WatchConfig, Watcher};
