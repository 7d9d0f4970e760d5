//! Relstore Strategy Layer
//!
//! The thin layer between a generic REST framework and the storage engine.
//! Each resource kind is served by a [`StrategyAdapter`] implementing the
//! per-verb traits ([`Creater`], [`Updater`], [`StatusUpdater`], [`Getter`],
//! [`Lister`], [`Deleter`], [`Watcher`]) that compose into
//! [`CompleteStrategy`]. The adapter applies namespace scope projection,
//! system metadata stamping, caller-supplied preparation and validation
//! hooks, and human-readable table rendering; everything else is delegated
//! to [`relstore_storage::RevisionStore`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relstore_storage::Factory;
//! use relstore_strategy::{Scheme, StrategyAdapter, CompleteStrategy};
//!
//! let factory = Arc::new(Factory::open("sqlite://data/relstore.db").await?);
//! let mut scheme = Scheme::new();
//! scheme.register_object::<Widget>();
//!
//! let widgets = StrategyAdapter::new(factory.store::<Widget>().await?, Arc::new(scheme))
//!     .with_hooks(Arc::new(WidgetStrategy))
//!     .with_factory(factory.clone());
//!
//! let created = widgets.create(widget).await?;
//! ```

pub mod adapter;
pub mod scheme;
pub mod table;
pub mod traits;

pub use adapter::StrategyAdapter;
pub use scheme::Scheme;
pub use table::{DefaultTableConvertor, Table, TableColumn, TableConvertor, TableRow};
pub use traits::{
    CompleteStrategy, Creater, DefaultObjectStrategy, Deleter, Getter, Lister, ObjectStrategy,
    StatusUpdater, Updater, Watcher,
};
