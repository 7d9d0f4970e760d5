//! Relstore Core Types
//!
//! This crate defines the vocabulary shared by the relstore storage engine and
//! its strategy layer: versioned objects, metadata, selectors, list options,
//! watch events, and the error taxonomy.
//!
//! ## What Is Relstore?
//!
//! Relstore offers Kubernetes-style CRUD+Watch semantics over a relational
//! database (PostgreSQL in production, SQLite for development). Objects are
//! identified by `(group, version, kind, namespace, name)`; every mutation is
//! persisted as an immutable revision row whose database-assigned id doubles
//! as the object's resource version. All authoritative state lives in SQL, so
//! API servers sharing one database are stateless and horizontally scalable.
//!
//! ## Crate Layout
//!
//! - [`meta`]: `ObjectMeta`, the [`Object`] trait, and `ObjectList`
//! - [`kind`]: static `ResourceKind` descriptors and identifier sanitizing
//! - [`selector`]: label and field selector parsing + matching
//! - [`options`]: `ListOptions`, delete preconditions, continue tokens
//! - [`event`]: the typed watch event stream vocabulary
//! - [`fields`]: dotted-path extraction of indexed field values
//! - [`codec`]: JSON payload encoding with resource-version handling
//! - [`error`]: the stable error taxonomy shared by all backends

pub mod codec;
pub mod error;
pub mod event;
pub mod fields;
pub mod kind;
pub mod meta;
pub mod options;
pub mod selector;

pub use error::{Error, Result};
pub use event::WatchEvent;
pub use kind::ResourceKind;
pub use meta::{Object, ObjectList, ObjectMeta, StorageObject};
pub use options::{ContinueToken, DeleteOptions, ListOptions, Preconditions, ResourceVersionMatch};
pub use selector::{FieldSelector, LabelSelector};
