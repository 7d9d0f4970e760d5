//! Strategy Traits
//!
//! The per-verb interfaces the REST framework programs against, plus the
//! hook trait resource authors implement to customize preparation and
//! validation. A type satisfying every verb is a [`CompleteStrategy`].

use async_trait::async_trait;

use relstore_core::{DeleteOptions, ListOptions, ObjectList, Result};

use crate::scheme::Scheme;

#[async_trait]
pub trait Creater<K>: Send + Sync {
    async fn create(&self, obj: K) -> Result<K>;
}

#[async_trait]
pub trait Getter<K>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;
}

#[async_trait]
pub trait Lister<K>: Send + Sync {
    async fn list(&self, namespace: &str, opts: ListOptions) -> Result<ObjectList<K>>;
}

#[async_trait]
pub trait Updater<K>: Send + Sync {
    async fn update(&self, obj: K) -> Result<K>;
}

#[async_trait]
pub trait StatusUpdater<K>: Send + Sync {
    /// Like update, but only the status subtree of the incoming object is
    /// applied; spec and metadata stay as stored.
    async fn update_status(&self, obj: K) -> Result<K>;
}

#[async_trait]
pub trait Deleter<K>: Send + Sync {
    async fn delete(&self, namespace: &str, name: &str, opts: DeleteOptions) -> Result<K>;
}

#[async_trait]
pub trait Watcher<K>: Send + Sync {
    async fn watch(
        &self,
        namespace: &str,
        opts: ListOptions,
    ) -> Result<relstore_storage::Watcher<K>>;
}

/// The full strategy surface for one resource kind.
#[async_trait]
pub trait CompleteStrategy<K>:
    Creater<K> + Updater<K> + StatusUpdater<K> + Getter<K> + Lister<K> + Deleter<K> + Watcher<K>
{
    /// Releases background resources. Safe to call more than once.
    async fn destroy(&self);

    /// Type reflection over the registered kinds.
    fn scheme(&self) -> &Scheme;
}

/// Caller-supplied preparation and validation hooks, run by the adapter
/// around storage calls. The defaults do nothing.
pub trait ObjectStrategy<K>: Send + Sync {
    /// Runs before persisting a create, after system metadata is stamped.
    /// Conventionally clears status so clients cannot write it on create.
    fn prepare_for_create(&self, _obj: &mut K) {}

    /// Runs before persisting an update. Conventionally copies status from
    /// the stored object so spec writes cannot touch it.
    fn prepare_for_update(&self, _obj: &mut K, _old: &K) {}

    fn validate_create(&self, _obj: &K) -> Result<()> {
        Ok(())
    }

    fn validate_update(&self, _obj: &K, _old: &K) -> Result<()> {
        Ok(())
    }

    fn validate_delete(&self, _obj: &K) -> Result<()> {
        Ok(())
    }
}

/// No-op hooks for kinds without custom behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultObjectStrategy;

impl<K> ObjectStrategy<K> for DefaultObjectStrategy {}
