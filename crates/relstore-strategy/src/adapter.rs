//! Strategy Adapter
//!
//! [`StrategyAdapter`] translates the REST-framework-shaped verbs into
//! revision store calls. It owns the cross-cutting behavior every kind
//! shares: namespace scope projection, system metadata stamping, generation
//! bumping on spec changes, the status-subtree merge, and the preparation
//! and validation hook points around each write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use relstore_core::{
    DeleteOptions, Error, ListOptions, ObjectList, Result, StorageObject,
};
use relstore_storage::{Factory, RevisionStore};

use crate::scheme::Scheme;
use crate::table::{to_table, DefaultTableConvertor, Table, TableConvertor};
use crate::traits::{
    CompleteStrategy, Creater, DefaultObjectStrategy, Deleter, Getter, Lister, ObjectStrategy,
    StatusUpdater, Updater, Watcher,
};

/// The storage-backed [`CompleteStrategy`] implementation for one kind.
pub struct StrategyAdapter<K: StorageObject> {
    store: RevisionStore<K>,
    hooks: Arc<dyn ObjectStrategy<K>>,
    scheme: Arc<Scheme>,
    table: Arc<dyn TableConvertor<K>>,
    factory: Option<Arc<Factory>>,
}

impl<K: StorageObject> StrategyAdapter<K> {
    pub fn new(store: RevisionStore<K>, scheme: Arc<Scheme>) -> Self {
        Self {
            store,
            hooks: Arc::new(DefaultObjectStrategy),
            scheme,
            table: Arc::new(DefaultTableConvertor),
            factory: None,
        }
    }

    /// Installs caller-supplied preparation/validation hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn ObjectStrategy<K>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Installs a kind-specific table convertor.
    pub fn with_table_convertor(mut self, convertor: Arc<dyn TableConvertor<K>>) -> Self {
        self.table = convertor;
        self
    }

    /// Ties [`CompleteStrategy::destroy`] to the owning factory's shutdown.
    pub fn with_factory(mut self, factory: Arc<Factory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn store(&self) -> &RevisionStore<K> {
        &self.store
    }

    /// Renders a list page into human-readable table form.
    pub fn convert_to_table(&self, list: &ObjectList<K>) -> Table {
        to_table(self.table.as_ref(), &list.items)
    }

    /// Namespaced kinds require a namespace; cluster-scoped kinds reject one.
    fn check_object_scope(&self, obj: &K) -> Result<()> {
        let kind = K::kind();
        let namespace = obj.namespace();
        if kind.namespaced && namespace.is_empty() {
            return Err(Error::Invalid(format!(
                "{kind} is namespaced: metadata.namespace is required"
            )));
        }
        if !kind.namespaced && !namespace.is_empty() {
            return Err(Error::Invalid(format!(
                "{kind} is cluster-scoped: metadata.namespace must be empty"
            )));
        }
        Ok(())
    }

    fn check_key_scope(&self, namespace: &str) -> Result<()> {
        let kind = K::kind();
        if kind.namespaced && namespace.is_empty() {
            return Err(Error::Invalid(format!(
                "{kind} is namespaced: a namespace is required"
            )));
        }
        if !kind.namespaced && !namespace.is_empty() {
            return Err(Error::Invalid(format!(
                "{kind} is cluster-scoped: a namespace must not be given"
            )));
        }
        Ok(())
    }

    /// Listing scope: a namespaced kind may only be listed across namespaces
    /// when the caller asked for it explicitly.
    fn check_list_scope(&self, namespace: &str, opts: &ListOptions) -> Result<()> {
        let kind = K::kind();
        if !kind.namespaced {
            if !namespace.is_empty() {
                return Err(Error::Invalid(format!(
                    "{kind} is cluster-scoped: a namespace must not be given"
                )));
            }
            return Ok(());
        }
        if namespace.is_empty() && !opts.recursive {
            return Err(Error::Invalid(format!(
                "{kind} is namespaced: a namespace is required unless listing recursively"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<K: StorageObject> Creater<K> for StrategyAdapter<K> {
    async fn create(&self, obj: K) -> Result<K> {
        let mut obj = obj;
        self.check_object_scope(&obj)?;
        if !obj.resource_version().is_empty() {
            return Err(Error::Invalid(
                "resourceVersion must be empty on create".into(),
            ));
        }

        {
            let meta = obj.metadata_mut();
            meta.uid = Uuid::new_v4().to_string();
            meta.creation_timestamp = Some(Utc::now());
            meta.generation = 1;
        }
        self.hooks.prepare_for_create(&mut obj);
        self.hooks.validate_create(&obj)?;

        debug!(
            kind = %K::kind(),
            namespace = %obj.namespace(),
            name = %obj.name(),
            "create"
        );
        self.store.create(&obj).await
    }
}

#[async_trait]
impl<K: StorageObject> Getter<K> for StrategyAdapter<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.check_key_scope(namespace)?;
        debug!(kind = %K::kind(), namespace, name, "get");
        self.store.get(namespace, name).await
    }
}

#[async_trait]
impl<K: StorageObject> Lister<K> for StrategyAdapter<K> {
    async fn list(&self, namespace: &str, opts: ListOptions) -> Result<ObjectList<K>> {
        self.check_list_scope(namespace, &opts)?;
        debug!(
            kind = %K::kind(),
            namespace,
            resource_version = %opts.resource_version,
            resource_version_match = ?opts.resource_version_match,
            limit = opts.limit,
            continue_token = opts.continue_token.as_deref().unwrap_or(""),
            label_selector = %selector_or_empty(&opts.label_selector),
            field_selector = %selector_or_empty(&opts.field_selector),
            recursive = opts.recursive,
            "list"
        );
        self.store.list(namespace, &opts).await
    }
}

#[async_trait]
impl<K: StorageObject> Updater<K> for StrategyAdapter<K> {
    async fn update(&self, obj: K) -> Result<K> {
        let mut obj = obj;
        self.check_object_scope(&obj)?;

        let old = self.store.get(obj.namespace(), obj.name()).await?;
        {
            // System-managed fields are never client-writable.
            let (uid, created_at, generation) = {
                let m = old.metadata();
                (m.uid.clone(), m.creation_timestamp, m.generation)
            };
            let meta = obj.metadata_mut();
            meta.uid = uid;
            meta.creation_timestamp = created_at;
            meta.generation = generation;
        }
        self.hooks.prepare_for_update(&mut obj, &old);

        if spec_of(&obj)? != spec_of(&old)? {
            obj.metadata_mut().generation = old.metadata().generation + 1;
        }
        self.hooks.validate_update(&obj, &old)?;

        debug!(
            kind = %K::kind(),
            namespace = %obj.namespace(),
            name = %obj.name(),
            resource_version = %obj.resource_version(),
            "update"
        );
        self.store.update(&obj).await
    }
}

#[async_trait]
impl<K: StorageObject> StatusUpdater<K> for StrategyAdapter<K> {
    async fn update_status(&self, obj: K) -> Result<K> {
        self.check_object_scope(&obj)?;

        let old = self.store.get(obj.namespace(), obj.name()).await?;

        // Graft only the incoming status subtree onto the stored object;
        // spec and metadata stay as persisted.
        let mut merged_value = serde_json::to_value(&old)?;
        let incoming = serde_json::to_value(&obj)?;
        match incoming.get("status") {
            Some(status) => {
                merged_value["status"] = status.clone();
            }
            None => {
                if let Some(map) = merged_value.as_object_mut() {
                    map.remove("status");
                }
            }
        }
        let mut merged: K = serde_json::from_value(merged_value).map_err(Error::internal)?;
        merged.metadata_mut().resource_version = obj.resource_version().to_string();

        debug!(
            kind = %K::kind(),
            namespace = %obj.namespace(),
            name = %obj.name(),
            resource_version = %obj.resource_version(),
            "update status"
        );
        self.store.update(&merged).await
    }
}

#[async_trait]
impl<K: StorageObject> Deleter<K> for StrategyAdapter<K> {
    async fn delete(&self, namespace: &str, name: &str, opts: DeleteOptions) -> Result<K> {
        self.check_key_scope(namespace)?;
        let current = self.store.get(namespace, name).await?;
        self.hooks.validate_delete(&current)?;

        debug!(kind = %K::kind(), namespace, name, "delete");
        self.store.delete(namespace, name, &opts).await
    }
}

#[async_trait]
impl<K: StorageObject> Watcher<K> for StrategyAdapter<K> {
    async fn watch(
        &self,
        namespace: &str,
        opts: ListOptions,
    ) -> Result<relstore_storage::Watcher<K>> {
        self.check_list_scope(namespace, &opts)?;
        debug!(
            kind = %K::kind(),
            namespace,
            resource_version = %opts.resource_version,
            allow_watch_bookmarks = opts.allow_watch_bookmarks,
            send_initial_events = ?opts.send_initial_events,
            progress_notify = opts.progress_notify,
            label_selector = %selector_or_empty(&opts.label_selector),
            field_selector = %selector_or_empty(&opts.field_selector),
            "watch"
        );
        self.store.watch(namespace, &opts).await
    }
}

#[async_trait]
impl<K: StorageObject> CompleteStrategy<K> for StrategyAdapter<K> {
    async fn destroy(&self) {
        if let Some(factory) = &self.factory {
            factory.destroy().await;
        }
    }

    fn scheme(&self) -> &Scheme {
        &self.scheme
    }
}

fn spec_of<K: serde::Serialize>(obj: &K) -> Result<serde_json::Value> {
    let value = serde_json::to_value(obj)?;
    Ok(value.get("spec").cloned().unwrap_or(serde_json::Value::Null))
}

fn selector_or_empty<S: std::fmt::Display>(selector: &Option<S>) -> String {
    selector.as_ref().map(S::to_string).unwrap_or_default()
}
