//! Data sources: connection sharing and collection registration.
//!
//! A [`DataSource`] pairs a frozen [`Catalog`] with a [`Connector`]. It establishes the
//! backend lazily (or on an explicit [`DataSource::connect`]), registers bound classes with
//! the store and hands out typed [`ModelCollection`]s.
//!
//! # Concurrency
//!
//! - Every caller that needs the backend before it exists awaits the same connection
//!   attempt. A failed attempt is reported to all of them and stays failed until
//!   [`DataSource::reconnect`] is called.
//! - Registration is serialized per class. Concurrent first registrations of a class run
//!   its side effects once; later registrations return immediately. A failed registration
//!   can be retried.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel::memory::InMemoryConnector;
//!
//! let mut catalog = Catalog::new();
//! catalog.declare::<User>()?;
//!
//! let source = DataSource::new(
//!     InMemoryConnector::default(),
//!     DataSourceOptions::new().database("app"),
//!     Arc::new(catalog),
//! );
//! let users = source.collection::<User>().await?;
//! ```

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use mea::mutex::Mutex;
use std::{
    any::TypeId,
    collections::HashMap,
    fmt::{self, Debug},
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::{
    backend::{Connector, CreateCollectionOptions, Namespace, StoreBackend},
    catalog::Catalog,
    collection::ModelCollection,
    config::DataSourceOptions,
    error::{DocModelError, DocModelResult},
    model::{ClassSchema, Model, SyncStrategy},
    storage::StorageProjector,
};

type Connecting<B> = Shared<BoxFuture<'static, DocModelResult<Arc<B>>>>;

/// Entry point binding a catalog to a store.
pub struct DataSource<C: Connector> {
    connector: Arc<C>,
    options: DataSourceOptions,
    catalog: Arc<Catalog>,
    connection: Mutex<Option<Connecting<C::Backend>>>,
    registrations: Mutex<HashMap<TypeId, Arc<Mutex<bool>>>>,
}

impl<C: Connector> Debug for DataSource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("connector", &self.connector)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> DataSource<C> {
    /// Creates a data source. Nothing is connected until first use or [`Self::connect`].
    pub fn new(connector: C, options: DataSourceOptions, catalog: Arc<Catalog>) -> Self {
        Self {
            connector: Arc::new(connector),
            options,
            catalog,
            connection: Mutex::new(None),
            registrations: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn options(&self) -> &DataSourceOptions {
        &self.options
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn start(&self) -> Connecting<C::Backend> {
        let connector = Arc::clone(&self.connector);
        let options = self.options.clone();

        async move {
            let backend = connector.connect(&options).await?;
            info!(url = %redact(&options.connect_url()), "connected to document store");
            Ok(Arc::new(backend))
        }
        .boxed()
        .shared()
    }

    async fn attempt(&self, start: bool) -> DocModelResult<Arc<C::Backend>> {
        let attempt = {
            let mut slot = self.connection.lock().await;
            match slot.as_ref() {
                Some(attempt) => attempt.clone(),
                None if start => {
                    let attempt = self.start();
                    *slot = Some(attempt.clone());
                    attempt
                }
                None => return Err(DocModelError::NotConnected),
            }
        };

        attempt.await
    }

    /// Connects, or joins the connection attempt already in flight.
    ///
    /// # Errors
    ///
    /// Returns the error of the (shared) attempt; it is returned again on later calls until
    /// [`Self::reconnect`] is used.
    pub async fn connect(&self) -> DocModelResult<Arc<C::Backend>> {
        self.attempt(true).await
    }

    /// Starts a fresh connection attempt, replacing the previous one.
    pub async fn reconnect(&self) -> DocModelResult<Arc<C::Backend>> {
        let attempt = {
            let mut slot = self.connection.lock().await;
            let attempt = self.start();
            *slot = Some(attempt.clone());
            attempt
        };

        attempt.await
    }

    /// The connected backend.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::NotConnected`] when auto-connect is disabled and
    /// [`Self::connect`] has not been called.
    pub async fn backend(&self) -> DocModelResult<Arc<C::Backend>> {
        self.attempt(self.options.auto_connect).await
    }

    /// Registers `T` with the store: installs its validator and creates its indexes.
    ///
    /// Idempotent per class.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::NotACollection`] if `T` is not bound, or the backend error
    /// that interrupted registration.
    pub async fn register<T: Model>(&self) -> DocModelResult<()> {
        let class = self.catalog.collection_schema::<T>()?;
        self.register_class(class).await
    }

    /// Registers every class of the catalog that is bound to a collection.
    pub async fn register_all(&self) -> DocModelResult<()> {
        for class in self.catalog.collections() {
            self.register_class(class).await?;
        }
        Ok(())
    }

    async fn register_class(&self, class: &ClassSchema) -> DocModelResult<()> {
        let type_id = class.class.type_id();
        let gate = {
            let mut registrations = self.registrations.lock().await;
            Arc::clone(registrations.entry(type_id).or_default())
        };

        let mut registered = gate.lock().await;
        if *registered {
            return Ok(());
        }

        self.install(class).await?;
        *registered = true;

        info!(class = class.name.as_str(), "registered collection");
        Ok(())
    }

    async fn install(&self, class: &ClassSchema) -> DocModelResult<()> {
        let backend = self.backend().await?;
        let binding = class.binding()?;
        let ns = self.namespace(class)?;

        if let Some(policy) = binding.validation {
            let validator =
                StorageProjector::new(self.catalog.registry()).validator(&class.schema)?;
            let existing = backend
                .list_collections(&ns.database)
                .await?
                .into_iter()
                .find(|info| info.name == ns.collection);

            match existing {
                None => {
                    debug!(collection = %ns, "creating collection with validator");
                    backend
                        .create_collection(
                            &ns,
                            CreateCollectionOptions {
                                validator: Some(validator),
                                validation_level: Some(policy.level),
                                validation_action: Some(policy.action),
                            },
                        )
                        .await?;
                }
                Some(info) => {
                    let has_validator = info.validator.as_ref().is_some_and(|v| !v.is_empty());
                    let apply = match policy.sync {
                        SyncStrategy::Never => false,
                        SyncStrategy::IfNotExists => !has_validator,
                        SyncStrategy::Override => true,
                    };

                    if apply {
                        debug!(collection = %ns, sync = ?policy.sync, "setting validator");
                        backend
                            .set_validator(&ns, validator, policy.level, policy.action)
                            .await?;
                    }
                }
            }
        }

        if self.options.auto_index {
            for index in self.catalog.indexes_by_id(class.class.type_id()) {
                debug!(collection = %ns, keys = %index.keys(), "creating index");
                if let Err(err) = backend
                    .create_index(&ns, index.keys().clone(), index.options().clone())
                    .await
                {
                    warn!(
                        collection = %ns,
                        keys = %index.keys(),
                        error = %err,
                        "index creation failed"
                    );
                }
            }
        }

        Ok(())
    }

    /// The namespace `class` is stored in.
    pub fn namespace(&self, class: &ClassSchema) -> DocModelResult<Namespace> {
        class.namespace(self.options.default_database().as_deref())
    }

    /// A typed collection for `T`, registering `T` first if needed.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not bound, no database is configured for it, the store cannot be
    /// reached or registration fails.
    pub async fn collection<T: Model>(&self) -> DocModelResult<ModelCollection<T, C::Backend>> {
        let class = self.catalog.collection_schema::<T>()?;
        let ns = self.namespace(class)?;
        let backend = self.backend().await?;

        self.register_class(class).await?;

        Ok(ModelCollection::new(
            Arc::clone(&self.catalog),
            backend,
            ns,
            self.options.default_database(),
        ))
    }

    /// Shuts the backend down if it was connected. The next use connects again.
    ///
    /// An attempt still in flight is awaited first, so a backend it produces is shut down
    /// rather than left open. A failed attempt is discarded.
    pub async fn close(&self) -> DocModelResult<()> {
        let attempt = self.connection.lock().await.take();

        let Some(attempt) = attempt else {
            return Ok(());
        };

        match attempt.await {
            Ok(backend) => {
                backend.shutdown().await?;
                debug!("closed document store connection");
            }
            Err(err) => debug!(error = %err, "discarded failed connection attempt"),
        }
        Ok(())
    }
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}***{}", &url[..scheme + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials() {
        assert_eq!(redact("mongodb://u:p@h:1/db"), "mongodb://***@h:1/db");
        assert_eq!(redact("mongodb://h:1/db"), "mongodb://h:1/db");
    }
}
