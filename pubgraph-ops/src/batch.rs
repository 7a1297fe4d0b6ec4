//! Batch coordinator.
//!
//! Prepares many independent mutations concurrently, then executes all of
//! them in one transaction. Edges added by one item are visible to orphan
//! cleanup triggered by another, and one failing item rolls back all.

use crate::builder::Mutation;
use crate::config::EngineConfig;
use crate::error::{OpsError, OpsResult};
use crate::executor::{ExecutionReport, execute_mutations};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use pubgraph_storage::PubStore;
use pubgraph_types::PubId;
use std::future::Future;
use tracing::{debug, info};

/// Collects batch items and executes them together.
///
/// ```no_run
/// # use pubgraph_ops::{Batch, Mutation};
/// # use pubgraph_storage::PubStore;
/// # use pubgraph_types::{CommunityId, PubTypeId};
/// # async fn run(store: PubStore, community: CommunityId, kind: PubTypeId) {
/// let ids = Batch::new(&store)
///     .concurrency(4)
///     .add(move || async move {
///         let mut m = Mutation::new(community);
///         m.create(kind).set("title", "Hello");
///         Ok(m)
///     })
///     .execute()
///     .await
///     .unwrap();
/// # }
/// ```
pub struct Batch<'s> {
    store: &'s PubStore,
    concurrency: usize,
    items: Vec<BoxFuture<'s, OpsResult<Mutation>>>,
}

impl<'s> Batch<'s> {
    pub fn new(store: &'s PubStore) -> Self {
        Self::with_config(store, &EngineConfig::default())
    }

    pub fn with_config(store: &'s PubStore, config: &EngineConfig) -> Self {
        Self {
            store,
            concurrency: config.batch_concurrency.max(1),
            items: Vec::new(),
        }
    }

    /// Bounds how many items are prepared at once.
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Adds an item whose mutation is produced by an async factory.
    ///
    /// The factory runs during [`Batch::execute`], not here.
    pub fn add<F, Fut>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 's,
        Fut: Future<Output = OpsResult<Mutation>> + Send + 's,
    {
        self.items.push(Box::pin(async move { factory().await }));
        self
    }

    /// Adds an already built mutation.
    pub fn add_mutation(self, mutation: Mutation) -> Self {
        self.add(move || async move { Ok(mutation) })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Prepares every item, then executes them in one transaction.
    /// Returns the root Pub ids in the order items were added.
    pub async fn execute(self) -> OpsResult<Vec<PubId>> {
        Ok(self.execute_report().await?.roots)
    }

    /// Like [`Batch::execute`], returning the full report.
    pub async fn execute_report(self) -> OpsResult<ExecutionReport> {
        let Batch {
            store,
            concurrency,
            items,
        } = self;
        let total = items.len();
        debug!("Preparing {total} batch items, {concurrency} at a time");

        let mutations: Vec<Mutation> = stream::iter(items)
            .buffered(concurrency)
            .try_collect()
            .await?;
        info!("Prepared {total} batch items");

        let store = store.clone();
        tokio::task::spawn_blocking(move || execute_mutations(&store, mutations))
            .await
            .map_err(|e| OpsError::Join(e.to_string()))?
    }
}
