//! Result collections and the task-execution-engine seam
//!
//! The engine that actually runs flows and produces [`ResultRecord`]s is an
//! external collaborator. The export core only reads its output through the
//! [`ResultStore`] and [`ResultCollection`] traits; an in-memory
//! implementation is provided for embedding and tests.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::types::{ClientId, FlowId, RecordKind, ResourceRef, ResultRecord};

/// Lazy, finite sequence of result records. Not restartable mid-job.
pub type ResultStream = BoxStream<'static, Result<ResultRecord>>;

/// Read-only, ordered view over the result records belonging to one flow.
///
/// Iteration order is stable for the lifetime of a generation job even if
/// new records are appended concurrently by the producer: `iterate` takes a
/// snapshot of the records present when it is called.
#[async_trait]
pub trait ResultCollection: Send + Sync {
    /// Number of records currently in the collection.
    ///
    /// May block on upstream I/O from the task-execution engine.
    async fn count(&self) -> Result<usize>;

    /// Whether the collection's record type can be packaged into an export.
    fn is_exportable(&self) -> bool;

    /// Iterate the records in collection order.
    ///
    /// The returned stream is finite and not restartable; producing each
    /// item may suspend on upstream I/O.
    async fn iterate(&self) -> Result<ResultStream>;
}

impl std::fmt::Debug for dyn ResultCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCollection").finish_non_exhaustive()
    }
}

/// Lookup seam into the task-execution engine's stored results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Whether the referenced resource (client, and flow if given) exists.
    async fn resource_exists(&self, resource: &ResourceRef) -> Result<bool>;

    /// The result collection for one flow.
    ///
    /// Fails with [`Error::InvalidResource`] when the client or flow is
    /// unknown.
    async fn flow_results(&self, resource: &ResourceRef) -> Result<Arc<dyn ResultCollection>>;
}

/// In-memory result collection.
///
/// One flow's records, all of one [`RecordKind`]. The producing side may
/// keep appending while an export is streaming; exports only ever see the
/// records present when their iteration started.
pub struct InMemoryCollection {
    kind: RecordKind,
    records: RwLock<Vec<ResultRecord>>,
}

impl InMemoryCollection {
    /// Create a collection holding records of one kind
    pub fn new(kind: RecordKind, records: Vec<ResultRecord>) -> Self {
        Self {
            kind,
            records: RwLock::new(records),
        }
    }

    /// Append a record (producer side)
    pub fn append(&self, record: ResultRecord) {
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }

    fn snapshot(&self) -> Vec<ResultRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResultCollection for InMemoryCollection {
    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map(|r| r.len()).unwrap_or(0))
    }

    fn is_exportable(&self) -> bool {
        self.kind.is_exportable()
    }

    async fn iterate(&self) -> Result<ResultStream> {
        // Snapshot taken here; concurrent appends are invisible to this job
        let records = self.snapshot();
        Ok(futures::stream::iter(records.into_iter().map(Ok)).boxed())
    }
}

/// In-memory result store keyed by client and flow.
///
/// Suitable for embedding the exporter without a real task-execution
/// engine, and for tests.
#[derive(Default)]
pub struct InMemoryResultStore {
    clients: RwLock<HashMap<ClientId, HashMap<FlowId, Arc<InMemoryCollection>>>>,
}

impl InMemoryResultStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client with no flows yet
    pub fn add_client(&self, client: ClientId) {
        if let Ok(mut clients) = self.clients.write() {
            clients.entry(client).or_default();
        }
    }

    /// Register a flow's results, returning the collection so the producer
    /// can keep appending to it.
    pub fn add_flow(
        &self,
        client: ClientId,
        flow: FlowId,
        kind: RecordKind,
        records: Vec<ResultRecord>,
    ) -> Arc<InMemoryCollection> {
        let collection = Arc::new(InMemoryCollection::new(kind, records));
        if let Ok(mut clients) = self.clients.write() {
            clients
                .entry(client)
                .or_default()
                .insert(flow, collection.clone());
        }
        collection
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn resource_exists(&self, resource: &ResourceRef) -> Result<bool> {
        let clients = self
            .clients
            .read()
            .map_err(|_| Error::Other("result store lock poisoned".to_string()))?;
        Ok(match (&resource.flow, clients.get(&resource.client)) {
            (None, found) => found.is_some(),
            (Some(flow), Some(flows)) => flows.contains_key(flow),
            (Some(_), None) => false,
        })
    }

    async fn flow_results(&self, resource: &ResourceRef) -> Result<Arc<dyn ResultCollection>> {
        let clients = self
            .clients
            .read()
            .map_err(|_| Error::Other("result store lock poisoned".to_string()))?;
        let flows = clients
            .get(&resource.client)
            .ok_or_else(|| Error::InvalidResource(resource.to_string()))?;
        let flow = resource
            .flow
            .as_ref()
            .ok_or_else(|| Error::InvalidResource(resource.to_string()))?;
        let collection = flows
            .get(flow)
            .ok_or_else(|| Error::InvalidResource(resource.to_string()))?;
        Ok(collection.clone() as Arc<dyn ResultCollection>)
    }
}
