//! Shared fixtures for exporter and plugin tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exporter::generator::{ChunkReceiver, ChunkSink};
use crate::exporter::jobs::ExportJob;
use crate::exporter::FlowExporter;
use crate::plugins::{ExportPluginRegistry, ExportTransform};
use crate::results::{InMemoryResultStore, ResultCollection};
use crate::types::{
    ClientId, ExportJobId, ExportTarget, FlowId, RecordKind, ResourceRef, ResultRecord,
};

pub(crate) fn flow_ref() -> ResourceRef {
    ResourceRef::flow(ClientId::from("C.1"), FlowId::from("F:1"))
}

pub(crate) fn record(name: &str) -> ResultRecord {
    ResultRecord::new(name, RecordKind::File, serde_json::json!({ "path": name }))
}

/// A result store seeded with one client (C.1) and one flow (F:1) holding
/// two file records.
pub(crate) fn seeded_store() -> Arc<InMemoryResultStore> {
    let store = Arc::new(InMemoryResultStore::new());
    store.add_flow(
        ClientId::from("C.1"),
        FlowId::from("F:1"),
        RecordKind::File,
        vec![record("a.txt"), record("b.txt")],
    );
    store
}

/// A standalone sink over a generously sized channel, so transforms can be
/// driven without a concurrent reader.
pub(crate) fn test_sink(chunk_size: usize) -> (ChunkSink, ChunkReceiver, Arc<ExportJob>) {
    let job = Arc::new(ExportJob::new(
        ExportJobId::new(1),
        flow_ref(),
        "alice".to_string(),
        ExportTarget::Archive,
    ));
    let (event_tx, _) = broadcast::channel(64);
    let (tx, rx) = mpsc::channel(1024);
    let sink = ChunkSink::new(job.clone(), tx, event_tx, chunk_size);
    (sink, rx, job)
}

/// Drain a chunk channel to completion, splitting delivered chunks from a
/// trailing error.
pub(crate) async fn collect_chunks(mut rx: ChunkReceiver) -> (Vec<Vec<u8>>, Option<Error>) {
    let mut chunks = Vec::new();
    while let Some(item) = rx.recv().await {
        match item {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => return (chunks, Some(e)),
        }
    }
    (chunks, None)
}

/// An exporter over the seeded store with defaults suited to tests: one
/// approver quorum, built-in plugins, and the requester "export-robot"
/// configured as a bypass principal.
pub(crate) fn test_exporter() -> FlowExporter {
    test_exporter_with(Config::default())
}

pub(crate) fn test_exporter_with(mut config: Config) -> FlowExporter {
    config
        .approval
        .bypass_principals
        .push("export-robot".to_string());
    FlowExporter::new(config, seeded_store(), ExportPluginRegistry::with_defaults())
        .expect("test config is valid")
}

/// Grant `requester` a satisfied approval for C.1 through the normal
/// request/grant path.
pub(crate) async fn approve(exporter: &FlowExporter, requester: &str) {
    let request = exporter
        .request_approval(requester, &flow_ref(), vec!["bob".to_string()])
        .await
        .unwrap();
    exporter.grant_approval(request.id, "bob").await.unwrap();
}

/// Emits `chunks_before_failure` small chunks, then fails.
pub(crate) struct FailingTransform {
    pub(crate) chunks_before_failure: usize,
}

#[async_trait]
impl ExportTransform for FailingTransform {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _collection: Arc<dyn ResultCollection>,
        _params: &HashMap<String, String>,
        sink: &mut ChunkSink,
    ) -> Result<()> {
        for i in 0..self.chunks_before_failure {
            sink.send(format!("chunk-{i}\n").into_bytes()).await?;
        }
        Err(Error::Other("transform exploded".to_string()))
    }
}

/// Succeeds without emitting a single chunk.
pub(crate) struct SilentTransform;

#[async_trait]
impl ExportTransform for SilentTransform {
    fn name(&self) -> &str {
        "silent"
    }

    async fn generate(
        &self,
        _collection: Arc<dyn ResultCollection>,
        _params: &HashMap<String, String>,
        _sink: &mut ChunkSink,
    ) -> Result<()> {
        Ok(())
    }
}

/// A collection that fails on `iterate`, before any record is produced.
pub(crate) struct BrokenCollection;

#[async_trait]
impl ResultCollection for BrokenCollection {
    async fn count(&self) -> Result<usize> {
        Ok(1)
    }

    fn is_exportable(&self) -> bool {
        true
    }

    async fn iterate(&self) -> Result<crate::results::ResultStream> {
        Err(Error::Other("upstream storage unavailable".to_string()))
    }
}
