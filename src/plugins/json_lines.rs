//! Default archive transform: newline-delimited JSON.
//!
//! Emits one chunk per record, so output is fully incremental and a
//! mid-collection failure truncates on a record boundary.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::exporter::ChunkSink;
use crate::plugins::ExportTransform;
use crate::results::ResultCollection;

/// Streams each result record as one JSON line.
#[derive(Default)]
pub struct JsonLinesTransform;

impl JsonLinesTransform {
    /// Create the transform
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExportTransform for JsonLinesTransform {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn content_type(&self) -> &str {
        "application/x-ndjson"
    }

    fn file_extension(&self) -> &str {
        "jsonl"
    }

    async fn generate(
        &self,
        collection: Arc<dyn ResultCollection>,
        _params: &HashMap<String, String>,
        sink: &mut ChunkSink,
    ) -> Result<()> {
        let mut records = collection.iterate().await?;
        while let Some(record) = records.next().await {
            let mut line = serde_json::to_vec(&record?)?;
            line.push(b'\n');
            sink.send(line).await?;
        }
        Ok(())
    }
}
