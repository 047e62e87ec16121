//! Built-in `csv-zip` plugin: results as a CSV table inside a zip archive.
//!
//! Zip central directories are written at the end of the archive, so the
//! container is built in memory first and then emitted in chunk-sized
//! pieces. Per-record data lands in the CSV as a JSON column.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::error::{Error, Result};
use crate::exporter::ChunkSink;
use crate::plugins::ExportTransform;
use crate::results::ResultCollection;

const DEFAULT_ENTRY_NAME: &str = "results.csv";

/// Packages a collection as a single-entry zip holding a CSV table.
///
/// Optional parameter `entry_name` overrides the CSV filename inside the
/// archive.
#[derive(Default)]
pub struct CsvZipTransform;

impl CsvZipTransform {
    /// Create the transform
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExportTransform for CsvZipTransform {
    fn name(&self) -> &str {
        "csv-zip"
    }

    fn content_type(&self) -> &str {
        "application/zip"
    }

    fn file_extension(&self) -> &str {
        "zip"
    }

    async fn generate(
        &self,
        collection: Arc<dyn ResultCollection>,
        params: &HashMap<String, String>,
        sink: &mut ChunkSink,
    ) -> Result<()> {
        let entry_name = params
            .get("entry_name")
            .map(String::as_str)
            .unwrap_or(DEFAULT_ENTRY_NAME);

        let mut csv = csv::Writer::from_writer(Vec::new());
        csv.write_record(["name", "kind", "data"])
            .map_err(csv_error)?;

        let mut records = collection.iterate().await?;
        while let Some(record) = records.next().await {
            let record = record?;
            let data = serde_json::to_string(&record.data)?;
            csv.write_record([record.name.as_str(), record.kind.as_str(), data.as_str()])
                .map_err(csv_error)?;
        }
        let table = csv
            .into_inner()
            .map_err(|e| Error::Other(format!("csv encoding failed: {e}")))?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(entry_name, FileOptions::default())
            .map_err(zip_error)?;
        zip.write_all(&table)?;
        let archive = zip.finish().map_err(zip_error)?.into_inner();

        let chunk_size = sink.chunk_size().max(1);
        for piece in archive.chunks(chunk_size) {
            sink.send(piece.to_vec()).await?;
        }
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::Other(format!("csv encoding failed: {e}"))
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::Other(format!("zip packaging failed: {e}"))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::test_helpers::{collect_chunks, test_sink};
    use crate::results::InMemoryCollection;
    use crate::types::{RecordKind, ResultRecord};
    use serde_json::json;
    use std::io::Read;
    use zip::ZipArchive;

    fn sample_collection() -> Arc<InMemoryCollection> {
        Arc::new(InMemoryCollection::new(
            RecordKind::File,
            vec![
                ResultRecord::new("a.txt", RecordKind::File, json!({"size": 1})),
                ResultRecord::new("b.txt", RecordKind::File, json!({"size": 2})),
            ],
        ))
    }

    async fn generate_archive(params: HashMap<String, String>) -> Vec<u8> {
        let (mut sink, rx, _job) = test_sink(64);
        CsvZipTransform::new()
            .generate(sample_collection(), &params, &mut sink)
            .await
            .unwrap();
        drop(sink);

        let (chunks, error) = collect_chunks(rx).await;
        assert!(error.is_none());
        chunks.concat()
    }

    #[tokio::test]
    async fn produces_a_readable_zip_with_a_csv_table() {
        let bytes = generate_archive(HashMap::new()).await;

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("results.csv").unwrap();
        let mut table = String::new();
        entry.read_to_string(&mut table).unwrap();

        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("name,kind,data"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("a.txt,file,"));
        assert!(first.contains("size"));
        assert!(lines.next().unwrap().starts_with("b.txt,file,"));
    }

    #[tokio::test]
    async fn entry_name_parameter_renames_the_csv() {
        let mut params = HashMap::new();
        params.insert("entry_name".to_string(), "flow.csv".to_string());
        let bytes = generate_archive(params).await;

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("flow.csv").is_ok());
    }

    #[tokio::test]
    async fn output_is_split_at_the_sink_chunk_size() {
        let collection = sample_collection();
        // chunk_size configured via test_sink is 64 bytes; a zip container
        // is always larger than that
        let (mut sink, rx, job) = test_sink(64);
        CsvZipTransform::new()
            .generate(collection, &HashMap::new(), &mut sink)
            .await
            .unwrap();
        drop(sink);

        let (chunks, _) = collect_chunks(rx).await;
        assert!(chunks.len() > 1, "container must be emitted in pieces");
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.len(), 64);
        }
        assert_eq!(job.chunks_emitted(), chunks.len() as u64);
    }
}
