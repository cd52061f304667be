//! Helpers for building small in-memory tables in tests.

use std::collections::HashMap;

use crate::error::Result;
use crate::io::FileIO;
use crate::spec::{
    DataFile, DataFileFormat, ManifestEntry, ManifestListWriter, ManifestWriter, PartitionSpec,
    Schema, Snapshot, SnapshotLog, Struct, TableMetadata,
};
use crate::table::Table;

/// Builds a table in memory, one snapshot at a time. Snapshot ids are
/// assigned sequentially starting at 1.
pub struct TestTableBuilder {
    name: String,
    location: String,
    file_io: FileIO,
    schema: Schema,
    spec: PartitionSpec,
    properties: HashMap<String, String>,
    snapshots: Vec<Snapshot>,
    snapshot_log: Vec<SnapshotLog>,
    current_snapshot_id: Option<i64>,
    next_snapshot_id: i64,
}

impl TestTableBuilder {
    pub fn new(schema: Schema, spec: PartitionSpec) -> Self {
        Self {
            name: "test".to_string(),
            location: "memory://warehouse/test".to_string(),
            file_io: FileIO::memory(),
            schema,
            spec,
            properties: HashMap::new(),
            snapshots: Vec::new(),
            snapshot_log: Vec::new(),
            current_snapshot_id: None,
            next_snapshot_id: 1,
        }
    }

    /// Replace the storage backing the table, e.g. with an instrumented one.
    pub fn with_file_io(mut self, file_io: FileIO) -> Self {
        self.file_io = file_io;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn file_io(&self) -> &FileIO {
        &self.file_io
    }

    /// Write one snapshot. Each inner `Vec<ManifestEntry>` becomes one
    /// manifest file; the snapshot becomes the current one.
    pub fn add_snapshot(
        mut self,
        timestamp_ms: i64,
        manifests: Vec<Vec<ManifestEntry>>,
    ) -> Result<Self> {
        let snapshot_id = self.next_snapshot_id;
        self.next_snapshot_id += 1;

        let partition_type = self.spec.partition_type(&self.schema)?;
        let list_path = format!("{}/metadata/snap-{snapshot_id}.avro", self.location);
        let mut list_writer = ManifestListWriter::new(self.file_io.new_output(&list_path)?);
        for (index, entries) in manifests.into_iter().enumerate() {
            let manifest_path =
                format!("{}/metadata/{snapshot_id}-m{index}.avro", self.location);
            let mut writer = ManifestWriter::new(
                self.file_io.new_output(&manifest_path)?,
                self.spec.spec_id(),
                partition_type.clone(),
            );
            for entry in entries {
                writer.append(entry)?;
            }
            list_writer.append(&writer.finish()?)?;
        }
        list_writer.finish()?;

        self.snapshots.push(
            Snapshot::builder()
                .snapshot_id(snapshot_id)
                .timestamp_ms(timestamp_ms)
                .manifest_list(list_path)
                .build(),
        );
        self.snapshot_log.push(SnapshotLog {
            timestamp_ms,
            snapshot_id,
        });
        self.current_snapshot_id = Some(snapshot_id);
        Ok(self)
    }

    pub fn build(self) -> Result<Table> {
        let current_schema_id = self.schema.schema_id();
        let default_spec_id = self.spec.spec_id();
        let metadata = TableMetadata::builder()
            .location(self.location)
            .schemas(vec![self.schema])
            .current_schema_id(current_schema_id)
            .partition_specs(vec![self.spec])
            .default_spec_id(default_spec_id)
            .properties(self.properties)
            .current_snapshot_id(self.current_snapshot_id)
            .snapshots(self.snapshots)
            .snapshot_log(self.snapshot_log)
            .build();
        Table::new(self.name, metadata, self.file_io)
    }
}

/// A plain data-file entry without column statistics.
pub fn data_file_entry(
    path: impl Into<String>,
    file_size_in_bytes: i64,
    record_count: i64,
    partition: Struct,
) -> ManifestEntry {
    ManifestEntry::builder()
        .data_file(
            DataFile::builder()
                .file_path(path.into())
                .file_format(DataFileFormat::Parquet)
                .file_size_in_bytes(file_size_in_bytes)
                .record_count(record_count)
                .partition(partition)
                .build(),
        )
        .build()
}
