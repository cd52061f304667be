//! The [`Table`] value: immutable metadata plus the storage it lives on.

use std::sync::Arc;

use crate::error::Result;
use crate::io::FileIO;
use crate::scan::TableScan;
use crate::spec::{TableMetadata, TableMetadataRef};
use crate::{Error, ErrorKind};

/// A read-only view of one table version. Cheap to clone; the metadata is
/// shared and never mutated.
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    metadata: TableMetadataRef,
    file_io: FileIO,
}

impl Table {
    pub fn new(name: impl Into<String>, metadata: TableMetadata, file_io: FileIO) -> Result<Self> {
        metadata.validate()?;
        Ok(Self {
            name: name.into(),
            metadata: Arc::new(metadata),
            file_io,
        })
    }

    /// Load a table from a metadata JSON document in storage.
    pub fn load(
        name: impl Into<String>,
        metadata_location: impl AsRef<str>,
        file_io: FileIO,
    ) -> Result<Self> {
        let bytes = file_io.new_input(metadata_location.as_ref())?.read()?;
        let json = std::str::from_utf8(&bytes).map_err(|e| {
            Error::new(ErrorKind::DataInvalid, "table metadata is not valid utf-8")
                .with_context("location", metadata_location.as_ref().to_string())
                .with_source(anyhow::Error::from(e))
        })?;
        Self::new(name, TableMetadata::parse(json)?, file_io)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &TableMetadataRef {
        &self.metadata
    }

    pub fn file_io(&self) -> &FileIO {
        &self.file_io
    }

    /// Start configuring a scan of this table.
    pub fn scan(&self) -> TableScan {
        TableScan::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{NestedField, PartitionSpec, PrimitiveType, Schema};

    #[test]
    fn load_reads_metadata_from_storage() {
        let io = FileIO::memory();
        let metadata = TableMetadata::builder()
            .location("memory://warehouse/t".to_string())
            .schemas(vec![Schema::new(
                0,
                vec![NestedField::required(1, "id", PrimitiveType::Long)],
            )])
            .current_schema_id(0)
            .partition_specs(vec![PartitionSpec::unpartitioned(0)])
            .build();
        let json = serde_json::to_vec(&metadata).unwrap();
        io.new_output("warehouse/t/metadata/v1.json")
            .unwrap()
            .write(&json)
            .unwrap();

        let table = Table::load("t", "memory://warehouse/t/metadata/v1.json", io).unwrap();
        assert_eq!(table.name(), "t");
        assert_eq!(table.metadata().as_ref(), &metadata);
        assert!(table.scan().snapshot().is_none());
    }

    #[test]
    fn invalid_metadata_is_rejected() {
        let metadata = TableMetadata::builder()
            .location("memory://warehouse/t".to_string())
            .schemas(vec![Schema::new(
                0,
                vec![NestedField::required(1, "id", PrimitiveType::Long)],
            )])
            .current_schema_id(7)
            .partition_specs(vec![PartitionSpec::unpartitioned(0)])
            .build();
        let err = Table::new("t", metadata, FileIO::memory()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInvalid);
    }
}
