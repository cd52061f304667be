use std::collections::HashMap;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::Result;
use crate::io::is_truthy;
use crate::{Error, ErrorKind};

use super::{PartitionSpec, PartitionSpecRef, Schema, SchemaRef, Snapshot, SnapshotLog, SnapshotRef};

/// Target weight of a split and of a packed bin, in bytes.
pub const SPLIT_SIZE: &str = "read.split.target-size";
pub const SPLIT_SIZE_DEFAULT: i64 = 128 * 1024 * 1024;

/// How many bins the packer keeps open while combining splits.
pub const SPLIT_LOOKBACK: &str = "read.split.planning-lookback";
pub const SPLIT_LOOKBACK_DEFAULT: i32 = 10;

/// Floor weight applied to small files so tiny inputs are not over-packed.
pub const SPLIT_OPEN_FILE_COST: &str = "read.split.open-file-cost";
pub const SPLIT_OPEN_FILE_COST_DEFAULT: i64 = 4 * 1024 * 1024;

/// Whether manifests are expanded on the shared worker pool.
pub const SCAN_PLANNING_WORKER_POOL_ENABLED: &str = "iceberg.scan-planning.worker-pool-enabled";
pub const SCAN_PLANNING_WORKER_POOL_ENABLED_DEFAULT: bool = true;

/// The immutable metadata document describing one version of a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    #[builder(default = 2)]
    format_version: u8,
    #[builder(default_code = "Uuid::new_v4()")]
    table_uuid: Uuid,
    location: String,
    #[builder(default)]
    last_updated_ms: i64,
    #[builder(setter(transform = |s: Vec<Schema>| s.into_iter().map(Arc::new).collect()))]
    schemas: Vec<SchemaRef>,
    current_schema_id: i32,
    #[builder(default, setter(transform = |s: Vec<PartitionSpec>| s.into_iter().map(Arc::new).collect()))]
    partition_specs: Vec<PartitionSpecRef>,
    #[builder(default)]
    default_spec_id: i32,
    #[serde(default)]
    #[builder(default)]
    properties: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    current_snapshot_id: Option<i64>,
    #[serde(default)]
    #[builder(default, setter(transform = |s: Vec<Snapshot>| s.into_iter().map(Arc::new).collect()))]
    snapshots: Vec<SnapshotRef>,
    #[serde(default)]
    #[builder(default)]
    snapshot_log: Vec<SnapshotLog>,
}

pub type TableMetadataRef = Arc<TableMetadata>;

impl TableMetadata {
    /// Parse a metadata JSON document and validate its internal references.
    pub fn parse(json: &str) -> Result<TableMetadata> {
        let metadata: TableMetadata = serde_json::from_str(json)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check internal references and the snapshot-log precondition.
    pub fn validate(&self) -> Result<()> {
        self.current_schema()?;
        self.default_spec()?;
        if let Some(id) = self.current_snapshot_id {
            if self.snapshot(id).is_none() {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    "current snapshot id is not in the snapshot list",
                )
                .with_context("snapshot_id", id.to_string()));
            }
        }
        // Time travel relies on a timestamp-ordered log.
        for window in self.snapshot_log.windows(2) {
            if window[1].timestamp_ms < window[0].timestamp_ms {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    "snapshot log is not ordered by timestamp",
                ));
            }
        }
        Ok(())
    }

    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    pub fn table_uuid(&self) -> Uuid {
        self.table_uuid
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    pub fn schemas(&self) -> &[SchemaRef] {
        &self.schemas
    }

    pub fn schema_by_id(&self, schema_id: i32) -> Option<&SchemaRef> {
        self.schemas.iter().find(|s| s.schema_id() == schema_id)
    }

    pub fn current_schema(&self) -> Result<&SchemaRef> {
        self.schema_by_id(self.current_schema_id).ok_or_else(|| {
            Error::new(ErrorKind::DataInvalid, "current schema id is not in the schema list")
                .with_context("schema_id", self.current_schema_id.to_string())
        })
    }

    /// The schema the snapshot was written with, falling back to the current
    /// schema when the snapshot does not carry a schema id.
    pub fn schema_for_snapshot(&self, snapshot: &Snapshot) -> Result<SchemaRef> {
        if let Some(schema) = snapshot.schema_id().and_then(|id| self.schema_by_id(id)) {
            return Ok(schema.clone());
        }
        self.current_schema().cloned()
    }

    pub fn partition_specs(&self) -> &[PartitionSpecRef] {
        &self.partition_specs
    }

    pub fn spec(&self, spec_id: i32) -> Option<&PartitionSpecRef> {
        self.partition_specs.iter().find(|s| s.spec_id() == spec_id)
    }

    pub fn default_spec(&self) -> Result<&PartitionSpecRef> {
        self.spec(self.default_spec_id).ok_or_else(|| {
            Error::new(ErrorKind::DataInvalid, "default spec id is not in the spec list")
                .with_context("spec_id", self.default_spec_id.to_string())
        })
    }

    pub fn snapshots(&self) -> &[SnapshotRef] {
        &self.snapshots
    }

    pub fn snapshot(&self, snapshot_id: i64) -> Option<&SnapshotRef> {
        self.snapshots.iter().find(|s| s.snapshot_id() == snapshot_id)
    }

    pub fn current_snapshot(&self) -> Option<&SnapshotRef> {
        self.current_snapshot_id.and_then(|id| self.snapshot(id))
    }

    /// Time-ordered `(timestamp, snapshot_id)` entries, oldest first.
    pub fn snapshot_log(&self) -> &[SnapshotLog] {
        &self.snapshot_log
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn property_as_long(&self, key: &str, default: i64) -> Result<i64> {
        match self.properties.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e| {
                Error::new(ErrorKind::DataInvalid, "table property is not a valid long")
                    .with_context("key", key.to_string())
                    .with_context("value", value.clone())
                    .with_source(anyhow::Error::from(e))
            }),
        }
    }

    pub fn property_as_int(&self, key: &str, default: i32) -> Result<i32> {
        match self.properties.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e| {
                Error::new(ErrorKind::DataInvalid, "table property is not a valid int")
                    .with_context("key", key.to_string())
                    .with_context("value", value.clone())
                    .with_source(anyhow::Error::from(e))
            }),
        }
    }

    pub fn property_as_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.properties.get(key) {
            None => Ok(default),
            Some(value) if is_truthy(value) => Ok(true),
            Some(value)
                if ["false", "f", "0", "off"].contains(&value.to_lowercase().as_str()) =>
            {
                Ok(false)
            }
            Some(value) => Err(Error::new(
                ErrorKind::DataInvalid,
                "table property is not a valid bool",
            )
            .with_context("key", key.to_string())
            .with_context("value", value.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{NestedField, PartitionSpec, PrimitiveType};

    fn metadata() -> TableMetadata {
        TableMetadata::builder()
            .location("memory://warehouse/t".to_string())
            .schemas(vec![Schema::new(
                0,
                vec![NestedField::required(1, "id", PrimitiveType::Long)],
            )])
            .current_schema_id(0)
            .partition_specs(vec![PartitionSpec::unpartitioned(0)])
            .properties(HashMap::from([
                (SPLIT_SIZE.to_string(), "1024".to_string()),
                (SPLIT_LOOKBACK.to_string(), "nope".to_string()),
                ("custom.flag".to_string(), "off".to_string()),
            ]))
            .build()
    }

    #[test]
    fn property_parsing() {
        let metadata = metadata();
        assert_eq!(metadata.property_as_long(SPLIT_SIZE, 7).unwrap(), 1024);
        assert_eq!(
            metadata
                .property_as_long(SPLIT_OPEN_FILE_COST, SPLIT_OPEN_FILE_COST_DEFAULT)
                .unwrap(),
            SPLIT_OPEN_FILE_COST_DEFAULT
        );
        assert!(!metadata.property_as_bool("custom.flag", true).unwrap());
        let err = metadata.property_as_int(SPLIT_LOOKBACK, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInvalid);
    }

    #[test]
    fn out_of_order_snapshot_log_is_rejected() {
        let mut metadata = metadata();
        metadata.snapshot_log = vec![
            SnapshotLog {
                timestamp_ms: 2000,
                snapshot_id: 1,
            },
            SnapshotLog {
                timestamp_ms: 1000,
                snapshot_id: 2,
            },
        ];
        let err = metadata.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInvalid);
    }

    #[test]
    fn metadata_json_roundtrip() {
        let metadata = metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed = TableMetadata::parse(&json).unwrap();
        assert_eq!(parsed, metadata);
    }
}
