use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use apache_avro::{from_value, Reader as AvroReader, Schema as AvroSchema, Writer as AvroWriter};
use once_cell::sync::Lazy;
use serde_bytes::ByteBuf;
use serde_derive::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::Result;
use crate::expr::visitors::inclusive_metrics_evaluator::InclusiveMetricsEvaluator;
use crate::expr::Predicate;
use crate::io::{FileRead, InputFile, OutputFile};
use crate::{Error, ErrorKind};

use super::{FieldSummary, Literal, ManifestFile, PartitionSpec, SchemaRef, Struct, StructType};

/// Physical format of a data file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataFileFormat {
    Avro,
    Orc,
    Parquet,
}

impl fmt::Display for DataFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFileFormat::Avro => f.write_str("AVRO"),
            DataFileFormat::Orc => f.write_str("ORC"),
            DataFileFormat::Parquet => f.write_str("PARQUET"),
        }
    }
}

impl FromStr for DataFileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "AVRO" => Ok(DataFileFormat::Avro),
            "ORC" => Ok(DataFileFormat::Orc),
            "PARQUET" => Ok(DataFileFormat::Parquet),
            _ => Err(Error::new(ErrorKind::DataInvalid, "unknown data file format")
                .with_context("format", s.to_string())),
        }
    }
}

/// Whether a manifest entry is live or logically removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestStatus {
    Existing,
    Added,
    Deleted,
}

impl ManifestStatus {
    fn to_i32(self) -> i32 {
        match self {
            ManifestStatus::Existing => 0,
            ManifestStatus::Added => 1,
            ManifestStatus::Deleted => 2,
        }
    }

    fn try_from_i32(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ManifestStatus::Existing),
            1 => Ok(ManifestStatus::Added),
            2 => Ok(ManifestStatus::Deleted),
            _ => Err(Error::new(ErrorKind::DataInvalid, "unknown manifest entry status")
                .with_context("status", value.to_string())),
        }
    }
}

/// One immutable data file with its partition tuple and column statistics.
///
/// Bounds use the single-value binary encoding and are keyed by field id;
/// all statistics are optional.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct DataFile {
    #[builder(setter(into))]
    file_path: String,
    file_format: DataFileFormat,
    file_size_in_bytes: i64,
    record_count: i64,
    #[builder(default = Struct::empty())]
    partition: Struct,
    #[builder(default)]
    value_counts: Option<HashMap<i32, i64>>,
    #[builder(default)]
    null_value_counts: Option<HashMap<i32, i64>>,
    #[builder(default)]
    lower_bounds: Option<HashMap<i32, Vec<u8>>>,
    #[builder(default)]
    upper_bounds: Option<HashMap<i32, Vec<u8>>>,
}

impl DataFile {
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn file_format(&self) -> DataFileFormat {
        self.file_format
    }

    pub fn file_size_in_bytes(&self) -> i64 {
        self.file_size_in_bytes
    }

    pub fn record_count(&self) -> i64 {
        self.record_count
    }

    pub fn partition(&self) -> &Struct {
        &self.partition
    }

    pub fn value_count(&self, field_id: i32) -> Option<i64> {
        self.value_counts.as_ref()?.get(&field_id).copied()
    }

    pub fn null_value_count(&self, field_id: i32) -> Option<i64> {
        self.null_value_counts.as_ref()?.get(&field_id).copied()
    }

    pub fn lower_bound(&self, field_id: i32) -> Option<&[u8]> {
        self.lower_bounds.as_ref()?.get(&field_id).map(|b| b.as_slice())
    }

    pub fn upper_bound(&self, field_id: i32) -> Option<&[u8]> {
        self.upper_bounds.as_ref()?.get(&field_id).map(|b| b.as_slice())
    }
}

/// A data file entry in a manifest.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct ManifestEntry {
    #[builder(default = ManifestStatus::Added)]
    status: ManifestStatus,
    #[builder(default)]
    snapshot_id: Option<i64>,
    data_file: DataFile,
}

impl ManifestEntry {
    pub fn status(&self) -> ManifestStatus {
        self.status
    }

    pub fn snapshot_id(&self) -> Option<i64> {
        self.snapshot_id
    }

    pub fn data_file(&self) -> &DataFile {
        &self.data_file
    }

    pub fn file_path(&self) -> &str {
        self.data_file.file_path()
    }
}

/// Names of the optional statistics columns a [`ManifestReader`] can project.
pub const STATS_COLUMNS: [&str; 4] = [
    "value_counts",
    "null_value_counts",
    "lower_bounds",
    "upper_bounds",
];

mod _serde {
    use super::*;

    #[derive(Serialize, Deserialize)]
    pub(super) struct I64Entry {
        key: i32,
        value: i64,
    }

    #[derive(Serialize, Deserialize)]
    pub(super) struct BytesEntry {
        key: i32,
        value: ByteBuf,
    }

    fn to_i64_entries(map: &HashMap<i32, i64>) -> Vec<I64Entry> {
        let mut entries: Vec<I64Entry> = map
            .iter()
            .map(|(&key, &value)| I64Entry { key, value })
            .collect();
        entries.sort_by_key(|e| e.key);
        entries
    }

    fn to_bytes_entries(map: &HashMap<i32, Vec<u8>>) -> Vec<BytesEntry> {
        let mut entries: Vec<BytesEntry> = map
            .iter()
            .map(|(&key, value)| BytesEntry {
                key,
                value: ByteBuf::from(value.clone()),
            })
            .collect();
        entries.sort_by_key(|e| e.key);
        entries
    }

    #[derive(Serialize, Deserialize)]
    pub(super) struct AvroDataFile {
        file_path: String,
        file_format: String,
        file_size_in_bytes: i64,
        record_count: i64,
        partition: Vec<Option<ByteBuf>>,
        value_counts: Option<Vec<I64Entry>>,
        null_value_counts: Option<Vec<I64Entry>>,
        lower_bounds: Option<Vec<BytesEntry>>,
        upper_bounds: Option<Vec<BytesEntry>>,
    }

    #[derive(Serialize, Deserialize)]
    pub(super) struct AvroManifestEntry {
        status: i32,
        snapshot_id: Option<i64>,
        data_file: AvroDataFile,
    }

    impl AvroManifestEntry {
        pub(super) fn try_from_entry(entry: &ManifestEntry) -> Result<Self> {
            let data_file = &entry.data_file;
            Ok(AvroManifestEntry {
                status: entry.status.to_i32(),
                snapshot_id: entry.snapshot_id,
                data_file: AvroDataFile {
                    file_path: data_file.file_path.clone(),
                    file_format: data_file.file_format.to_string(),
                    file_size_in_bytes: data_file.file_size_in_bytes,
                    record_count: data_file.record_count,
                    partition: data_file
                        .partition
                        .fields()
                        .iter()
                        .map(|value| value.as_ref().map(|v| ByteBuf::from(v.to_bytes())))
                        .collect(),
                    value_counts: data_file.value_counts.as_ref().map(to_i64_entries),
                    null_value_counts: data_file.null_value_counts.as_ref().map(to_i64_entries),
                    lower_bounds: data_file.lower_bounds.as_ref().map(to_bytes_entries),
                    upper_bounds: data_file.upper_bounds.as_ref().map(to_bytes_entries),
                },
            })
        }

        pub(super) fn try_into_entry(self, partition_type: &StructType) -> Result<ManifestEntry> {
            let data_file = self.data_file;
            if data_file.partition.len() != partition_type.fields().len() {
                return Err(Error::new(
                    ErrorKind::DataInvalid,
                    "partition tuple length does not match the partition spec",
                )
                .with_context("file_path", data_file.file_path.clone())
                .with_context("len", data_file.partition.len().to_string()));
            }
            let partition: Struct = data_file
                .partition
                .iter()
                .zip(partition_type.fields())
                .map(|(value, field)| {
                    value
                        .as_ref()
                        .map(|bytes| Literal::try_from_bytes(bytes, &field.field_type))
                        .transpose()
                })
                .collect::<Result<_>>()?;
            Ok(ManifestEntry {
                status: ManifestStatus::try_from_i32(self.status)?,
                snapshot_id: self.snapshot_id,
                data_file: DataFile {
                    file_path: data_file.file_path,
                    file_format: data_file.file_format.parse()?,
                    file_size_in_bytes: data_file.file_size_in_bytes,
                    record_count: data_file.record_count,
                    partition,
                    value_counts: data_file
                        .value_counts
                        .map(|v| v.into_iter().map(|e| (e.key, e.value)).collect()),
                    null_value_counts: data_file
                        .null_value_counts
                        .map(|v| v.into_iter().map(|e| (e.key, e.value)).collect()),
                    lower_bounds: data_file
                        .lower_bounds
                        .map(|v| v.into_iter().map(|e| (e.key, e.value.into_vec())).collect()),
                    upper_bounds: data_file
                        .upper_bounds
                        .map(|v| v.into_iter().map(|e| (e.key, e.value.into_vec())).collect()),
                },
            })
        }
    }
}

static MANIFEST_SCHEMA: Lazy<AvroSchema> = Lazy::new(|| {
    AvroSchema::parse_str(
        r#"{
        "type": "record",
        "name": "manifest_entry",
        "fields": [
            {"name": "status", "type": "int"},
            {"name": "snapshot_id", "type": ["null", "long"], "default": null},
            {"name": "data_file", "type": {
                "type": "record",
                "name": "data_file",
                "fields": [
                    {"name": "file_path", "type": "string"},
                    {"name": "file_format", "type": "string"},
                    {"name": "file_size_in_bytes", "type": "long"},
                    {"name": "record_count", "type": "long"},
                    {"name": "partition", "type": {"type": "array", "items": ["null", "bytes"]}},
                    {"name": "value_counts", "type": ["null", {"type": "array", "items": {
                        "type": "record",
                        "name": "i64_entry",
                        "fields": [
                            {"name": "key", "type": "int"},
                            {"name": "value", "type": "long"}
                        ]
                    }}], "default": null},
                    {"name": "null_value_counts", "type": ["null", {"type": "array", "items": "i64_entry"}], "default": null},
                    {"name": "lower_bounds", "type": ["null", {"type": "array", "items": {
                        "type": "record",
                        "name": "bytes_entry",
                        "fields": [
                            {"name": "key", "type": "int"},
                            {"name": "value", "type": "bytes"}
                        ]
                    }}], "default": null},
                    {"name": "upper_bounds", "type": ["null", {"type": "array", "items": "bytes_entry"}], "default": null}
                ]
            }}
        ]
    }"#,
    )
    .expect("manifest schema is valid")
});

/// Lazy, closeable reader over the live data-file entries of one manifest.
///
/// Refinements follow the builder style: `case_sensitive` must be set before
/// `filter_rows` takes effect, matching how the planner wires them.
pub struct ManifestReader {
    reader: Option<AvroReader<'static, Box<dyn FileRead>>>,
    schema: SchemaRef,
    partition_type: StructType,
    case_sensitive: bool,
    row_filter: Option<Predicate>,
    metrics_evaluator: Option<InclusiveMetricsEvaluator>,
    selected: Option<HashSet<String>>,
}

impl ManifestReader {
    /// Open a manifest for reading. `schema` is the scan schema and `spec`
    /// the partition spec the manifest was written under.
    pub fn read(input: InputFile, schema: SchemaRef, spec: &PartitionSpec) -> Result<Self> {
        let partition_type = spec.partition_type(&schema)?;
        let reader = AvroReader::new(input.reader()?)?;
        Ok(Self {
            reader: Some(reader),
            schema,
            partition_type,
            case_sensitive: true,
            row_filter: None,
            metrics_evaluator: None,
            selected: None,
        })
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Keep only entries whose statistics admit rows matching `filter`.
    /// Repeated calls combine filters by conjunction.
    pub fn filter_rows(mut self, filter: Predicate) -> Self {
        self.row_filter = Some(match self.row_filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Restrict decoded statistics to the named columns. Path, size, record
    /// count and partition are always decoded.
    pub fn select(mut self, columns: impl IntoIterator<Item = impl ToString>) -> Self {
        self.selected = Some(columns.into_iter().map(|c| c.to_string()).collect());
        self
    }

    /// Release the underlying file. Subsequent calls are no-ops; subsequent
    /// `next` calls return `None`.
    pub fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }

    fn metrics_evaluator(&mut self) -> Result<Option<&InclusiveMetricsEvaluator>> {
        if self.metrics_evaluator.is_none() {
            if let Some(filter) = &self.row_filter {
                let bound = filter.bind(&self.schema, self.case_sensitive)?;
                self.metrics_evaluator = Some(InclusiveMetricsEvaluator::new(bound));
            }
        }
        Ok(self.metrics_evaluator.as_ref())
    }

    fn apply_select(&self, mut entry: ManifestEntry) -> ManifestEntry {
        if let Some(selected) = &self.selected {
            if !selected.contains("value_counts") {
                entry.data_file.value_counts = None;
            }
            if !selected.contains("null_value_counts") {
                entry.data_file.null_value_counts = None;
            }
            if !selected.contains("lower_bounds") {
                entry.data_file.lower_bounds = None;
            }
            if !selected.contains("upper_bounds") {
                entry.data_file.upper_bounds = None;
            }
        }
        entry
    }
}

impl Iterator for ManifestReader {
    type Item = Result<ManifestEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let value = match self.reader.as_mut()?.next()? {
                Ok(value) => value,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e.into()));
                }
            };
            let entry = from_value::<_serde::AvroManifestEntry>(&value)
                .map_err(Error::from)
                .and_then(|avro| avro.try_into_entry(&self.partition_type));
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e));
                }
            };
            if entry.status() == ManifestStatus::Deleted {
                continue;
            }
            let matches = match self.metrics_evaluator() {
                Ok(Some(evaluator)) => evaluator.eval(entry.data_file()),
                Ok(None) => Ok(true),
                Err(e) => Err(e),
            };
            match matches {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e));
                }
            }
            return Some(Ok(self.apply_select(entry)));
        }
    }
}

struct FieldStats {
    contains_null: bool,
    lower: Option<Literal>,
    upper: Option<Literal>,
}

/// Appender for one manifest file. Tracks the partition value summary that is
/// published on the returned [`ManifestFile`].
pub struct ManifestWriter {
    writer: AvroWriter<'static, Vec<u8>>,
    output: OutputFile,
    partition_spec_id: i32,
    partition_type: StructType,
    stats: Vec<FieldStats>,
}

impl ManifestWriter {
    pub fn new(output: OutputFile, spec_id: i32, partition_type: StructType) -> Self {
        let stats = partition_type
            .fields()
            .iter()
            .map(|_| FieldStats {
                contains_null: false,
                lower: None,
                upper: None,
            })
            .collect();
        Self {
            writer: AvroWriter::new(&MANIFEST_SCHEMA, Vec::new()),
            output,
            partition_spec_id: spec_id,
            partition_type,
            stats,
        }
    }

    pub fn append(&mut self, entry: ManifestEntry) -> Result<()> {
        let partition = entry.data_file().partition();
        if partition.len() != self.partition_type.fields().len() {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                "partition tuple length does not match the partition spec",
            )
            .with_context("file_path", entry.file_path().to_string()));
        }
        for (stats, value) in self.stats.iter_mut().zip(partition.fields()) {
            match value {
                None => stats.contains_null = true,
                Some(value) => {
                    if stats.lower.as_ref().is_none_or(|lower| value < lower) {
                        stats.lower = Some(value.clone());
                    }
                    if stats.upper.as_ref().is_none_or(|upper| value > upper) {
                        stats.upper = Some(value.clone());
                    }
                }
            }
        }
        let avro = _serde::AvroManifestEntry::try_from_entry(&entry)?;
        self.writer.append_ser(&avro)?;
        Ok(())
    }

    /// Flush the manifest to storage and return its manifest-list record.
    pub fn finish(self) -> Result<ManifestFile> {
        let bytes = self.writer.into_inner()?;
        self.output.write(&bytes)?;
        let partitions = self
            .stats
            .into_iter()
            .map(|stats| FieldSummary {
                contains_null: stats.contains_null,
                lower_bound: stats.lower.map(|l| ByteBuf::from(l.to_bytes())),
                upper_bound: stats.upper.map(|u| ByteBuf::from(u.to_bytes())),
            })
            .collect();
        Ok(ManifestFile::new(
            self.output.location(),
            bytes.len() as i64,
            self.partition_spec_id,
            partitions,
        ))
    }
}
