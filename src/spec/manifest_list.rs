use std::io::Read;

use apache_avro::{from_value, Reader as AvroReader, Schema as AvroSchema, Writer as AvroWriter};
use once_cell::sync::Lazy;
use serde_bytes::ByteBuf;
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::OutputFile;

/// Value summary for one partition column across every data file listed in a
/// manifest. Bounds use the single-value binary encoding; `None` means the
/// column has no non-null value in the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub contains_null: bool,
    pub lower_bound: Option<ByteBuf>,
    pub upper_bound: Option<ByteBuf>,
}

/// A reference to one manifest file, as stored in a snapshot's manifest list.
///
/// The partition summary is authoritative for pruning: an evaluator may only
/// skip the manifest when the summary proves no row can match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    manifest_path: String,
    manifest_length: i64,
    partition_spec_id: i32,
    partitions: Vec<FieldSummary>,
}

impl ManifestFile {
    pub fn new(
        manifest_path: impl Into<String>,
        manifest_length: i64,
        partition_spec_id: i32,
        partitions: Vec<FieldSummary>,
    ) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            manifest_length,
            partition_spec_id,
            partitions,
        }
    }

    pub fn path(&self) -> &str {
        &self.manifest_path
    }

    pub fn length(&self) -> i64 {
        self.manifest_length
    }

    pub fn partition_spec_id(&self) -> i32 {
        self.partition_spec_id
    }

    /// Per partition column summaries, in partition spec field order.
    pub fn partition_summary(&self) -> &[FieldSummary] {
        &self.partitions
    }
}

static MANIFEST_LIST_SCHEMA: Lazy<AvroSchema> = Lazy::new(|| {
    AvroSchema::parse_str(
        r#"{
        "type": "record",
        "name": "manifest_file",
        "fields": [
            {"name": "manifest_path", "type": "string"},
            {"name": "manifest_length", "type": "long"},
            {"name": "partition_spec_id", "type": "int"},
            {"name": "partitions", "type": {"type": "array", "items": {
                "type": "record",
                "name": "field_summary",
                "fields": [
                    {"name": "contains_null", "type": "boolean"},
                    {"name": "lower_bound", "type": ["null", "bytes"], "default": null},
                    {"name": "upper_bound", "type": ["null", "bytes"], "default": null}
                ]
            }}}
        ]
    }"#,
    )
    .expect("manifest list schema is valid")
});

/// Lazy reader over the manifest-file entries of one manifest list.
pub struct ManifestListReader<R: Read> {
    reader: AvroReader<'static, R>,
}

impl<R: Read> ManifestListReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            reader: AvroReader::new(reader)?,
        })
    }
}

impl<R: Read> Iterator for ManifestListReader<R> {
    type Item = Result<ManifestFile>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.reader.next()?;
        Some(
            value
                .map_err(crate::Error::from)
                .and_then(|v| from_value::<ManifestFile>(&v).map_err(crate::Error::from)),
        )
    }
}

/// Appender for a snapshot's manifest list.
pub struct ManifestListWriter {
    writer: AvroWriter<'static, Vec<u8>>,
    output: OutputFile,
}

impl ManifestListWriter {
    pub fn new(output: OutputFile) -> Self {
        Self {
            writer: AvroWriter::new(&MANIFEST_LIST_SCHEMA, Vec::new()),
            output,
        }
    }

    pub fn append(&mut self, manifest: &ManifestFile) -> Result<()> {
        self.writer.append_ser(manifest)?;
        Ok(())
    }

    /// Flush the list to storage.
    pub fn finish(self) -> Result<()> {
        let bytes = self.writer.into_inner()?;
        self.output.write(&bytes)
    }
}
