use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::Result;
use crate::io::FileIO;

use super::{ManifestFile, ManifestListReader};

/// The operation that produced a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Append,
    Replace,
    Overwrite,
    Delete,
}

/// Snapshot summary: the producing operation plus free-form properties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub operation: Operation,
    #[serde(flatten)]
    pub other: HashMap<String, String>,
}

/// An immutable, point-in-time view of the table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    snapshot_id: i64,
    timestamp_ms: i64,
    /// Location of this snapshot's manifest list file.
    manifest_list: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    schema_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    summary: Option<Summary>,
}

pub type SnapshotRef = Arc<Snapshot>;

impl Snapshot {
    pub fn snapshot_id(&self) -> i64 {
        self.snapshot_id
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn manifest_list(&self) -> &str {
        &self.manifest_list
    }

    pub fn schema_id(&self) -> Option<i32> {
        self.schema_id
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Load the manifest files of this snapshot from its manifest list.
    pub fn manifests(&self, file_io: &FileIO) -> Result<Vec<ManifestFile>> {
        let input = file_io.new_input(&self.manifest_list)?;
        ManifestListReader::new(input.reader()?)?.try_collect()
    }
}

/// One entry of the table's time-ordered snapshot log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotLog {
    pub timestamp_ms: i64,
    pub snapshot_id: i64,
}
