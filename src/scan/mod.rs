//! Table scan planning: snapshot resolution, projection, manifest pruning,
//! parallel expansion, split generation and bin packing.

mod context;
mod listeners;
mod task;

pub use listeners::{register, Listener, ScanEvent};
pub use task::{CombinedScanTask, CombinedScanTasks, FileScanTask, FileScanTasks};

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::expr::Predicate;
use crate::spec::{
    Schema, SchemaRef, SnapshotRef, SCAN_PLANNING_WORKER_POOL_ENABLED,
    SCAN_PLANNING_WORKER_POOL_ENABLED_DEFAULT, SPLIT_LOOKBACK, SPLIT_LOOKBACK_DEFAULT,
    SPLIT_OPEN_FILE_COST, SPLIT_OPEN_FILE_COST_DEFAULT, SPLIT_SIZE, SPLIT_SIZE_DEFAULT,
};
use crate::table::Table;
use crate::util::{worker_pool, ParallelIterable};
use crate::{Error, ErrorKind};

use context::{ManifestTasks, PlanContext, ReaderRegistry};
use task::TaskStream;

/// An immutable scan configuration over one table.
///
/// Every refinement returns a new scan and leaves the receiver untouched, so
/// scans can be freely shared and forked. At most one of `use_snapshot` and
/// `as_of_time` may be applied; without either, the current snapshot is read.
#[derive(Clone, Debug)]
pub struct TableScan {
    table: Table,
    snapshot_id: Option<i64>,
    row_filter: Predicate,
    selected_columns: Option<Vec<String>>,
    projected_schema: Option<SchemaRef>,
    case_sensitive: bool,
}

impl TableScan {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            snapshot_id: None,
            row_filter: Predicate::AlwaysTrue,
            selected_columns: None,
            projected_schema: None,
            case_sensitive: true,
        }
    }

    /// Pin the scan to an explicit snapshot.
    pub fn use_snapshot(&self, snapshot_id: i64) -> Result<TableScan> {
        if let Some(pinned) = self.snapshot_id {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "a snapshot is already pinned for this scan",
            )
            .with_context("snapshot_id", pinned.to_string()));
        }
        if self.table.metadata().snapshot(snapshot_id).is_none() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "snapshot is not present in table metadata",
            )
            .with_context("snapshot_id", snapshot_id.to_string()));
        }
        let mut scan = self.clone();
        scan.snapshot_id = Some(snapshot_id);
        Ok(scan)
    }

    /// Pin the scan to the latest snapshot whose timestamp is at or before
    /// `timestamp_ms`. The snapshot log is ordered ascending (validated at
    /// metadata load), so equal timestamps resolve to the later log entry.
    pub fn as_of_time(&self, timestamp_ms: i64) -> Result<TableScan> {
        let mut selected = None;
        for entry in self.table.metadata().snapshot_log() {
            if entry.timestamp_ms <= timestamp_ms {
                selected = Some(entry.snapshot_id);
            }
        }
        match selected {
            Some(snapshot_id) => self.use_snapshot(snapshot_id),
            None => Err(Error::new(
                ErrorKind::InvalidArgument,
                "no snapshot is at or older than the requested timestamp",
            )
            .with_context("timestamp_ms", timestamp_ms.to_string())),
        }
    }

    /// Add a row filter; filters combine by conjunction.
    pub fn filter(&self, predicate: Predicate) -> TableScan {
        let mut scan = self.clone();
        scan.row_filter = self.row_filter.clone().and(predicate);
        scan
    }

    /// Select the columns to read by name.
    pub fn select(&self, columns: impl IntoIterator<Item = impl ToString>) -> TableScan {
        let mut scan = self.clone();
        scan.selected_columns = Some(columns.into_iter().map(|c| c.to_string()).collect());
        scan
    }

    /// Set the projected schema directly. A later `select` takes precedence.
    pub fn project(&self, schema: Schema) -> TableScan {
        let mut scan = self.clone();
        scan.projected_schema = Some(Arc::new(schema));
        scan
    }

    pub fn case_sensitive(&self, case_sensitive: bool) -> TableScan {
        let mut scan = self.clone();
        scan.case_sensitive = case_sensitive;
        scan
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn row_filter(&self) -> &Predicate {
        &self.row_filter
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// The snapshot this scan reads, if the table has one.
    pub fn snapshot(&self) -> Option<SnapshotRef> {
        match self.snapshot_id {
            Some(id) => self.table.metadata().snapshot(id).cloned(),
            None => self.table.metadata().current_snapshot().cloned(),
        }
    }

    /// The projected schema: the selected columns plus every column the row
    /// filter references, in table schema order. Resolved lazily so `select`
    /// and `case_sensitive` compose in either order.
    pub fn schema(&self) -> Result<SchemaRef> {
        let base = self.table.metadata().current_schema()?;
        let Some(columns) = &self.selected_columns else {
            return Ok(self
                .projected_schema
                .clone()
                .unwrap_or_else(|| base.clone()));
        };
        let mut ids: HashSet<i32> = if matches!(self.row_filter, Predicate::AlwaysTrue) {
            HashSet::new()
        } else {
            self.row_filter
                .bind(base, self.case_sensitive)?
                .references()
        };
        for name in columns {
            ids.insert(base.field_by_name(name, self.case_sensitive)?.id);
        }
        Ok(Arc::new(base.project(&ids)))
    }

    /// Plan the data files to read: resolve the snapshot, prune manifests by
    /// partition summary, expand survivors (in parallel when enabled) and
    /// prune entries by column statistics. Consumers relying on
    /// manifest-list order must disable the worker pool
    /// (`iceberg.scan-planning.worker-pool-enabled=false`).
    pub fn plan_files(&self) -> Result<FileScanTasks> {
        let metadata = self.table.metadata().clone();
        let Some(snapshot) = self.snapshot() else {
            return Ok(FileScanTasks::empty());
        };
        let snapshot_schema = metadata.schema_for_snapshot(&snapshot)?;
        let projection = self.schema()?;
        let bound_filter = Arc::new(self.row_filter.bind(&snapshot_schema, self.case_sensitive)?);
        let field_ids: Arc<Vec<i32>> =
            Arc::new(projection.fields().iter().map(|f| f.id).collect());

        listeners::notify_all(&ScanEvent {
            table_name: self.table.name().to_string(),
            snapshot_id: snapshot.snapshot_id(),
            filter: self.row_filter.clone(),
            projection,
        });

        let manifests = snapshot.manifests(self.table.file_io())?;
        let ctx = Arc::new(PlanContext::new(
            metadata.clone(),
            snapshot_schema,
            self.case_sensitive,
            self.row_filter.clone(),
            bound_filter,
            field_ids,
            self.table.file_io().clone(),
        ));
        let registry = Arc::new(ReaderRegistry::new());

        let mut inners = Vec::new();
        for manifest in manifests {
            let evaluator = ctx.manifest_evaluator(manifest.partition_spec_id())?;
            if !evaluator.eval(&manifest)? {
                continue;
            }
            inners.push(ManifestTasks::new(ctx.clone(), registry.clone(), manifest)?);
        }

        let parallel = metadata.property_as_bool(
            SCAN_PLANNING_WORKER_POOL_ENABLED,
            SCAN_PLANNING_WORKER_POOL_ENABLED_DEFAULT,
        )?;
        let stream = if parallel && inners.len() > 1 {
            TaskStream::Parallel(ParallelIterable::new(inners, &worker_pool()))
        } else {
            TaskStream::Sequential(Box::new(inners.into_iter().flatten()))
        };
        Ok(FileScanTasks::new(stream, registry))
    }

    /// Plan combined tasks: split planned files at the target split size and
    /// bin-pack the splits under the configured lookback, weighting small
    /// files at the open-file cost.
    pub fn plan_tasks(&self) -> Result<CombinedScanTasks> {
        let metadata = self.table.metadata();
        let split_size = metadata.property_as_long(SPLIT_SIZE, SPLIT_SIZE_DEFAULT)?;
        let lookback = metadata.property_as_int(SPLIT_LOOKBACK, SPLIT_LOOKBACK_DEFAULT)?;
        let open_file_cost =
            metadata.property_as_long(SPLIT_OPEN_FILE_COST, SPLIT_OPEN_FILE_COST_DEFAULT)?;
        if split_size <= 0 {
            return Err(Error::new(ErrorKind::DataInvalid, "split size must be positive")
                .with_context("value", split_size.to_string()));
        }
        if lookback <= 0 {
            return Err(Error::new(ErrorKind::DataInvalid, "split lookback must be positive")
                .with_context("value", lookback.to_string()));
        }
        if open_file_cost < 0 {
            return Err(Error::new(
                ErrorKind::DataInvalid,
                "open file cost must not be negative",
            )
            .with_context("value", open_file_cost.to_string()));
        }
        let files = self.plan_files()?;
        Ok(CombinedScanTasks::new(
            files,
            split_size,
            lookback as usize,
            open_file_cost,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::expr::Reference;
    use crate::io::{FileIO, FileMetadata, FileRead, FileWrite, MemoryStorage, Storage};
    use crate::spec::{
        DataFile, DataFileFormat, Literal, ManifestEntry, NestedField, PartitionField,
        PartitionSpec, PrimitiveType, Struct, Transform,
    };
    use crate::test_utils::{data_file_entry, TestTableBuilder};

    const MB: i64 = 1024 * 1024;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn unpartitioned_schema() -> Schema {
        Schema::new(
            0,
            vec![
                NestedField::required(1, "id", PrimitiveType::Long),
                NestedField::optional(2, "Name", PrimitiveType::String),
            ],
        )
    }

    fn date_partitioned_schema() -> Schema {
        Schema::new(
            0,
            vec![
                NestedField::required(1, "id", PrimitiveType::Long),
                NestedField::optional(2, "date", PrimitiveType::String),
            ],
        )
    }

    fn date_spec() -> PartitionSpec {
        PartitionSpec::new(
            0,
            vec![PartitionField::new(2, 1000, "date", Transform::Identity)],
        )
    }

    fn date_entry(path: &str, date: &str, id_bounds: (i64, i64)) -> ManifestEntry {
        ManifestEntry::builder()
            .data_file(
                DataFile::builder()
                    .file_path(path)
                    .file_format(DataFileFormat::Parquet)
                    .file_size_in_bytes(10 * MB)
                    .record_count(1000)
                    .partition(Struct::from_iter([Some(Literal::string(date))]))
                    .value_counts(Some(HashMap::from([(1, 1000)])))
                    .null_value_counts(Some(HashMap::from([(1, 0)])))
                    .lower_bounds(Some(HashMap::from([(
                        1,
                        Literal::long(id_bounds.0).to_bytes(),
                    )])))
                    .upper_bounds(Some(HashMap::from([(
                        1,
                        Literal::long(id_bounds.1).to_bytes(),
                    )])))
                    .build(),
            )
            .build()
    }

    fn task_paths(tasks: FileScanTasks) -> Vec<String> {
        let mut paths: Vec<String> = tasks
            .map(|t| t.map(|t| t.data_file_path))
            .collect::<Result<_>>()
            .unwrap();
        paths.sort();
        paths
    }

    /// Storage wrapper that tracks reader opens and releases.
    #[derive(Debug, Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        open_readers: Arc<AtomicUsize>,
        opened_paths: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Debug)]
    struct CountingRead {
        inner: Box<dyn FileRead>,
        open_readers: Arc<AtomicUsize>,
    }

    impl Read for CountingRead {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl FileRead for CountingRead {}

    impl Drop for CountingRead {
        fn drop(&mut self) {
            self.open_readers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Storage for CountingStorage {
        fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path)
        }

        fn metadata(&self, path: &str) -> Result<FileMetadata> {
            self.inner.metadata(path)
        }

        fn reader(&self, path: &str) -> Result<Box<dyn FileRead>> {
            let inner = self.inner.reader(path)?;
            self.open_readers.fetch_add(1, Ordering::SeqCst);
            self.opened_paths.lock().unwrap().push(path.to_string());
            Ok(Box::new(CountingRead {
                inner,
                open_readers: self.open_readers.clone(),
            }))
        }

        fn writer(&self, path: &str) -> Result<Box<dyn FileWrite>> {
            self.inner.writer(path)
        }

        fn scheme(&self) -> &str {
            "memory"
        }
    }

    #[test]
    fn empty_table_plans_nothing() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .build()
            .unwrap();
        assert_eq!(table.scan().plan_files().unwrap().count(), 0);
        assert_eq!(table.scan().plan_tasks().unwrap().count(), 0);
    }

    #[test]
    fn single_manifest_splits_and_packs() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .with_property(SPLIT_SIZE, (128 * MB).to_string())
            .with_property(SPLIT_OPEN_FILE_COST, (4 * MB).to_string())
            .add_snapshot(
                1000,
                vec![vec![data_file_entry(
                    "data/big.parquet",
                    200 * MB,
                    1_000_000,
                    Struct::empty(),
                )]],
            )
            .unwrap()
            .build()
            .unwrap();

        let tasks: Vec<CombinedScanTask> = table
            .scan()
            .plan_tasks()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tasks.len(), 2);

        let total: i64 = tasks
            .iter()
            .flat_map(|t| t.files())
            .map(|split| split.length)
            .sum();
        assert_eq!(total, 200 * MB);

        let first_weight: i64 = tasks[0]
            .files()
            .iter()
            .map(|split| split.length.max(4 * MB))
            .sum();
        assert!(first_weight >= 100 * MB);
    }

    #[test]
    fn partition_summary_prunes_manifests() {
        let storage = CountingStorage::default();
        let opened_paths = storage.opened_paths.clone();
        let table = TestTableBuilder::new(date_partitioned_schema(), date_spec())
            .with_file_io(FileIO::new(Arc::new(storage)))
            .add_snapshot(
                1000,
                vec![
                    vec![
                        date_entry("data/dec-1.parquet", "2023-12-01", (1, 100)),
                        date_entry("data/dec-2.parquet", "2023-12-15", (101, 200)),
                    ],
                    vec![
                        date_entry("data/jan-1.parquet", "2024-01-01", (201, 300)),
                        date_entry("data/jan-2.parquet", "2024-01-02", (301, 400)),
                    ],
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let scan = table
            .scan()
            .filter(Reference::new("date").equal_to(Literal::string("2024-01-01")));
        let paths = task_paths(scan.plan_files().unwrap());
        assert_eq!(paths, vec!["data/jan-1.parquet"]);

        // the december manifest was never opened
        let opened = opened_paths.lock().unwrap();
        assert!(!opened.iter().any(|p| p.contains("1-m0.avro")));
    }

    #[test]
    fn time_travel_resolves_from_the_snapshot_log() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .add_snapshot(1000, vec![vec![]])
            .unwrap()
            .add_snapshot(2000, vec![vec![]])
            .unwrap()
            .add_snapshot(3000, vec![vec![]])
            .unwrap()
            .build()
            .unwrap();

        let scan = table.scan();
        assert_eq!(
            scan.as_of_time(2500).unwrap().snapshot().unwrap().snapshot_id(),
            2
        );
        assert_eq!(
            scan.as_of_time(3000).unwrap().snapshot().unwrap().snapshot_id(),
            3
        );
        let err = scan.as_of_time(999).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // the original scan is unchanged and still reads the current snapshot
        assert_eq!(scan.snapshot().unwrap().snapshot_id(), 3);
    }

    #[test]
    fn snapshot_can_only_be_pinned_once() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .add_snapshot(1000, vec![vec![]])
            .unwrap()
            .build()
            .unwrap();

        let pinned = table.scan().use_snapshot(1).unwrap();
        assert_eq!(
            pinned.use_snapshot(1).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            pinned.as_of_time(5000).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            table.scan().use_snapshot(42).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn case_insensitive_projection() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .add_snapshot(
                1000,
                vec![vec![data_file_entry(
                    "data/a.parquet",
                    MB,
                    10,
                    Struct::empty(),
                )]],
            )
            .unwrap()
            .build()
            .unwrap();

        let insensitive = table.scan().select(["name"]).case_sensitive(false);
        let projected = insensitive.schema().unwrap();
        assert_eq!(projected.fields().len(), 1);
        assert_eq!(projected.fields()[0].id, 2);

        let tasks: Vec<FileScanTask> = insensitive
            .plan_files()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tasks[0].project_field_ids, vec![2]);

        let sensitive = table.scan().select(["name"]).case_sensitive(true);
        assert_eq!(sensitive.schema().unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(
            sensitive.plan_files().unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn refinements_compose_in_any_order() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .add_snapshot(
                1000,
                vec![vec![data_file_entry(
                    "data/a.parquet",
                    MB,
                    10,
                    Struct::empty(),
                )]],
            )
            .unwrap()
            .build()
            .unwrap();

        let a = table.scan().select(["name"]).case_sensitive(false);
        let b = table.scan().case_sensitive(false).select(["name"]);
        assert_eq!(a.schema().unwrap(), b.schema().unwrap());
        assert_eq!(
            task_paths(a.plan_files().unwrap()),
            task_paths(b.plan_files().unwrap())
        );
    }

    #[test]
    fn projection_includes_filter_references() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .build()
            .unwrap();

        let scan = table
            .scan()
            .select(["Name"])
            .filter(Reference::new("id").greater_than(Literal::long(5)));
        let projected = scan.schema().unwrap();
        let ids: Vec<i32> = projected.fields().iter().map(|f| f.id).collect();
        // table schema order, filter reference included
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn filter_conjunction_matches_chained_filters() {
        let table = TestTableBuilder::new(date_partitioned_schema(), date_spec())
            .add_snapshot(
                1000,
                vec![
                    vec![date_entry("data/a.parquet", "2024-01-01", (1, 100))],
                    vec![date_entry("data/b.parquet", "2024-01-02", (101, 200))],
                    vec![date_entry("data/c.parquet", "2024-01-01", (201, 300))],
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let e1 = Reference::new("date").equal_to(Literal::string("2024-01-01"));
        let e2 = Reference::new("id").less_than(Literal::long(150));

        let chained = table.scan().filter(e1.clone()).filter(e2.clone());
        let combined = table.scan().filter(e1.and(e2));
        assert_eq!(
            task_paths(chained.plan_files().unwrap()),
            task_paths(combined.plan_files().unwrap())
        );
        assert_eq!(
            task_paths(chained.plan_files().unwrap()),
            vec!["data/a.parquet"]
        );
    }

    #[test]
    fn residual_travels_with_the_task() {
        let table = TestTableBuilder::new(date_partitioned_schema(), date_spec())
            .add_snapshot(
                1000,
                vec![vec![date_entry("data/a.parquet", "2024-01-01", (1, 100))]],
            )
            .unwrap()
            .build()
            .unwrap();

        let scan = table.scan().filter(
            Reference::new("date")
                .equal_to(Literal::string("2024-01-01"))
                .and(Reference::new("id").less_than(Literal::long(10))),
        );
        let tasks: Vec<FileScanTask> = scan
            .plan_files()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tasks.len(), 1);
        // the partition resolved the date conjunct; only the id predicate remains
        assert_eq!(
            tasks[0].residual,
            Reference::new("id").less_than(Literal::long(10))
        );
    }

    #[test]
    fn sequential_planning_preserves_manifest_order() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .with_property(SCAN_PLANNING_WORKER_POOL_ENABLED, "false")
            .add_snapshot(
                1000,
                vec![
                    vec![data_file_entry("data/m0-a.parquet", MB, 1, Struct::empty())],
                    vec![data_file_entry("data/m1-a.parquet", MB, 1, Struct::empty())],
                    vec![data_file_entry("data/m2-a.parquet", MB, 1, Struct::empty())],
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let paths: Vec<String> = table
            .scan()
            .plan_files()
            .unwrap()
            .map(|t| t.map(|t| t.data_file_path))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            paths,
            vec!["data/m0-a.parquet", "data/m1-a.parquet", "data/m2-a.parquet"]
        );
    }

    #[test]
    fn parallel_plan_closes_all_readers_on_early_close() {
        init_logging();
        let storage = CountingStorage::default();
        let open_readers = storage.open_readers.clone();
        let mut builder = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .with_file_io(FileIO::new(Arc::new(storage)));

        let manifests: Vec<Vec<ManifestEntry>> = (0..20)
            .map(|m| {
                (0..5)
                    .map(|f| {
                        data_file_entry(
                            format!("data/m{m}-f{f}.parquet"),
                            MB,
                            10,
                            Struct::empty(),
                        )
                    })
                    .collect()
            })
            .collect();
        builder = builder.add_snapshot(1000, manifests).unwrap();
        let table = builder.build().unwrap();

        let mut tasks = table.scan().plan_files().unwrap();
        for _ in 0..3 {
            tasks.next().unwrap().unwrap();
        }
        tasks.close().unwrap();
        tasks.close().unwrap();
        assert!(tasks.next().is_none());

        // a worker may still be mid-open when close returns; it closes the
        // late reader itself, so wait for the count to settle
        for _ in 0..500 {
            if open_readers.load(Ordering::SeqCst) == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(open_readers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn full_consumption_closes_all_readers() {
        init_logging();
        let storage = CountingStorage::default();
        let open_readers = storage.open_readers.clone();
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .with_file_io(FileIO::new(Arc::new(storage)))
            .add_snapshot(
                1000,
                (0..8)
                    .map(|m| {
                        vec![data_file_entry(
                            format!("data/m{m}.parquet"),
                            MB,
                            10,
                            Struct::empty(),
                        )]
                    })
                    .collect(),
            )
            .unwrap()
            .build()
            .unwrap();

        let tasks: Vec<FileScanTask> = table
            .scan()
            .plan_files()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tasks.len(), 8);
        assert_eq!(open_readers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_length_file_is_still_planned() {
        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .add_snapshot(
                1000,
                vec![vec![data_file_entry("data/empty.parquet", 0, 1, Struct::empty())]],
            )
            .unwrap()
            .build()
            .unwrap();

        let tasks: Vec<CombinedScanTask> = table
            .scan()
            .plan_tasks()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].files().len(), 1);
        assert_eq!(tasks[0].files()[0].length, 0);
    }

    #[test]
    fn combined_task_json_is_self_contained() {
        let table = TestTableBuilder::new(date_partitioned_schema(), date_spec())
            .add_snapshot(
                1000,
                vec![vec![date_entry("data/a.parquet", "2024-01-01", (1, 100))]],
            )
            .unwrap()
            .build()
            .unwrap();

        let tasks: Vec<CombinedScanTask> = table
            .scan()
            .filter(Reference::new("id").less_than(Literal::long(10)))
            .plan_tasks()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let json = serde_json::to_string(&tasks[0]).unwrap();
        let parsed: CombinedScanTask = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tasks[0]);

        let task = &parsed.files()[0];
        assert_eq!(task.schema.fields().len(), 2);
        assert_eq!(task.partition_spec.fields().len(), 1);
        assert_eq!(
            task.residual,
            Reference::new("id").less_than(Literal::long(10))
        );
    }

    #[test]
    fn scan_event_is_emitted_before_planning() {
        struct Capture(Mutex<Vec<i64>>);
        impl Listener for Capture {
            fn notify(&self, event: &ScanEvent) {
                self.0.lock().unwrap().push(event.snapshot_id);
            }
        }

        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        register(capture.clone());

        let table = TestTableBuilder::new(unpartitioned_schema(), PartitionSpec::unpartitioned(0))
            .add_snapshot(1000, vec![vec![]])
            .unwrap()
            .build()
            .unwrap();
        table.scan().plan_files().unwrap().count();

        assert!(capture.0.lock().unwrap().contains(&1));
    }
}
