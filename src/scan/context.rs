use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::expr::visitors::inclusive_projection::InclusiveProjection;
use crate::expr::visitors::manifest_evaluator::ManifestEvaluator;
use crate::expr::visitors::residual_evaluator::ResidualEvaluator;
use crate::expr::{BoundPredicate, Predicate};
use crate::io::FileIO;
use crate::spec::{
    ManifestFile, ManifestReader, PartitionSpecRef, Schema, SchemaRef, TableMetadataRef,
    STATS_COLUMNS,
};
use crate::{Error, ErrorKind};

use super::task::FileScanTask;

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The close-list: every manifest reader opened for one `plan_files` call.
/// Workers register readers concurrently; the consumer closes them all once.
pub(crate) struct ReaderRegistry {
    readers: Mutex<Vec<Arc<Mutex<ManifestReader>>>>,
    closed: AtomicBool,
}

impl ReaderRegistry {
    pub(crate) fn new() -> Self {
        Self {
            readers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Take ownership of an opened reader. Returns `None` when the registry
    /// was already closed: the reader is closed on the spot and planning for
    /// it must stop.
    pub(crate) fn register(&self, reader: ManifestReader) -> Option<Arc<Mutex<ManifestReader>>> {
        let handle = Arc::new(Mutex::new(reader));
        {
            let mut readers = lock_ignoring_poison(&self.readers);
            if !self.closed.load(Ordering::Acquire) {
                readers.push(handle.clone());
                return Some(handle);
            }
        }
        // Lost the race against close_all.
        let _ = lock_ignoring_poison(&handle).close();
        None
    }

    /// Close every registered reader in registration order, exactly once.
    /// The first error is returned, later ones are logged.
    pub(crate) fn close_all(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let readers = std::mem::take(&mut *lock_ignoring_poison(&self.readers));
        let mut first_err = None;
        for handle in readers {
            if let Err(e) = lock_ignoring_poison(&handle).close() {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    log::warn!("error closing manifest reader: {e}");
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Per-scan memo of manifest evaluators keyed by partition spec id.
/// Construction is idempotent, so a duplicate build under contention is fine.
struct ManifestEvaluatorCache {
    inner: Mutex<HashMap<i32, Arc<ManifestEvaluator>>>,
}

impl ManifestEvaluatorCache {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn get(
        &self,
        spec_id: i32,
        build: impl FnOnce() -> Result<ManifestEvaluator>,
    ) -> Result<Arc<ManifestEvaluator>> {
        if let Some(evaluator) = lock_ignoring_poison(&self.inner).get(&spec_id) {
            return Ok(evaluator.clone());
        }
        let evaluator = Arc::new(build()?);
        Ok(lock_ignoring_poison(&self.inner)
            .entry(spec_id)
            .or_insert(evaluator)
            .clone())
    }
}

struct ResidualEvaluatorCache {
    inner: Mutex<HashMap<i32, Arc<ResidualEvaluator>>>,
}

impl ResidualEvaluatorCache {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, spec_id: i32, spec: &PartitionSpecRef) -> Arc<ResidualEvaluator> {
        if let Some(evaluator) = lock_ignoring_poison(&self.inner).get(&spec_id) {
            return evaluator.clone();
        }
        let evaluator = Arc::new(ResidualEvaluator::new(spec.clone()));
        lock_ignoring_poison(&self.inner)
            .entry(spec_id)
            .or_insert(evaluator)
            .clone()
    }
}

/// Everything one `plan_files` call shares across manifests and workers.
pub(crate) struct PlanContext {
    pub(crate) table_metadata: TableMetadataRef,
    pub(crate) snapshot_schema: SchemaRef,
    pub(crate) case_sensitive: bool,
    pub(crate) row_filter: Predicate,
    pub(crate) bound_filter: Arc<BoundPredicate>,
    pub(crate) field_ids: Arc<Vec<i32>>,
    pub(crate) file_io: FileIO,
    manifest_evaluators: ManifestEvaluatorCache,
    residual_evaluators: ResidualEvaluatorCache,
}

impl PlanContext {
    pub(crate) fn new(
        table_metadata: TableMetadataRef,
        snapshot_schema: SchemaRef,
        case_sensitive: bool,
        row_filter: Predicate,
        bound_filter: Arc<BoundPredicate>,
        field_ids: Arc<Vec<i32>>,
        file_io: FileIO,
    ) -> Self {
        Self {
            table_metadata,
            snapshot_schema,
            case_sensitive,
            row_filter,
            bound_filter,
            field_ids,
            file_io,
            manifest_evaluators: ManifestEvaluatorCache::new(),
            residual_evaluators: ResidualEvaluatorCache::new(),
        }
    }

    pub(crate) fn spec(&self, spec_id: i32) -> Result<PartitionSpecRef> {
        self.table_metadata
            .spec(spec_id)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::DataInvalid,
                    "manifest references a partition spec missing from table metadata",
                )
                .with_context("spec_id", spec_id.to_string())
            })
    }

    /// The cached manifest evaluator for one partition spec: the row filter
    /// projected into partition space and bound against the partition type.
    pub(crate) fn manifest_evaluator(&self, spec_id: i32) -> Result<Arc<ManifestEvaluator>> {
        self.manifest_evaluators.get(spec_id, || {
            let spec = self.spec(spec_id)?;
            let partition_type = spec.partition_type(&self.snapshot_schema)?;
            let partition_schema = Schema::from_struct(spec_id, partition_type.fields().to_vec());
            let projected = InclusiveProjection::new(spec).project(&self.bound_filter)?;
            // Partition field names are matched verbatim.
            let partition_filter = projected.bind(&partition_schema, true)?;
            Ok(ManifestEvaluator::new(partition_type, partition_filter))
        })
    }

    pub(crate) fn residual_evaluator(&self, spec_id: i32, spec: &PartitionSpecRef) -> Arc<ResidualEvaluator> {
        self.residual_evaluators.get(spec_id, spec)
    }
}

/// Lazy per-manifest expansion: opens the manifest on first pull, registers
/// the reader in the close-list and maps surviving entries to tasks.
pub(crate) struct ManifestTasks {
    ctx: Arc<PlanContext>,
    registry: Arc<ReaderRegistry>,
    spec: PartitionSpecRef,
    residual: Arc<ResidualEvaluator>,
    pending: Option<ManifestFile>,
    reader: Option<Arc<Mutex<ManifestReader>>>,
    done: bool,
}

impl ManifestTasks {
    pub(crate) fn new(
        ctx: Arc<PlanContext>,
        registry: Arc<ReaderRegistry>,
        manifest: ManifestFile,
    ) -> Result<Self> {
        let spec = ctx.spec(manifest.partition_spec_id())?;
        let residual = ctx.residual_evaluator(manifest.partition_spec_id(), &spec);
        Ok(Self {
            ctx,
            registry,
            spec,
            residual,
            pending: Some(manifest),
            reader: None,
            done: false,
        })
    }

    fn open(&self, manifest: &ManifestFile) -> Result<ManifestReader> {
        let input = self.ctx.file_io.new_input(manifest.path())?;
        let reader = ManifestReader::read(input, self.ctx.snapshot_schema.clone(), &self.spec)?
            .case_sensitive(self.ctx.case_sensitive);
        // Tasks never carry entry statistics; keep the stats columns only
        // while a filter still needs them for pruning.
        if matches!(self.ctx.row_filter, Predicate::AlwaysTrue) {
            Ok(reader.select(None::<&str>))
        } else {
            Ok(reader
                .filter_rows(self.ctx.row_filter.clone())
                .select(STATS_COLUMNS))
        }
    }
}

impl Iterator for ManifestTasks {
    type Item = Result<FileScanTask>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.reader.is_none() {
            if self.registry.is_closed() {
                self.done = true;
                return None;
            }
            let manifest = self.pending.take()?;
            let reader = match self.open(&manifest) {
                Ok(reader) => reader,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            match self.registry.register(reader) {
                Some(handle) => self.reader = Some(handle),
                // The scan was closed before this manifest was reached.
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
        let Some(handle) = self.reader.clone() else {
            self.done = true;
            return None;
        };
        loop {
            let entry = lock_ignoring_poison(&handle).next();
            match entry {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(entry)) => {
                    let residual = match self
                        .residual
                        .residual_for(&self.ctx.bound_filter, entry.data_file().partition())
                    {
                        Ok(residual) => residual,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    };
                    if residual == Predicate::AlwaysFalse {
                        continue;
                    }
                    let data_file = entry.data_file();
                    return Some(Ok(FileScanTask {
                        start: 0,
                        length: data_file.file_size_in_bytes(),
                        record_count: data_file.record_count(),
                        data_file_path: data_file.file_path().to_string(),
                        data_file_format: data_file.file_format(),
                        schema: self.ctx.snapshot_schema.clone(),
                        project_field_ids: self.ctx.field_ids.as_ref().clone(),
                        partition_spec: self.spec.clone(),
                        residual,
                    }));
                }
            }
        }
    }
}
