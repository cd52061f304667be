use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::expr::Predicate;
use crate::spec::{DataFileFormat, PartitionSpecRef, SchemaRef};
use crate::util::{PackingIterator, ParallelIterable};
use crate::Error;

use super::context::ReaderRegistry;

/// One data file (or a byte range of it) to read, together with everything a
/// reader needs: the scan schema, the projected field ids, the partition spec
/// the file was written under, and the residual predicate still to apply per
/// row. Serializes to a self-contained JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileScanTask {
    pub start: i64,
    pub length: i64,
    pub record_count: i64,

    pub data_file_path: String,
    pub data_file_format: DataFileFormat,

    pub schema: SchemaRef,
    pub project_field_ids: Vec<i32>,
    pub partition_spec: PartitionSpecRef,
    pub residual: Predicate,
}

impl FileScanTask {
    /// Cover the task's byte range with splits of at most `split_size` bytes.
    /// A zero-length task yields itself.
    pub fn split(&self, split_size: i64) -> Vec<FileScanTask> {
        let mut splits = Vec::new();
        let mut offset = 0;
        while offset < self.length {
            let length = split_size.min(self.length - offset);
            splits.push(FileScanTask {
                start: self.start + offset,
                length,
                ..self.clone()
            });
            offset += length;
        }
        if splits.is_empty() {
            splits.push(self.clone());
        }
        splits
    }
}

/// An ordered group of splits packed to approximate the target split size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedScanTask {
    tasks: Vec<FileScanTask>,
}

impl CombinedScanTask {
    pub(crate) fn new(tasks: Vec<FileScanTask>) -> Self {
        Self { tasks }
    }

    pub fn files(&self) -> &[FileScanTask] {
        &self.tasks
    }
}

pub(crate) enum TaskStream {
    Empty,
    Sequential(Box<dyn Iterator<Item = Result<FileScanTask>> + Send>),
    Parallel(ParallelIterable<FileScanTask>),
}

/// Closeable lazy stream of [`FileScanTask`]s returned by `plan_files`.
///
/// The stream owns every manifest reader opened on its behalf. Fully
/// consuming it, closing it, or dropping it closes them all exactly once;
/// the first close error is surfaced and the rest are logged.
pub struct FileScanTasks {
    stream: TaskStream,
    registry: Arc<ReaderRegistry>,
    closed: bool,
}

impl std::fmt::Debug for FileScanTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileScanTasks")
            .field("closed", &self.closed)
            .finish()
    }
}

impl FileScanTasks {
    pub(crate) fn new(stream: TaskStream, registry: Arc<ReaderRegistry>) -> Self {
        Self {
            stream,
            registry,
            closed: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(TaskStream::Empty, Arc::new(ReaderRegistry::new()))
    }

    /// Stop the stream: cancel pending manifest expansion and close every
    /// opened reader. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let TaskStream::Parallel(parallel) = &mut self.stream {
            parallel.close();
        }
        self.stream = TaskStream::Empty;
        self.registry.close_all()
    }
}

impl Iterator for FileScanTasks {
    type Item = Result<FileScanTask>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        let item = match &mut self.stream {
            TaskStream::Empty => None,
            TaskStream::Sequential(iter) => iter.next(),
            TaskStream::Parallel(iter) => iter.next(),
        };
        match item {
            Some(Ok(task)) => Some(Ok(task)),
            // The first error ends the stream.
            Some(Err(e)) => {
                self.closed = true;
                self.stream = TaskStream::Empty;
                if let Err(close_err) = self.registry.close_all() {
                    log::warn!("error closing manifest readers after planning failure: {close_err}");
                }
                Some(Err(e))
            }
            None => {
                self.closed = true;
                self.stream = TaskStream::Empty;
                match self.registry.close_all() {
                    Ok(()) => None,
                    Err(e) => Some(Err(e)),
                }
            }
        }
    }
}

impl Drop for FileScanTasks {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing file scan task stream: {e}");
        }
    }
}

/// Splits the file stream and stashes its first error for the packer's
/// consumer, since the packer itself only moves plain items.
struct SplitTasks {
    files: FileScanTasks,
    pending: VecDeque<FileScanTask>,
    split_size: i64,
    error: Arc<Mutex<Option<Error>>>,
    done: bool,
}

impl SplitTasks {
    fn close(&mut self) -> Result<()> {
        self.done = true;
        self.files.close()
    }

    fn stash(&mut self, error: Error) {
        if let Ok(mut slot) = self.error.lock() {
            slot.get_or_insert(error);
        }
        self.done = true;
    }
}

impl Iterator for SplitTasks {
    type Item = FileScanTask;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(task) = self.pending.pop_front() {
                return Some(task);
            }
            if self.done {
                return None;
            }
            match self.files.next() {
                Some(Ok(task)) => self.pending.extend(task.split(self.split_size)),
                Some(Err(e)) => {
                    self.stash(e);
                    return None;
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

type Weigher = Box<dyn Fn(&FileScanTask) -> i64 + Send>;

/// Closeable lazy stream of [`CombinedScanTask`]s returned by `plan_tasks`.
/// Owns the underlying file stream and closes it on close or drop.
pub struct CombinedScanTasks {
    packer: PackingIterator<FileScanTask, SplitTasks, Weigher>,
    error: Arc<Mutex<Option<Error>>>,
    closed: bool,
}

impl CombinedScanTasks {
    pub(crate) fn new(
        files: FileScanTasks,
        split_size: i64,
        lookback: usize,
        open_file_cost: i64,
    ) -> Self {
        let error = Arc::new(Mutex::new(None));
        let splits = SplitTasks {
            files,
            pending: VecDeque::new(),
            split_size,
            error: error.clone(),
            done: false,
        };
        let weigher: Weigher = Box::new(move |task| task.length.max(open_file_cost));
        Self {
            packer: PackingIterator::new(splits, split_size, lookback, weigher),
            error,
            closed: false,
        }
    }

    fn take_error(&self) -> Option<Error> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Stop the stream and close the underlying file stream. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.packer.source_mut().close()
    }
}

impl Iterator for CombinedScanTasks {
    type Item = Result<CombinedScanTask>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        if let Some(e) = self.take_error() {
            self.closed = true;
            return Some(Err(e));
        }
        match self.packer.next() {
            Some(bin) => {
                // An error observed while this bin was filling wins over the
                // partial bin.
                if let Some(e) = self.take_error() {
                    self.closed = true;
                    return Some(Err(e));
                }
                Some(Ok(CombinedScanTask::new(bin)))
            }
            None => {
                self.closed = true;
                None
            }
        }
    }
}

impl Drop for CombinedScanTasks {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing combined scan task stream: {e}");
        }
    }
}
