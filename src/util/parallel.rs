use std::sync::mpsc::{sync_channel, Receiver};

use threadpool::ThreadPool;

use crate::error::Result;

/// How many items may sit between the workers and the consumer before
/// workers block.
const QUEUE_CAPACITY: usize = 128;

/// Fans a collection of lazy iterators out over a worker pool, yielding their
/// items as one sequence.
///
/// Each inner iterator is drained by a single worker, so its own order is
/// preserved; the interleaving across iterators is unspecified. Worker errors
/// flow through the queue and surface on the consumer's next pull. Dropping
/// (or closing) the iterable cancels: workers stop at their next send.
pub(crate) struct ParallelIterable<T> {
    receiver: Option<Receiver<Result<T>>>,
}

impl<T: Send + 'static> ParallelIterable<T> {
    pub(crate) fn new<I>(iterables: Vec<I>, pool: &ThreadPool) -> Self
    where
        I: IntoIterator<Item = Result<T>> + Send + 'static,
    {
        let (sender, receiver) = sync_channel::<Result<T>>(QUEUE_CAPACITY);
        for iterable in iterables {
            let sender = sender.clone();
            pool.execute(move || {
                for item in iterable {
                    let failed = item.is_err();
                    // A send fails only when the consumer is gone; stop quietly.
                    if sender.send(item).is_err() || failed {
                        return;
                    }
                }
            });
        }
        Self {
            receiver: Some(receiver),
        }
    }

    /// Stop consuming. Queued items are discarded and workers unblock.
    pub(crate) fn close(&mut self) {
        self.receiver = None;
    }
}

impl<T> Iterator for ParallelIterable<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.receiver.as_ref()?.recv() {
            Ok(item) => Some(item),
            // Every sender dropped: all workers are done.
            Err(_) => {
                self.receiver = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::worker_pool;
    use crate::{Error, ErrorKind};

    #[test]
    fn yields_every_item_of_every_inner_iterable() {
        let inners: Vec<Vec<Result<i32>>> = (0..5)
            .map(|i| (0..10).map(|j| Ok(i * 10 + j)).collect())
            .collect();
        let mut collected: Vec<i32> = ParallelIterable::new(inners, &worker_pool())
            .collect::<Result<_>>()
            .unwrap();
        collected.sort_unstable();
        assert_eq!(collected, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn order_within_an_inner_iterable_is_preserved() {
        let inner: Vec<Result<i32>> = (0..100).map(Ok).collect();
        let collected: Vec<i32> = ParallelIterable::new(vec![inner], &worker_pool())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(collected, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn worker_errors_surface_to_the_consumer() {
        let inner: Vec<Result<i32>> = vec![
            Ok(1),
            Err(Error::new(ErrorKind::Io, "manifest read failed")),
            Ok(2),
        ];
        let items: Vec<Result<i32>> = ParallelIterable::new(vec![inner], &worker_pool()).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn close_cancels_without_draining_everything() {
        let inners: Vec<Vec<Result<i32>>> = (0..4)
            .map(|_| (0..10_000).map(Ok).collect())
            .collect();
        let mut iterable = ParallelIterable::new(inners, &worker_pool());
        assert!(iterable.next().is_some());
        iterable.close();
        assert!(iterable.next().is_none());
    }
}
