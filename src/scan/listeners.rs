use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::expr::Predicate;
use crate::spec::SchemaRef;

/// Emitted once per `plan_files` call, before any manifest is read.
#[derive(Clone, Debug)]
pub struct ScanEvent {
    pub table_name: String,
    pub snapshot_id: i64,
    pub filter: Predicate,
    pub projection: SchemaRef,
}

/// Receives scan events. Dispatch is fire-and-forget: a listener can never
/// fail the planner.
pub trait Listener: Send + Sync {
    fn notify(&self, event: &ScanEvent);
}

static LISTENERS: Lazy<RwLock<Vec<Arc<dyn Listener>>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Register a process-wide scan listener.
pub fn register(listener: Arc<dyn Listener>) {
    let mut listeners = match LISTENERS.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    listeners.push(listener);
}

pub(crate) fn notify_all(event: &ScanEvent) {
    let listeners = match LISTENERS.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    for listener in &listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.notify(event))).is_err() {
            log::warn!("scan listener panicked, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::spec::Schema;

    struct Counting(AtomicUsize);

    impl Listener for Counting {
        fn notify(&self, _event: &ScanEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl Listener for Panicking {
        fn notify(&self, _event: &ScanEvent) {
            panic!("listener bug");
        }
    }

    #[test]
    fn panicking_listeners_do_not_stop_dispatch() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        register(Arc::new(Panicking));
        register(counting.clone());

        notify_all(&ScanEvent {
            table_name: "t".to_string(),
            snapshot_id: 1,
            filter: Predicate::AlwaysTrue,
            projection: Arc::new(Schema::new(0, vec![])),
        });
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}
