use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

/// Snapshot of a transfer after one part was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartProgress {
    pub key: String,
    /// 1-based number of the part just completed.
    pub part: u64,
    pub total_parts: u64,
    pub content_length: u64,
    pub part_size: u64,
}

/// Receives progress updates from a [`crate::downloader::Downloader`].
pub trait ProgressSink: Send + Sync {
    fn on_part_complete(&self, progress: &PartProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&PartProgress) + Send + Sync,
{
    fn on_part_complete(&self, progress: &PartProgress) {
        self(progress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registered sinks of a single downloader, notified in registration order.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    sinks: Mutex<Vec<(ObserverId, Arc<dyn ProgressSink>)>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sink: Arc<dyn ProgressSink>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, sink));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn detach(&self, id: ObserverId) -> bool {
        let mut sinks = self
            .sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    pub fn len(&self) -> usize {
        self.sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `progress` to every sink. A panicking sink is logged and
    /// skipped; the others still run.
    pub fn notify(&self, progress: &PartProgress) {
        // Sinks may attach or detach from inside a callback.
        let snapshot: Vec<(ObserverId, Arc<dyn ProgressSink>)> = self
            .sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for (id, sink) in snapshot {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| sink.on_part_complete(progress)));
            if delivered.is_err() {
                tracing::warn!(observer = ?id, part = progress.part, "progress observer panicked");
            }
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(part: u64) -> PartProgress {
        PartProgress {
            key: String::from("data/file.bin"),
            part,
            total_parts: 3,
            content_length: 30,
            part_size: 10,
        }
    }

    #[test]
    fn test_notify_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observers = Observers::new();
        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            observers.attach(Arc::new(move |p: &PartProgress| {
                seen.lock().unwrap().push((name, p.part));
            }));
        }

        observers.notify(&progress(1));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first", 1), ("second", 1), ("third", 1)]
        );
    }

    #[test]
    fn test_detach() {
        let count = Arc::new(AtomicU64::new(0));
        let observers = Observers::new();
        let counter = count.clone();
        let id = observers.attach(Arc::new(move |_: &PartProgress| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        observers.notify(&progress(1));
        assert!(observers.detach(id));
        assert!(!observers.detach(id));
        observers.notify(&progress(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let count = Arc::new(AtomicU64::new(0));
        let observers = Observers::new();
        observers.attach(Arc::new(|_: &PartProgress| panic!("observer failure")));
        let counter = count.clone();
        observers.attach(Arc::new(move |_: &PartProgress| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        observers.notify(&progress(1));
        observers.notify(&progress(2));

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(observers.len(), 2);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Observers::new();
        let b = Observers::new();
        a.attach(Arc::new(|_: &PartProgress| {}));

        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
