//! Subscribers notified of detections and permanent watch failure.
//!
//! Listeners run synchronously on the supervisor's loop, in registration
//! order. A slow listener delays processing of the rest of the batch.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::watch::EntryKind;

/// Callback interface for observers of a watched directory.
pub trait MonitorListener: Send + Sync {
    /// A stable file, or a folder, appeared in the watched directory.
    fn on_detected(&self, path: &Path, kind: EntryKind);

    /// The watch failed permanently after exhausting its restarts.
    fn on_monitor_failed(&self, _directory: &Path) {}
}

impl<F> MonitorListener for F
where
    F: Fn(&Path, EntryKind) + Send + Sync,
{
    fn on_detected(&self, path: &Path, kind: EntryKind) {
        self(path, kind)
    }
}

/// Ordered set of listeners shared between a supervisor and its owner.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<RwLock<Vec<Arc<dyn MonitorListener>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn MonitorListener>) {
        self.inner.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn notify_detected(&self, path: &Path, kind: EntryKind) {
        for listener in self.snapshot() {
            listener.on_detected(path, kind);
        }
    }

    pub fn notify_failed(&self, directory: &Path) {
        for listener in self.snapshot() {
            listener.on_monitor_failed(directory);
        }
    }

    // Lock is released before callbacks run so a listener may register others.
    fn snapshot(&self) -> Vec<Arc<dyn MonitorListener>> {
        self.inner.read().clone()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MonitorListener for Recorder {
        fn on_detected(&self, path: &Path, kind: EntryKind) {
            self.log
                .lock()
                .push(format!("{}:{}:{}", self.name, kind, path.display()));
        }

        fn on_monitor_failed(&self, directory: &Path) {
            self.log
                .lock()
                .push(format!("{}:failed:{}", self.name, directory.display()));
        }
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::new();
        listeners.add(Arc::new(Recorder { name: "a", log: log.clone() }));
        listeners.add(Arc::new(Recorder { name: "b", log: log.clone() }));

        listeners.notify_detected(Path::new("/in/x.txt"), EntryKind::File);
        listeners.notify_failed(Path::new("/in"));

        assert_eq!(
            *log.lock(),
            vec![
                "a:file:/in/x.txt",
                "b:file:/in/x.txt",
                "a:failed:/in",
                "b:failed:/in",
            ]
        );
    }

    #[test]
    fn test_closure_listener() {
        let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listeners = Listeners::new();
        listeners.add(Arc::new(move |path: &Path, _kind: EntryKind| {
            sink.lock().push(path.to_path_buf());
        }));

        listeners.notify_detected(Path::new("/in/folder"), EntryKind::Folder);
        listeners.notify_failed(Path::new("/in"));

        assert_eq!(*seen.lock(), vec![PathBuf::from("/in/folder")]);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_listener_can_register_during_callback() {
        let listeners = Listeners::new();
        let inner = listeners.clone();
        listeners.add(Arc::new(move |_: &Path, _: EntryKind| {
            inner.add(Arc::new(|_: &Path, _: EntryKind| {}));
        }));

        listeners.notify_detected(Path::new("/x"), EntryKind::File);
        assert_eq!(listeners.len(), 2);
    }
}
