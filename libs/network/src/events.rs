//! Lifecycle notification hubs
//!
//! An [`EventHub`] is an explicit list of registered observers for one
//! lifecycle point. `emit` invokes every observer; a failing or panicking
//! observer is isolated, logged and reported, never allowed to stop the
//! remaining observers or the exchange.

use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Observer callback; an `Err` is reported as an observer failure
pub type ObserverFn<E> = dyn Fn(&E) -> anyhow::Result<()> + Send + Sync;

struct Observer<E> {
    name: String,
    callback: Arc<ObserverFn<E>>,
}

impl<E> Clone for Observer<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// One observer that did not complete normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    pub hub: &'static str,
    pub observer: String,
    pub reason: String,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} observer '{}' failed: {}", self.hub, self.observer, self.reason)
    }
}

/// Registered observers for one lifecycle point
pub struct EventHub<E> {
    label: &'static str,
    observers: RwLock<Vec<Observer<E>>>,
    failures: AtomicU64,
}

impl<E> EventHub<E> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            observers: RwLock::new(Vec::new()),
            failures: AtomicU64::new(0),
        }
    }

    pub fn subscribe(
        &self,
        name: impl Into<String>,
        callback: impl Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.observers.write().push(Observer {
            name: name.into(),
            callback: Arc::new(callback),
        });
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Observer failures since creation
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Invoke every observer in registration order
    pub fn emit(&self, event: &E) -> Vec<ObserverFailure> {
        // Snapshot so an observer may subscribe without deadlocking
        let observers: Vec<Observer<E>> = self.observers.read().clone();
        let mut failures = Vec::new();
        for observer in &observers {
            let reason = match catch_unwind(AssertUnwindSafe(|| (observer.callback)(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{:#}", err),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            let failure = ObserverFailure {
                hub: self.label,
                observer: observer.name.clone(),
                reason,
            };
            warn!(hub = self.label, observer = %failure.observer, reason = %failure.reason, "Observer failed");
            self.failures.fetch_add(1, Ordering::Relaxed);
            failures.push(failure);
        }
        failures
    }
}

impl<E> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("label", &self.label)
            .field("observers", &self.len())
            .field("failures", &self.failure_count())
            .finish()
    }
}

/// Human-readable text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn failing_and_panicking_observers_are_isolated() {
        let hub: EventHub<u32> = EventHub::new("test");
        let seen = Arc::new(AtomicUsize::new(0));

        hub.subscribe("erroring", |_| Err(anyhow::anyhow!("disk full")));
        hub.subscribe("panicking", |_| panic!("boom"));
        let counter = Arc::clone(&seen);
        hub.subscribe("healthy", move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
            Ok(())
        });

        let failures = hub.emit(&7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].observer, "erroring");
        assert_eq!(failures[0].reason, "disk full");
        assert_eq!(failures[1].reason, "panicked: boom");
        assert_eq!(hub.failure_count(), 2);
    }

    #[test]
    fn observers_run_in_registration_order() {
        let hub: EventHub<()> = EventHub::new("order");
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            hub.subscribe(name, move |_| {
                log.lock().push(name);
                Ok(())
            });
        }
        assert!(hub.emit(&()).is_empty());
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }
}
