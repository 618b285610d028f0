//! Connection observer trait and composite implementation.
//!
//! Defines [`ConnectionObserver`] for reacting to main-connection lifecycle
//! events in the element registry, and [`CompositeConnectionObserver`] which
//! fans out notifications to multiple observers.

use std::sync::Arc;

use routing_core::types::ConnectionState;

use super::main_connection::MainConnection;

/// Observer for main-connection lifecycle and state changes.
///
/// Used as `Arc<dyn ConnectionObserver>`. Callbacks run on the controller
/// task and must not block.
pub trait ConnectionObserver: Send + Sync {
    /// Called after a main connection has been entered into the database.
    fn on_created(&self, connection: &MainConnection);

    /// Called after the published state of a connection changed.
    fn on_state_changed(&self, connection: &MainConnection, previous: ConnectionState);

    /// Called after a main connection has been removed.
    fn on_removed(&self, connection: &MainConnection);
}

/// Composite observer that fans out to multiple observers.
#[derive(Default)]
pub struct CompositeConnectionObserver {
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl CompositeConnectionObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn ConnectionObserver>>) -> Self {
        Self { observers }
    }

    pub fn add(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for CompositeConnectionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeConnectionObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ConnectionObserver for CompositeConnectionObserver {
    fn on_created(&self, connection: &MainConnection) {
        for observer in &self.observers {
            observer.on_created(connection);
        }
    }

    fn on_state_changed(&self, connection: &MainConnection, previous: ConnectionState) {
        for observer in &self.observers {
            observer.on_state_changed(connection, previous);
        }
    }

    fn on_removed(&self, connection: &MainConnection) {
        for observer in &self.observers {
            observer.on_removed(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingObserver {
        created: AtomicUsize,
        changed: AtomicUsize,
        removed: AtomicUsize,
    }

    impl ConnectionObserver for CountingObserver {
        fn on_created(&self, _: &MainConnection) {
            self.created.fetch_add(1, Ordering::Relaxed);
        }
        fn on_state_changed(&self, _: &MainConnection, _: ConnectionState) {
            self.changed.fetch_add(1, Ordering::Relaxed);
        }
        fn on_removed(&self, _: &MainConnection) {
            self.removed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn composite_fans_out_to_every_observer() {
        let a = Arc::new(CountingObserver::default());
        let b = Arc::new(CountingObserver::default());
        let mut composite = CompositeConnectionObserver::new(vec![a.clone()]);
        composite.add(b.clone());
        assert_eq!(composite.len(), 2);

        let conn = MainConnection::new("BASE", "S", 1, "K", 2, Vec::new(), 0);
        composite.on_created(&conn);
        composite.on_state_changed(&conn, ConnectionState::Connecting);
        composite.on_removed(&conn);

        for observer in [&a, &b] {
            assert_eq!(observer.created.load(Ordering::Relaxed), 1);
            assert_eq!(observer.changed.load(Ordering::Relaxed), 1);
            assert_eq!(observer.removed.load(Ordering::Relaxed), 1);
        }
    }
}
