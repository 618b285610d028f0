//! Registry of outstanding routing-engine requests.
//!
//! Every asynchronous request an action issues is entered here with its
//! owning action, the root action of its job and a deadline. An
//! acknowledgement is delivered at most once: [`HandleRegistry::take`]
//! removes the entry before the caller routes the result, so a repeated or
//! late notification finds nothing.

use std::collections::HashMap;

use routing_core::{ControlError, ControlResult, Handle};
use tracing::debug;

use crate::action::ActionId;

/// One outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub handle: Handle,
    pub owner: ActionId,
    pub root: ActionId,
    pub deadline_ms: u64,
}

/// Outstanding routing requests keyed by handle.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: HashMap<Handle, PendingRequest>,
}

impl HandleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `ControlError::DuplicateHandle` if `handle` is still
    /// outstanding.
    pub fn register(
        &mut self,
        handle: Handle,
        owner: ActionId,
        root: ActionId,
        deadline_ms: u64,
    ) -> ControlResult<()> {
        if self.entries.contains_key(&handle) {
            return Err(ControlError::DuplicateHandle(handle));
        }
        debug!(%handle, %owner, deadline_ms, "request registered");
        self.entries.insert(
            handle,
            PendingRequest {
                handle,
                owner,
                root,
                deadline_ms,
            },
        );
        Ok(())
    }

    /// Removes and returns the entry for `handle`. Unknown handles yield
    /// `None`.
    pub fn take(&mut self, handle: Handle) -> Option<PendingRequest> {
        self.entries.remove(&handle)
    }

    /// Drops the entry for `handle` without delivering anything.
    pub fn release(&mut self, handle: Handle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Drops every entry owned by the job rooted at `root`, returning the
    /// released handles.
    pub fn release_root(&mut self, root: ActionId) -> Vec<Handle> {
        let handles: Vec<Handle> = self
            .entries
            .values()
            .filter(|entry| entry.root == root)
            .map(|entry| entry.handle)
            .collect();
        for handle in &handles {
            self.entries.remove(handle);
        }
        handles
    }

    /// Removes and returns every entry whose deadline is at or before `now_ms`,
    /// earliest deadline first.
    pub fn take_expired(&mut self, now_ms: u64) -> Vec<PendingRequest> {
        let mut expired: Vec<PendingRequest> = self
            .entries
            .values()
            .filter(|entry| entry.deadline_ms <= now_ms)
            .copied()
            .collect();
        expired.sort_by_key(|entry| (entry.deadline_ms, entry.owner));
        for entry in &expired {
            self.entries.remove(&entry.handle);
        }
        expired
    }

    /// Earliest deadline among outstanding requests, in clock milliseconds.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|entry| entry.deadline_ms).min()
    }

    /// Whether `handle` is still outstanding.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use routing_core::RequestKind;

    use super::*;

    fn handle(value: u16) -> Handle {
        Handle::new(RequestKind::Connect, value)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandleRegistry::new();
        registry.register(handle(1), ActionId(1), ActionId(0), 100).unwrap();
        assert_eq!(
            registry.register(handle(1), ActionId(2), ActionId(0), 100),
            Err(ControlError::DuplicateHandle(handle(1)))
        );
        // Same value, different kind is a different handle.
        registry
            .register(Handle::new(RequestKind::Disconnect, 1), ActionId(2), ActionId(0), 100)
            .unwrap();
    }

    #[test]
    fn take_after_release_is_none() {
        let mut registry = HandleRegistry::new();
        registry.register(handle(1), ActionId(1), ActionId(0), 100).unwrap();
        assert!(registry.release(handle(1)));
        assert_eq!(registry.take(handle(1)), None);
        assert!(!registry.release(handle(1)));
    }

    #[test]
    fn release_root_only_touches_that_job() {
        let mut registry = HandleRegistry::new();
        registry.register(handle(1), ActionId(3), ActionId(1), 100).unwrap();
        registry.register(handle(2), ActionId(4), ActionId(1), 100).unwrap();
        registry.register(handle(3), ActionId(6), ActionId(5), 100).unwrap();

        let mut released = registry.release_root(ActionId(1));
        released.sort_by_key(|h| h.value);
        assert_eq!(released, vec![handle(1), handle(2)]);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(handle(3)));
    }

    #[test]
    fn expiry_is_ordered_by_deadline() {
        let mut registry = HandleRegistry::new();
        registry.register(handle(1), ActionId(1), ActionId(0), 300).unwrap();
        registry.register(handle(2), ActionId(2), ActionId(0), 100).unwrap();
        registry.register(handle(3), ActionId(3), ActionId(0), 200).unwrap();

        assert_eq!(registry.next_deadline(), Some(100));
        let expired = registry.take_expired(200);
        let handles: Vec<Handle> = expired.iter().map(|e| e.handle).collect();
        assert_eq!(handles, vec![handle(2), handle(3)]);
        assert_eq!(registry.next_deadline(), Some(300));
        assert!(registry.take_expired(250).is_empty());
    }

    proptest! {
        #[test]
        fn each_handle_is_delivered_at_most_once(
            values in proptest::collection::vec(0u16..16, 1..64),
        ) {
            let mut registry = HandleRegistry::new();
            let mut registered = std::collections::HashSet::new();
            for value in &values {
                let ok = registry
                    .register(handle(*value), ActionId(u64::from(*value)), ActionId(0), 10)
                    .is_ok();
                prop_assert_eq!(ok, registered.insert(*value));
            }
            let mut delivered = 0usize;
            for value in &values {
                if registry.take(handle(*value)).is_some() {
                    delivered += 1;
                }
            }
            prop_assert_eq!(delivered, registered.len());
            prop_assert!(registry.is_empty());
        }
    }
}
