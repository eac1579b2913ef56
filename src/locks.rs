//! Per-customer mutual exclusion.
//!
//! Mutations of one customer's history run one at a time; different
//! customers never wait on each other beyond the brief slot lookup.

use crate::entry::CustomerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct CustomerLocks {
    slots: Mutex<HashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock of `customer`.
    pub fn with_customer<T>(&self, customer: CustomerId, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(customer).or_default())
        };
        let _guard = slot.lock();
        f()
    }
}
