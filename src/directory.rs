//! Existence checks against records the engine references but does not own.

use crate::entry::{CustomerId, FundingRef};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Advisory lookups consumed by the coordinator before it writes.
pub trait CustomerDirectory: Send + Sync {
    fn customer_exists(&self, id: CustomerId) -> bool;
    fn funding_source_exists(&self, id: FundingRef) -> bool;
}

/// Directory that accepts every reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenDirectory;

impl CustomerDirectory for OpenDirectory {
    fn customer_exists(&self, _id: CustomerId) -> bool {
        true
    }

    fn funding_source_exists(&self, _id: FundingRef) -> bool {
        true
    }
}

/// In-memory set of known customers and funding sources.
#[derive(Debug, Default)]
pub struct Registry {
    customers: RwLock<HashSet<CustomerId>>,
    funding_sources: RwLock<HashSet<FundingRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_customer(&self, id: CustomerId) {
        self.customers.write().insert(id);
    }

    pub fn remove_customer(&self, id: CustomerId) -> bool {
        self.customers.write().remove(&id)
    }

    pub fn register_funding_source(&self, id: FundingRef) {
        self.funding_sources.write().insert(id);
    }
}

impl CustomerDirectory for Registry {
    fn customer_exists(&self, id: CustomerId) -> bool {
        self.customers.read().contains(&id)
    }

    fn funding_source_exists(&self, id: FundingRef) -> bool {
        self.funding_sources.read().contains(&id)
    }
}
