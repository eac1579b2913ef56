//! Entry storage.
//!
//! The coordinator reads one customer's history as a [`Snapshot`] and writes
//! back a [`WriteBatch`]. A store must apply a batch entirely or not at all,
//! and must refuse a batch whose snapshot generation is stale.

use crate::entry::{CustomerId, EntryId, OrderKey, Posting};
use crate::error::{LedgerError, Result};
use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// One customer's records, ordered by `(occurred_at, id)`.
#[derive(Debug, Clone)]
pub struct Snapshot<P> {
    pub customer: CustomerId,
    /// Bumped by every committed batch touching this customer.
    pub generation: u64,
    pub rows: Vec<P>,
}

/// A single row operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write<P> {
    Insert(P),
    Update(P),
    Delete(EntryId),
}

/// Row operations on one customer's history, applied as one unit.
#[derive(Debug, Clone)]
pub struct WriteBatch<P> {
    customer: CustomerId,
    expected_generation: Option<u64>,
    writes: Vec<Write<P>>,
}

impl<P: Posting> WriteBatch<P> {
    /// Batch applied regardless of concurrent commits.
    pub fn new(customer: CustomerId) -> Self {
        WriteBatch {
            customer,
            expected_generation: None,
            writes: Vec::new(),
        }
    }

    /// Batch that fails with `Conflict` unless the customer is still at `generation`.
    pub fn guarded(customer: CustomerId, generation: u64) -> Self {
        WriteBatch {
            customer,
            expected_generation: Some(generation),
            writes: Vec::new(),
        }
    }

    pub fn insert(&mut self, row: P) {
        self.writes.push(Write::Insert(row));
    }

    pub fn update(&mut self, row: P) {
        self.writes.push(Write::Update(row));
    }

    pub fn delete(&mut self, id: EntryId) {
        self.writes.push(Write::Delete(id));
    }

    pub fn customer(&self) -> CustomerId {
        self.customer
    }

    pub fn expected_generation(&self) -> Option<u64> {
        self.expected_generation
    }

    pub fn writes(&self) -> &[Write<P>] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write<P>> {
        self.writes
    }
}

/// Persistence contract used by the coordinator.
pub trait EntryStore<P: Posting>: Send + Sync {
    /// Allocates the next id. Ids strictly increase and are never reused.
    fn next_id(&self) -> Result<EntryId>;

    fn get(&self, id: EntryId) -> Result<Option<P>>;

    /// Reads a customer's full history in `(occurred_at, id)` order.
    fn snapshot(&self, customer: CustomerId) -> Result<Snapshot<P>>;

    /// Applies every write of the batch, or none of them.
    fn commit(&self, batch: WriteBatch<P>) -> Result<()>;

    /// Customers with at least one record, ascending.
    fn customers(&self) -> Result<Vec<CustomerId>>;

    fn list_by_customer(&self, customer: CustomerId) -> Result<Vec<P>> {
        Ok(self.snapshot(customer)?.rows)
    }

    fn insert(&self, row: P) -> Result<EntryId> {
        let id = row.id();
        let mut batch = WriteBatch::new(row.customer_id());
        batch.insert(row);
        self.commit(batch)?;
        Ok(id)
    }

    fn update(&self, row: P) -> Result<()> {
        let mut batch = WriteBatch::new(row.customer_id());
        batch.update(row);
        self.commit(batch)
    }

    fn delete(&self, customer: CustomerId, id: EntryId) -> Result<()> {
        let mut batch = WriteBatch::new(customer);
        batch.delete(id);
        self.commit(batch)
    }
}

struct Tables<P> {
    rows: HashMap<EntryId, P>,
    order: HashMap<CustomerId, BTreeMap<OrderKey, EntryId>>,
    generations: HashMap<CustomerId, u64>,
}

/// In-process store backed by hash maps under a single lock.
///
/// Batches are checked in full before the first row is touched, so a
/// rejected batch leaves every table unchanged.
pub struct MemoryStore<P> {
    tables: RwLock<Tables<P>>,
    last_id: AtomicU64,
    failing_commits: AtomicUsize,
}

impl<P: Posting> MemoryStore<P> {
    pub fn new() -> Self {
        MemoryStore {
            tables: RwLock::new(Tables {
                rows: HashMap::new(),
                order: HashMap::new(),
                generations: HashMap::new(),
            }),
            last_id: AtomicU64::new(0),
            failing_commits: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` commits fail with a retryable store error
    /// without applying anything. Used to exercise rollback paths.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Total number of stored rows across all customers.
    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Rejects the batch if any write would fail when applied in order.
    fn check(tables: &Tables<P>, batch: &WriteBatch<P>) -> Result<()> {
        let customer = batch.customer();
        let mut present: HashSet<EntryId> = HashSet::new();
        let mut absent: HashSet<EntryId> = HashSet::new();

        let exists = |id: &EntryId, present: &HashSet<EntryId>, absent: &HashSet<EntryId>| {
            present.contains(id) || (!absent.contains(id) && tables.rows.contains_key(id))
        };

        for write in batch.writes() {
            match write {
                Write::Insert(row) => {
                    if row.customer_id() != customer {
                        return Err(foreign_row(row.id(), customer));
                    }
                    if exists(&row.id(), &present, &absent) {
                        return Err(LedgerError::Store {
                            reason: format!("duplicate id {}", row.id()),
                            retryable: false,
                        });
                    }
                    absent.remove(&row.id());
                    present.insert(row.id());
                }
                Write::Update(row) => {
                    if row.customer_id() != customer {
                        return Err(foreign_row(row.id(), customer));
                    }
                    if !exists(&row.id(), &present, &absent) {
                        return Err(missing_row(row.id()));
                    }
                    if let Some(stored) = tables.rows.get(&row.id()) {
                        if stored.customer_id() != customer {
                            return Err(foreign_row(row.id(), customer));
                        }
                    }
                }
                Write::Delete(id) => {
                    if !exists(id, &present, &absent) {
                        return Err(missing_row(*id));
                    }
                    if let Some(stored) = tables.rows.get(id) {
                        if stored.customer_id() != customer {
                            return Err(foreign_row(*id, customer));
                        }
                    }
                    present.remove(id);
                    absent.insert(*id);
                }
            }
        }

        Ok(())
    }

    fn apply(tables: &mut Tables<P>, batch: WriteBatch<P>) {
        let customer = batch.customer();

        for write in batch.into_writes() {
            match write {
                Write::Insert(row) | Write::Update(row) => {
                    let id = row.id();
                    let index = tables.order.entry(customer).or_default();
                    if let Some(previous) = tables.rows.get(&id) {
                        index.remove(&previous.order_key());
                    }
                    index.insert(row.order_key(), id);
                    tables.rows.insert(id, row);
                }
                Write::Delete(id) => {
                    if let Some(previous) = tables.rows.remove(&id) {
                        if let Some(index) = tables.order.get_mut(&customer) {
                            index.remove(&previous.order_key());
                        }
                    }
                }
            }
        }

        if tables.order.get(&customer).is_some_and(|index| index.is_empty()) {
            tables.order.remove(&customer);
        }
        *tables.generations.entry(customer).or_insert(0) += 1;
    }
}

fn missing_row(id: EntryId) -> LedgerError {
    LedgerError::Store {
        reason: format!("row {id} does not exist"),
        retryable: false,
    }
}

fn foreign_row(id: EntryId, customer: CustomerId) -> LedgerError {
    LedgerError::Store {
        reason: format!("row {id} does not belong to customer {customer}"),
        retryable: false,
    }
}

impl<P: Posting> Default for MemoryStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Posting> EntryStore<P> for MemoryStore<P> {
    fn next_id(&self) -> Result<EntryId> {
        Ok(EntryId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn get(&self, id: EntryId) -> Result<Option<P>> {
        Ok(self.tables.read().rows.get(&id).cloned())
    }

    fn snapshot(&self, customer: CustomerId) -> Result<Snapshot<P>> {
        let tables = self.tables.read();
        let rows = tables
            .order
            .get(&customer)
            .map(|index| {
                index
                    .values()
                    .filter_map(|id| tables.rows.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Snapshot {
            customer,
            generation: tables.generations.get(&customer).copied().unwrap_or(0),
            rows,
        })
    }

    fn commit(&self, batch: WriteBatch<P>) -> Result<()> {
        if self.take_injected_failure() {
            return Err(LedgerError::Store {
                reason: "injected commit failure".into(),
                retryable: true,
            });
        }

        let mut tables = self.tables.write();
        let customer = batch.customer();

        if let Some(expected) = batch.expected_generation() {
            let current = tables.generations.get(&customer).copied().unwrap_or(0);
            if current != expected {
                debug!(
                    "Customer {}: stale batch at generation {}, store is at {}",
                    customer, expected, current
                );
                return Err(LedgerError::Conflict { customer });
            }
        }

        Self::check(&tables, &batch)?;
        Self::apply(&mut tables, batch);
        Ok(())
    }

    fn customers(&self) -> Result<Vec<CustomerId>> {
        let mut customers: Vec<_> = self.tables.read().order.keys().copied().collect();
        customers.sort();
        Ok(customers)
    }
}
