//! Mutation coordinator.
//!
//! Every mutation runs as one unit of work on one customer's history:
//!
//! 1. validate the input (no store access),
//! 2. take the customer's lock and read a snapshot,
//! 3. apply the change to the in-memory copy, reorder by `(occurred_at, id)`
//!    and recompute every running balance in a single prefix-sum pass,
//! 4. diff against the snapshot and commit the changed rows as one batch,
//! 5. re-read the committed history and check it against its nets.
//!
//! A failed commit leaves the store untouched. A commit that loses a race
//! against another writer of the same store is retried from step 2.

use crate::balance::{self, BalanceError};
use crate::config::EngineConfig;
use crate::directory::CustomerDirectory;
use crate::entry::{CustomerId, EntryId, FundingRef, LedgerEntry, Posting, Reflow};
use crate::error::{LedgerError, Result};
use crate::locks::CustomerLocks;
use crate::store::{EntryStore, MemoryStore, WriteBatch};
use crate::trade::TradeRecord;
use chrono::Local;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Commodity ledger for unit `U` over the in-memory store.
pub type Ledger<U> = Coordinator<LedgerEntry<U>>;

/// Trade log over the in-memory store.
pub type TradeLog = Coordinator<TradeRecord>;

/// Change to a customer's history planned against a fresh snapshot.
enum Change<P> {
    Insert(P),
    Replace(P, Reflow),
    Remove(EntryId),
    Rebalance,
}

/// Result of a committed unit of work.
struct Outcome<P> {
    rows: Vec<P>,
    rewritten: usize,
}

impl<P: Posting> Outcome<P> {
    fn row(&self, id: EntryId) -> Option<&P> {
        self.rows.iter().find(|row| row.id() == id)
    }
}

/// Summary of a recompute pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputeReport<T> {
    pub customer: CustomerId,
    pub entries: usize,
    /// Rows whose stored balance differed and were rewritten.
    pub rewritten: usize,
    pub balance: T,
}

/// Orchestrates append, amend, retract and recompute over one book of records.
pub struct Coordinator<P: Posting, S: EntryStore<P> = MemoryStore<P>> {
    store: Arc<S>,
    directory: Arc<dyn CustomerDirectory>,
    locks: CustomerLocks,
    config: EngineConfig,
    records: PhantomData<fn() -> P>,
}

impl<P: Posting> Coordinator<P> {
    /// Coordinator over a fresh in-memory store.
    pub fn in_memory(directory: Arc<dyn CustomerDirectory>, config: EngineConfig) -> Self {
        Coordinator::new(Arc::new(MemoryStore::new()), directory, config)
    }
}

impl<P: Posting, S: EntryStore<P>> Coordinator<P, S> {
    pub fn new(store: Arc<S>, directory: Arc<dyn CustomerDirectory>, config: EngineConfig) -> Self {
        Coordinator {
            store,
            directory,
            locks: CustomerLocks::new(),
            config,
            records: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adds a record and recomputes the customer's balances.
    ///
    /// Back-dated records are placed by `(occurred_at, id)`; every later
    /// record's balance moves by the new record's net flow.
    pub fn append(&self, draft: P::Draft) -> Result<P::View> {
        P::validate_draft(&draft)?;
        let customer = P::draft_customer(&draft);
        self.ensure_customer(customer)?;

        self.ensure_funding(P::draft_funding(&draft))?;

        let reported = P::reported_total(&draft);
        let id = self.store.next_id()?;
        let record = P::create(id, draft, Local::now().naive_local());

        let outcome = self
            .mutate(customer, |_| Ok(Some(Change::Insert(record.clone()))))?
            .ok_or_else(|| self.missing(customer, id))?;
        let stored = self.committed(&outcome, customer, id)?;

        if let Some(reported) = reported {
            if reported != stored.balance() {
                warn!(
                    "{} {}: discarded caller balance {}, recomputed {}",
                    P::LEDGER,
                    id,
                    reported,
                    stored.balance()
                );
            }
        }

        info!(
            "{} {}: appended for customer {}, balance {}, {} rows written",
            P::LEDGER,
            id,
            customer,
            stored.balance(),
            outcome.rewritten
        );
        Ok(stored.view())
    }

    /// Applies a partial update.
    ///
    /// Balances are recomputed only when flows or the timestamp changed.
    pub fn amend(&self, id: EntryId, amendment: P::Amendment) -> Result<P::View> {
        P::validate_amendment(&amendment)?;

        let not_found = || LedgerError::EntryNotFound {
            ledger: P::LEDGER,
            id,
        };
        let customer = self.store.get(id)?.ok_or_else(not_found)?.customer_id();

        let mut reflow = Reflow::NotNeeded;
        let outcome = self
            .mutate(customer, |rows| {
                let Some(latest) = rows.iter().find(|row| row.id() == id) else {
                    return Ok(None);
                };
                let mut amended = latest.clone();
                reflow = amended.amend(amendment.clone());
                if amended.funding_ref() != latest.funding_ref() {
                    self.ensure_funding(amended.funding_ref())?;
                }
                Ok(Some(Change::Replace(amended, reflow)))
            })?
            .ok_or_else(not_found)?;
        let stored = self.committed(&outcome, customer, id)?;

        info!(
            "{} {}: amended ({:?}), balance {}, {} rows written",
            P::LEDGER,
            id,
            reflow,
            stored.balance(),
            outcome.rewritten
        );
        Ok(stored.view())
    }

    /// Deletes a record and recomputes the remaining history.
    ///
    /// Returns `false` if no record has this id.
    pub fn retract(&self, id: EntryId) -> Result<bool> {
        let Some(current) = self.store.get(id)? else {
            debug!("{} {}: retract of unknown entry", P::LEDGER, id);
            return Ok(false);
        };
        let customer = current.customer_id();

        let outcome = self.mutate(customer, |rows| {
            if rows.iter().any(|row| row.id() == id) {
                Ok(Some(Change::Remove(id)))
            } else {
                Ok(None)
            }
        })?;

        match outcome {
            Some(outcome) => {
                info!(
                    "{} {}: retracted from customer {}, {} rows written",
                    P::LEDGER,
                    id,
                    customer,
                    outcome.rewritten
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recalculates every balance of the customer and rewrites the ones that
    /// drifted, in one atomic batch.
    pub fn recompute(&self, customer: CustomerId) -> Result<RecomputeReport<P::Total>> {
        self.ensure_customer(customer)?;
        let outcome = self
            .mutate(customer, |_| Ok(Some(Change::Rebalance)))?
            .ok_or(LedgerError::CustomerNotFound { id: customer })?;

        let balance = outcome
            .rows
            .last()
            .map(P::balance)
            .unwrap_or_else(<P::Total as balance::RunningTotal>::zero);

        debug!(
            "{} customer {}: recomputed {} entries, {} rewritten",
            P::LEDGER,
            customer,
            outcome.rows.len(),
            outcome.rewritten
        );

        Ok(RecomputeReport {
            customer,
            entries: outcome.rows.len(),
            rewritten: outcome.rewritten,
            balance,
        })
    }

    /// Checks the stored balances of a customer without changing anything.
    pub fn audit(&self, customer: CustomerId) -> Result<()> {
        let rows = self.store.list_by_customer(customer)?;
        let nets: Vec<_> = rows.iter().map(P::net).collect();
        let balances: Vec<_> = rows.iter().map(P::balance).collect();
        balance::verify(&nets, &balances).map_err(|e| self.inconsistent(customer, e))
    }

    /// Reads one record.
    pub fn get(&self, id: EntryId) -> Result<P::View> {
        self.store
            .get(id)?
            .map(|row| row.view())
            .ok_or(LedgerError::EntryNotFound {
                ledger: P::LEDGER,
                id,
            })
    }

    pub(crate) fn ensure_customer(&self, customer: CustomerId) -> Result<()> {
        if self.directory.customer_exists(customer) {
            Ok(())
        } else {
            Err(LedgerError::CustomerNotFound { id: customer })
        }
    }

    fn ensure_funding(&self, funding: Option<FundingRef>) -> Result<()> {
        match funding {
            Some(funding) if !self.directory.funding_source_exists(funding) => Err(
                LedgerError::validation("funding_ref", format!("unknown funding source {funding}")),
            ),
            _ => Ok(()),
        }
    }

    fn committed<'a>(&self, outcome: &'a Outcome<P>, customer: CustomerId, id: EntryId) -> Result<&'a P> {
        outcome.row(id).ok_or_else(|| self.missing(customer, id))
    }

    fn missing(&self, customer: CustomerId, id: EntryId) -> LedgerError {
        LedgerError::Consistency {
            ledger: P::LEDGER,
            customer,
            reason: format!("entry {id} missing after commit"),
        }
    }

    fn inconsistent(&self, customer: CustomerId, error: BalanceError) -> LedgerError {
        LedgerError::Consistency {
            ledger: P::LEDGER,
            customer,
            reason: error.to_string(),
        }
    }

    /// Runs one unit of work under the customer's lock.
    ///
    /// `plan` sees the current rows and returns the change to make, or
    /// `None` to stop without writing. Conflicting commits are retried up to
    /// `max_commit_attempts` times with a fresh snapshot.
    fn mutate<F>(&self, customer: CustomerId, mut plan: F) -> Result<Option<Outcome<P>>>
    where
        F: FnMut(&[P]) -> Result<Option<Change<P>>>,
    {
        self.locks.with_customer(customer, || {
            let mut attempt = 1;
            loop {
                let snapshot = self.store.snapshot(customer)?;
                let Some(change) = plan(&snapshot.rows)? else {
                    return Ok(None);
                };

                let rows = self.stage(customer, &snapshot.rows, change)?;
                let batch = diff(customer, snapshot.generation, &snapshot.rows, &rows);
                let rewritten = batch.len();

                if batch.is_empty() {
                    return Ok(Some(Outcome { rows, rewritten }));
                }

                match self.store.commit(batch) {
                    Ok(()) => {
                        let rows = self.verify_committed(customer, &snapshot.rows)?;
                        return Ok(Some(Outcome { rows, rewritten }));
                    }
                    Err(e @ LedgerError::Conflict { .. })
                        if attempt >= self.config.max_commit_attempts =>
                    {
                        warn!(
                            "{} customer {}: giving up after {} conflicting commits",
                            P::LEDGER,
                            customer,
                            attempt
                        );
                        return Err(e);
                    }
                    Err(LedgerError::Conflict { .. }) => {
                        debug!(
                            "{} customer {}: commit conflict on attempt {}, retrying",
                            P::LEDGER,
                            customer,
                            attempt
                        );
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!(
                            "{} customer {}: commit failed, nothing applied: {}",
                            P::LEDGER,
                            customer,
                            e
                        );
                        return Err(e);
                    }
                }
            }
        })
    }

    /// Reads back the customer's committed history and checks every stored
    /// balance against the prefix sum of the nets.
    ///
    /// On failure the rows in `before` are written back and `Consistency`
    /// is returned.
    fn verify_committed(&self, customer: CustomerId, before: &[P]) -> Result<Vec<P>> {
        let committed = self.store.snapshot(customer)?;
        let nets: Vec<_> = committed.rows.iter().map(P::net).collect();
        let balances: Vec<_> = committed.rows.iter().map(P::balance).collect();
        let Err(e) = balance::verify(&nets, &balances) else {
            return Ok(committed.rows);
        };

        error!(
            "{} customer {}: committed history fails the balance check: {}",
            P::LEDGER,
            customer,
            e
        );
        let restore = diff(customer, committed.generation, &committed.rows, before);
        match self.store.commit(restore) {
            Ok(()) => warn!(
                "{} customer {}: restored the history read before the commit",
                P::LEDGER,
                customer
            ),
            Err(restore_error) => error!(
                "{} customer {}: could not restore previous history: {}",
                P::LEDGER,
                customer,
                restore_error
            ),
        }
        Err(self.inconsistent(customer, e))
    }

    /// Applies `change` to a copy of `rows` and recomputes balances if needed.
    fn stage(&self, customer: CustomerId, rows: &[P], change: Change<P>) -> Result<Vec<P>> {
        let mut staged = rows.to_vec();
        let reflow = match change {
            Change::Insert(row) => {
                staged.push(row);
                Reflow::Required
            }
            Change::Replace(row, reflow) => {
                let id = row.id();
                match staged.iter_mut().find(|existing| existing.id() == id) {
                    Some(slot) => *slot = row,
                    None => {
                        return Err(LedgerError::EntryNotFound {
                            ledger: P::LEDGER,
                            id,
                        })
                    }
                }
                reflow
            }
            Change::Remove(id) => {
                staged.retain(|row| row.id() != id);
                Reflow::Required
            }
            Change::Rebalance => Reflow::Required,
        };

        staged.sort_by_key(P::order_key);
        if reflow == Reflow::Required {
            self.rebalance(customer, &mut staged)?;
        }
        Ok(staged)
    }

    /// One full prefix-sum pass over the ordered rows.
    fn rebalance(&self, customer: CustomerId, rows: &mut [P]) -> Result<()> {
        let balances = balance::running_balances(rows.iter().map(P::net))
            .map_err(|e| self.inconsistent(customer, e))?;
        for (row, balance) in rows.iter_mut().zip(balances) {
            row.set_balance(balance);
        }
        Ok(())
    }
}

/// Builds the batch turning `before` into `after`.
fn diff<P: Posting>(
    customer: CustomerId,
    generation: u64,
    before: &[P],
    after: &[P],
) -> WriteBatch<P> {
    let mut batch = WriteBatch::guarded(customer, generation);
    let previous: HashMap<EntryId, &P> = before.iter().map(|row| (row.id(), row)).collect();
    let kept: HashMap<EntryId, &P> = after.iter().map(|row| (row.id(), row)).collect();

    for row in before {
        if !kept.contains_key(&row.id()) {
            batch.delete(row.id());
        }
    }
    for row in after {
        match previous.get(&row.id()) {
            None => batch.insert(row.clone()),
            Some(old) if *old != row => batch.update(row.clone()),
            Some(_) => {}
        }
    }

    batch
}
