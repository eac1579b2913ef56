//! Library-level tests of the ledger coordinators.

use chrono::{NaiveDate, NaiveDateTime};
use commodity_ledger::store::{Snapshot, Write};
use commodity_ledger::{
    Coordinator, Currency, CustomerId, DateRange, EngineConfig, EntryAmendment, EntryId, EntryStore,
    FundingRef, Grams, HistoryQuery, Ledger, LedgerEngine, LedgerEntry, LedgerError, MemoryStore,
    Money, NewEntry, NewTrade, OpenDirectory, Posting, Registry, TradeAmendment, TradeBalance,
    TradeLog, WriteBatch,
};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

type CurrencyRow = LedgerEntry<Currency>;

fn money(s: &str) -> Money {
    Money::from_str(s).unwrap()
}

fn grams(s: &str) -> Grams {
    Grams::from_str(s).unwrap()
}

fn day(d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, d)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn deposit(customer: u32, amount: &str, at: NaiveDateTime) -> NewEntry<Currency> {
    NewEntry::new(CustomerId(customer), money(amount), Money::ZERO, "deposit").at(at)
}

fn withdrawal(customer: u32, amount: &str, at: NaiveDateTime) -> NewEntry<Currency> {
    NewEntry::new(CustomerId(customer), Money::ZERO, money(amount), "withdrawal").at(at)
}

/// Balances of a customer's currency history in ledger order.
fn balances(engine: &LedgerEngine, customer: u32) -> Vec<String> {
    engine
        .currency()
        .store()
        .list_by_customer(CustomerId(customer))
        .unwrap()
        .iter()
        .map(|row| row.balance().to_string())
        .collect()
}

#[test]
fn test_append_amend_retract_walkthrough() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    let first = ledger.append(deposit(1, "100", day(1))).unwrap();
    let second = ledger.append(withdrawal(1, "30", day(2))).unwrap();
    assert_eq!(second.balance.to_string(), "70.00");

    ledger
        .amend(first.id, EntryAmendment::flows(money("80"), Money::ZERO))
        .unwrap();
    assert_eq!(balances(&engine, 1), vec!["80.00", "50.00"]);

    assert!(ledger.retract(first.id).unwrap());
    assert_eq!(balances(&engine, 1), vec!["-30.00"]);
    assert_eq!(ledger.balance(CustomerId(1)).unwrap(), money("-30"));
    ledger.audit(CustomerId(1)).unwrap();
}

#[test]
fn test_back_dated_append_shifts_later_balances() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    ledger.append(deposit(1, "100", day(10))).unwrap();
    ledger.append(withdrawal(1, "40", day(20))).unwrap();
    let early = ledger.append(deposit(1, "5", day(5))).unwrap();

    assert_eq!(early.balance.to_string(), "5.00");
    assert_eq!(balances(&engine, 1), vec!["5.00", "105.00", "65.00"]);
}

#[test]
fn test_retract_shifts_only_later_entries() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    ledger.append(deposit(1, "100", day(1))).unwrap();
    let middle = ledger.append(withdrawal(1, "25.5", day(2))).unwrap();
    ledger.append(deposit(1, "10", day(3))).unwrap();
    ledger.append(withdrawal(1, "4", day(4))).unwrap();
    assert_eq!(balances(&engine, 1), vec!["100.00", "74.50", "84.50", "80.50"]);

    assert!(ledger.retract(middle.id).unwrap());
    assert_eq!(balances(&engine, 1), vec!["100.00", "110.00", "106.00"]);
}

#[test]
fn test_moving_an_entry_in_time_reorders_history() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    ledger.append(deposit(1, "100", day(1))).unwrap();
    let fee = ledger.append(withdrawal(1, "10", day(2))).unwrap();
    ledger.append(deposit(1, "50", day(3))).unwrap();

    let moved = EntryAmendment {
        occurred_at: Some(day(4)),
        ..Default::default()
    };
    let fee = ledger.amend(fee.id, moved).unwrap();

    assert_eq!(fee.balance.to_string(), "140.00");
    assert_eq!(balances(&engine, 1), vec!["100.00", "150.00", "140.00"]);
}

#[test]
fn test_same_timestamp_orders_by_id() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    let a = ledger.append(deposit(1, "1", day(1))).unwrap();
    let b = ledger.append(deposit(1, "2", day(1))).unwrap();

    assert!(a.id < b.id);
    assert_eq!(a.balance.to_string(), "1.00");
    assert_eq!(b.balance.to_string(), "3.00");
}

#[test]
fn test_note_only_amend_keeps_balances() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    let entry = ledger.append(deposit(1, "12.34", day(1))).unwrap();
    let renamed = ledger
        .amend(entry.id, EntryAmendment::note("  salary  "))
        .unwrap();

    assert_eq!(renamed.note, "salary");
    assert_eq!(renamed.balance, entry.balance);
}

#[test]
fn test_empty_history_has_zero_balance() {
    let engine = LedgerEngine::new();
    assert!(engine.currency().balance(CustomerId(9)).unwrap().is_zero());
    assert!(engine.gold().balance(CustomerId(9)).unwrap().is_zero());
    assert_eq!(
        engine.trades().balance(CustomerId(9)).unwrap(),
        TradeBalance::default()
    );

    let report = engine.currency().recompute(CustomerId(9)).unwrap();
    assert_eq!(report.entries, 0);
    assert_eq!(report.rewritten, 0);
}

#[test]
fn test_unknown_ids() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    match ledger.amend(EntryId(77), EntryAmendment::note("x")) {
        Err(LedgerError::EntryNotFound { id, .. }) => assert_eq!(id, EntryId(77)),
        other => panic!("Expected EntryNotFound, got {:?}", other),
    }
    assert!(!ledger.retract(EntryId(77)).unwrap());
    assert!(ledger.get(EntryId(77)).is_err());
}

#[test]
fn test_rejected_input_leaves_store_untouched() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();
    let entry = ledger.append(deposit(1, "10", day(1))).unwrap();

    let negative = NewEntry::new(CustomerId(1), money("-1"), Money::ZERO, "oops");
    assert!(matches!(
        ledger.append(negative),
        Err(LedgerError::Validation { .. })
    ));

    let blank = EntryAmendment::<Currency> {
        note: Some("   ".into()),
        ..Default::default()
    };
    assert!(matches!(
        ledger.amend(entry.id, blank),
        Err(LedgerError::Validation { .. })
    ));

    assert_eq!(ledger.store().len(), 1);
    assert_eq!(ledger.get(entry.id).unwrap().note, "deposit");
}

#[test]
fn test_failed_commit_rolls_back() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();
    let first = ledger.append(deposit(1, "100", day(2))).unwrap();
    ledger.append(withdrawal(1, "30", day(3))).unwrap();

    ledger.store().fail_next_commits(1);
    let err = ledger.append(deposit(1, "5", day(1))).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(balances(&engine, 1), vec!["100.00", "70.00"]);

    ledger.store().fail_next_commits(1);
    assert!(ledger.retract(first.id).is_err());
    assert_eq!(balances(&engine, 1), vec!["100.00", "70.00"]);

    ledger.store().fail_next_commits(1);
    assert!(ledger
        .amend(first.id, EntryAmendment::flows(money("1"), Money::ZERO))
        .is_err());
    assert_eq!(balances(&engine, 1), vec!["100.00", "70.00"]);

    // The store recovers once the fault clears.
    ledger.append(deposit(1, "5", day(1))).unwrap();
    assert_eq!(balances(&engine, 1), vec!["5.00", "105.00", "75.00"]);
}

#[test]
fn test_recompute_repairs_drifted_rows() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();
    ledger.append(deposit(1, "100", day(1))).unwrap();
    let second = ledger.append(withdrawal(1, "30", day(2))).unwrap();

    let mut row = ledger.store().get(second.id).unwrap().unwrap();
    row.set_balance(money("999"));
    ledger.store().update(row).unwrap();

    assert!(matches!(
        ledger.audit(CustomerId(1)),
        Err(LedgerError::Consistency { .. })
    ));

    let report = ledger.recompute(CustomerId(1)).unwrap();
    assert_eq!(report.entries, 2);
    assert_eq!(report.rewritten, 1);
    assert_eq!(report.balance, money("70"));
    ledger.audit(CustomerId(1)).unwrap();

    let again = ledger.recompute(CustomerId(1)).unwrap();
    assert_eq!(again.rewritten, 0);
}

#[test]
fn test_concurrent_writers_on_one_customer() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    thread::scope(|scope| {
        for worker in 0..8u32 {
            scope.spawn(move || {
                for i in 0..25u32 {
                    let at = day(1 + (worker * 3 + i) % 28);
                    ledger.append(deposit(1, "1.25", at)).unwrap();
                }
            });
        }
    });

    assert_eq!(ledger.store().len(), 200);
    assert_eq!(ledger.balance(CustomerId(1)).unwrap(), money("250"));
    ledger.audit(CustomerId(1)).unwrap();
}

#[test]
fn test_customers_do_not_share_history() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();

    thread::scope(|scope| {
        for customer in 1..=4u32 {
            scope.spawn(move || {
                for d in 1..=10 {
                    ledger.append(deposit(customer, "2", day(d))).unwrap();
                }
                ledger.append(withdrawal(customer, "1", day(5))).unwrap();
            });
        }
    });

    for customer in 1..=4 {
        assert_eq!(ledger.balance(CustomerId(customer)).unwrap(), money("19"));
        ledger.audit(CustomerId(customer)).unwrap();
    }
}

#[test]
fn test_registry_checks_customers_and_funding() {
    let registry = Arc::new(Registry::new());
    registry.register_customer(CustomerId(1));
    registry.register_funding_source(FundingRef(10));

    let gold: Ledger<commodity_ledger::Gold> =
        Ledger::in_memory(registry.clone(), EngineConfig::default());

    let unknown = NewEntry::new(CustomerId(2), grams("1"), Grams::ZERO, "bar");
    assert!(matches!(
        gold.append(unknown),
        Err(LedgerError::CustomerNotFound { .. })
    ));
    assert!(matches!(
        gold.balance(CustomerId(2)),
        Err(LedgerError::CustomerNotFound { .. })
    ));

    let unfunded = NewEntry::new(CustomerId(1), grams("1"), Grams::ZERO, "bar").funded_by(FundingRef(11));
    assert!(matches!(
        gold.append(unfunded),
        Err(LedgerError::Validation { field: "funding_ref", .. })
    ));

    let funded = NewEntry::new(CustomerId(1), grams("1"), Grams::ZERO, "bar").funded_by(FundingRef(10));
    let entry = gold.append(funded).unwrap();
    assert_eq!(entry.funding_ref, Some(FundingRef(10)));
    // Rejected appends never allocate an id.
    assert_eq!(entry.id, EntryId(1));

    let rerouted = EntryAmendment {
        funding_ref: Some(Some(FundingRef(12))),
        ..Default::default()
    };
    assert!(gold.amend(entry.id, rerouted).is_err());
    assert_eq!(gold.get(entry.id).unwrap().funding_ref, Some(FundingRef(10)));

    let cleared = EntryAmendment {
        funding_ref: Some(None),
        ..Default::default()
    };
    let view = gold.amend(entry.id, cleared).unwrap();
    assert_eq!(view.funding_ref, None);
    assert_eq!(view.balance.to_string(), "1.000");
    assert_eq!(gold.get(entry.id).unwrap().funding_ref, None);
}

#[test]
fn test_trade_reported_balance_is_recomputed() {
    let trades = TradeLog::in_memory(Arc::new(OpenDirectory), EngineConfig::default());

    trades
        .append(NewTrade::buy(CustomerId(1), money("650"), grams("10"), "buy 10g").at(day(1)))
        .unwrap();

    let mut sell = NewTrade::sell(CustomerId(1), money("320.5"), grams("5"), "sell 5g").at(day(2));
    sell.reported_balance = Some(TradeBalance::new(money("1"), grams("1")));
    let view = trades.append(sell).unwrap();

    assert_eq!(view.currency_balance, money("329.50"));
    assert_eq!(view.commodity_balance, grams("-5"));

    let early = NewTrade::sell(CustomerId(1), money("100"), grams("2"), "early sale").at(day(1) - chrono::Duration::hours(1));
    trades.append(early).unwrap();
    assert_eq!(
        trades.balance(CustomerId(1)).unwrap(),
        TradeBalance::new(money("229.50"), grams("-3"))
    );
    trades.audit(CustomerId(1)).unwrap();
}

#[test]
fn test_history_pagination_and_filters() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();
    for d in 1..=25 {
        ledger.append(deposit(1, "1", day(d))).unwrap();
    }

    let first = ledger.history(CustomerId(1), &HistoryQuery::default()).unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_items, 25);
    assert_eq!(first.total_pages(), 3);
    assert_eq!(first.items[0].occurred_at, day(25));
    assert_eq!(first.items[0].balance.to_string(), "25.00");

    let last = ledger.history(CustomerId(1), &HistoryQuery::page(3, 10)).unwrap();
    assert_eq!(last.items.len(), 5);
    assert_eq!(last.items[4].occurred_at, day(1));

    let range = DateRange::new(day(5).date(), day(7).date()).unwrap();
    let window = ledger
        .history(CustomerId(1), &HistoryQuery::page(1, 100).within(range).oldest_first())
        .unwrap();
    let days: Vec<_> = window.items.iter().map(|e| e.occurred_at).collect();
    assert_eq!(days, vec![day(5), day(6), day(7)]);

    assert!(ledger.history(CustomerId(1), &HistoryQuery::page(0, 10)).is_err());
    assert!(ledger.history(CustomerId(1), &HistoryQuery::page(1, 101)).is_err());

    let beyond = ledger.history(CustomerId(1), &HistoryQuery::page(9, 10)).unwrap();
    assert!(beyond.items.is_empty());
}

#[test]
fn test_customer_balances_span_all_books() {
    let engine = LedgerEngine::new();
    engine.currency().append(deposit(3, "10", day(1))).unwrap();
    engine
        .gold()
        .append(NewEntry::new(CustomerId(3), grams("2.5"), Grams::ZERO, "bar").at(day(1)))
        .unwrap();
    engine
        .append_trade(NewTrade::buy(CustomerId(4), money("65"), grams("1"), "buy").at(day(1)))
        .unwrap();

    assert_eq!(engine.customers().unwrap(), vec![CustomerId(3), CustomerId(4)]);

    let three = engine.customer_balances(CustomerId(3)).unwrap();
    assert_eq!(three.currency, money("10"));
    assert_eq!(three.gold, grams("2.5"));
    assert!(three.trade_currency.is_zero());
}

#[test]
fn test_trade_amend_and_retract_rebalance_both_legs() {
    let engine = LedgerEngine::new();
    let buy = engine
        .append_trade(NewTrade::buy(CustomerId(1), money("650"), grams("10"), "buy 10g").at(day(1)))
        .unwrap();
    let sell = engine
        .append_trade(NewTrade::sell(CustomerId(1), money("320.5"), grams("5"), "sell 5g").at(day(2)))
        .unwrap();
    assert_eq!(sell.currency_balance, money("329.50"));
    assert_eq!(sell.commodity_balance, grams("-5"));

    let repriced = TradeAmendment {
        currency_in: Some(money("600")),
        ..Default::default()
    };
    let view = engine.amend_trade(buy.id, repriced).unwrap();
    assert_eq!(view.currency_balance, money("600"));
    assert_eq!(view.commodity_balance, grams("-10"));
    let later = engine.trades().get(sell.id).unwrap();
    assert_eq!(later.currency_balance, money("279.50"));
    assert_eq!(later.commodity_balance, grams("-5"));

    let renamed = TradeAmendment {
        note: Some("spot buy".to_string()),
        ..Default::default()
    };
    let view = engine.amend_trade(buy.id, renamed).unwrap();
    assert_eq!(view.note, "spot buy");
    assert_eq!(view.currency_balance, money("600"));

    let moved = TradeAmendment {
        occurred_at: Some(day(3)),
        ..Default::default()
    };
    engine.amend_trade(buy.id, moved).unwrap();
    let first = engine.trades().get(sell.id).unwrap();
    assert_eq!(first.currency_balance, money("-320.50"));
    assert_eq!(first.commodity_balance, grams("5"));

    assert!(engine.retract_trade(buy.id).unwrap());
    assert!(!engine.retract_trade(buy.id).unwrap());
    assert_eq!(
        engine.trades().balance(CustomerId(1)).unwrap(),
        TradeBalance::new(money("-320.5"), grams("5"))
    );
    assert!(matches!(
        engine.amend_trade(buy.id, TradeAmendment::default()),
        Err(LedgerError::EntryNotFound { .. })
    ));
    engine.trades().audit(CustomerId(1)).unwrap();
}

#[test]
fn test_concurrent_amends_and_appends_on_one_customer() {
    let engine = LedgerEngine::new();
    let ledger = engine.currency();
    let ids: Vec<EntryId> = (1..=20)
        .map(|d| ledger.append(deposit(1, "1", day(d))).unwrap().id)
        .collect();

    thread::scope(|scope| {
        for chunk in ids.chunks(5) {
            scope.spawn(move || {
                for id in chunk {
                    ledger
                        .amend(*id, EntryAmendment::flows(money("2"), Money::ZERO))
                        .unwrap();
                }
            });
        }
        scope.spawn(move || {
            for d in 1..=10 {
                ledger.append(withdrawal(1, "0.5", day(d))).unwrap();
            }
        });
    });

    assert_eq!(ledger.store().len(), 30);
    assert_eq!(ledger.balance(CustomerId(1)).unwrap(), money("35"));
    ledger.audit(CustomerId(1)).unwrap();
}

#[test]
fn test_coordinators_sharing_a_store_retry_conflicts() {
    let store: Arc<MemoryStore<CurrencyRow>> = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        max_commit_attempts: 1000,
        ..EngineConfig::default()
    };
    let left: Coordinator<CurrencyRow> =
        Coordinator::new(Arc::clone(&store), Arc::new(OpenDirectory), config.clone());
    let right: Coordinator<CurrencyRow> =
        Coordinator::new(Arc::clone(&store), Arc::new(OpenDirectory), config);

    thread::scope(|scope| {
        for worker in 0..4u32 {
            let ledger = if worker % 2 == 0 { &left } else { &right };
            scope.spawn(move || {
                for i in 0..25u32 {
                    ledger.append(deposit(1, "1", day(1 + (worker + i) % 28))).unwrap();
                }
            });
        }
    });

    assert_eq!(store.len(), 100);
    assert_eq!(left.balance(CustomerId(1)).unwrap(), money("100"));
    assert_eq!(right.balance(CustomerId(1)).unwrap(), money("100"));
    left.audit(CustomerId(1)).unwrap();
}

/// Memory store whose commits lose a configurable number of races.
struct ContendedStore {
    inner: MemoryStore<CurrencyRow>,
    conflicts: AtomicUsize,
    commits: AtomicUsize,
}

impl ContendedStore {
    fn new(conflicts: usize) -> Self {
        ContendedStore {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(conflicts),
            commits: AtomicUsize::new(0),
        }
    }
}

impl EntryStore<CurrencyRow> for ContendedStore {
    fn next_id(&self) -> commodity_ledger::Result<EntryId> {
        self.inner.next_id()
    }

    fn get(&self, id: EntryId) -> commodity_ledger::Result<Option<CurrencyRow>> {
        self.inner.get(id)
    }

    fn snapshot(&self, customer: CustomerId) -> commodity_ledger::Result<Snapshot<CurrencyRow>> {
        self.inner.snapshot(customer)
    }

    fn commit(&self, batch: WriteBatch<CurrencyRow>) -> commodity_ledger::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let lost = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if lost {
            return Err(LedgerError::Conflict {
                customer: batch.customer(),
            });
        }
        self.inner.commit(batch)
    }

    fn customers(&self) -> commodity_ledger::Result<Vec<CustomerId>> {
        self.inner.customers()
    }
}

fn contended(conflicts: usize) -> (Arc<ContendedStore>, Coordinator<CurrencyRow, ContendedStore>) {
    let store = Arc::new(ContendedStore::new(conflicts));
    let config = EngineConfig {
        max_commit_attempts: 3,
        ..EngineConfig::default()
    };
    let ledger = Coordinator::new(Arc::clone(&store), Arc::new(OpenDirectory), config);
    (store, ledger)
}

#[test]
fn test_conflicting_commit_is_retried() {
    let (store, ledger) = contended(2);

    let view = ledger.append(deposit(1, "12.5", day(1))).unwrap();
    assert_eq!(view.balance.to_string(), "12.50");
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    ledger.audit(CustomerId(1)).unwrap();
}

#[test]
fn test_commit_attempts_are_bounded() {
    let (store, ledger) = contended(usize::MAX);

    match ledger.append(deposit(1, "12.5", day(1))) {
        Err(LedgerError::Conflict { customer }) => assert_eq!(customer, CustomerId(1)),
        other => panic!("Expected Conflict, got {:?}", other),
    }
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    assert!(store.inner.is_empty());
}

/// Memory store that persists a wrong balance on every written row once skewed.
struct SkewedStore {
    inner: MemoryStore<CurrencyRow>,
    skewed: AtomicBool,
}

impl EntryStore<CurrencyRow> for SkewedStore {
    fn next_id(&self) -> commodity_ledger::Result<EntryId> {
        self.inner.next_id()
    }

    fn get(&self, id: EntryId) -> commodity_ledger::Result<Option<CurrencyRow>> {
        self.inner.get(id)
    }

    fn snapshot(&self, customer: CustomerId) -> commodity_ledger::Result<Snapshot<CurrencyRow>> {
        self.inner.snapshot(customer)
    }

    fn commit(&self, batch: WriteBatch<CurrencyRow>) -> commodity_ledger::Result<()> {
        if !self.skewed.load(Ordering::SeqCst) {
            return self.inner.commit(batch);
        }

        let customer = batch.customer();
        let mut skewed = match batch.expected_generation() {
            Some(generation) => WriteBatch::guarded(customer, generation),
            None => WriteBatch::new(customer),
        };
        for write in batch.into_writes() {
            match write {
                Write::Insert(mut row) => {
                    row.set_balance(money("999"));
                    skewed.insert(row);
                }
                Write::Update(mut row) => {
                    row.set_balance(money("999"));
                    skewed.update(row);
                }
                Write::Delete(id) => skewed.delete(id),
            }
        }
        self.inner.commit(skewed)
    }

    fn customers(&self) -> commodity_ledger::Result<Vec<CustomerId>> {
        self.inner.customers()
    }
}

#[test]
fn test_committed_history_is_checked() {
    let store = Arc::new(SkewedStore {
        inner: MemoryStore::new(),
        skewed: AtomicBool::new(false),
    });
    let ledger: Coordinator<CurrencyRow, SkewedStore> =
        Coordinator::new(Arc::clone(&store), Arc::new(OpenDirectory), EngineConfig::default());
    let first = ledger.append(deposit(1, "100", day(1))).unwrap();
    ledger.append(withdrawal(1, "30", day(2))).unwrap();

    store.skewed.store(true, Ordering::SeqCst);
    match ledger.append(deposit(1, "5", day(3))) {
        Err(LedgerError::Consistency { customer, .. }) => assert_eq!(customer, CustomerId(1)),
        other => panic!("Expected Consistency, got {:?}", other),
    }
    // The rejected row is removed again; the earlier history is untouched.
    assert_eq!(store.inner.len(), 2);
    ledger.audit(CustomerId(1)).unwrap();

    let mut drifted = store.inner.get(first.id).unwrap().unwrap();
    drifted.set_balance(money("1"));
    store.inner.update(drifted).unwrap();
    assert!(matches!(
        ledger.recompute(CustomerId(1)),
        Err(LedgerError::Consistency { .. })
    ));
    assert!(ledger.audit(CustomerId(1)).is_err());
}
