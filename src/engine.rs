//! Ledger engine facade.
//!
//! Owns the currency ledger, the gold ledger and the trade log, dispatches
//! untyped requests to the right book, and replays operations from CSV.

use crate::config::EngineConfig;
use crate::coordinator::{Ledger, TradeLog};
use crate::decimal::{Grams, Money, Quantity};
use crate::directory::{CustomerDirectory, OpenDirectory};
use crate::entry::{
    check_raw_amount, CustomerId, EntryAmendment, EntryId, EntryView, FundingRef, NewEntry,
};
use crate::error::{LedgerError, Result};
use crate::operation::{OperationRecord, ParsedOperation};
use crate::store::EntryStore;
use crate::trade::{NewTrade, TradeAmendment, TradeView};
use crate::unit::{Currency, Gold, Unit};
use crate::view::{HistoryQuery, Page};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, Trim};
use log::{debug, error, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

/// Runs `$body` with `$ledger` bound to the book selected by `$kind`.
macro_rules! on_ledger {
    ($engine:expr, $kind:expr, $ledger:ident => $body:expr) => {
        match $kind {
            LedgerKind::Currency => {
                let $ledger = &$engine.currency;
                $body
            }
            LedgerKind::Gold => {
                let $ledger = &$engine.gold;
                $body
            }
        }
    };
}

/// Which single-unit ledger a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerKind {
    Currency,
    Gold,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Currency => f.write_str(Currency::NAME),
            LedgerKind::Gold => f.write_str(Gold::NAME),
        }
    }
}

impl FromStr for LedgerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "currency" | "money" | "cash" => Ok(LedgerKind::Currency),
            "gold" => Ok(LedgerKind::Gold),
            other => Err(format!("unknown ledger {other:?}")),
        }
    }
}

/// Book addressed by a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Ledger(LedgerKind),
    Trades,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trade" | "trades" => Ok(Target::Trades),
            other => LedgerKind::from_str(other).map(Target::Ledger),
        }
    }
}

/// Unit-agnostic append request. Amounts are rounded to the target ledger's
/// scale on the way in.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub customer_id: CustomerId,
    pub funding_ref: Option<FundingRef>,
    pub received: Decimal,
    pub paid: Decimal,
    pub note: String,
    pub occurred_at: Option<NaiveDateTime>,
    /// Gold only; rejected by the currency ledger.
    pub purity_carat: Option<Decimal>,
}

impl EntryRequest {
    pub fn new(customer_id: CustomerId, received: Decimal, paid: Decimal, note: impl Into<String>) -> Self {
        EntryRequest {
            customer_id,
            funding_ref: None,
            received,
            paid,
            note: note.into(),
            occurred_at: None,
            purity_carat: None,
        }
    }

    pub fn at(mut self, occurred_at: NaiveDateTime) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    fn draft<U: Unit>(self) -> Result<NewEntry<U>> {
        check_raw_amount("received", self.received)?;
        check_raw_amount("paid", self.paid)?;
        Ok(NewEntry {
            customer_id: self.customer_id,
            funding_ref: self.funding_ref,
            received: Quantity::new(self.received),
            paid: Quantity::new(self.paid),
            note: self.note,
            occurred_at: self.occurred_at,
            attrs: U::attrs_from_purity(self.purity_carat)?,
        })
    }
}

/// Unit-agnostic partial update. `funding_ref: Some(None)` clears the reference.
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    pub funding_ref: Option<Option<FundingRef>>,
    pub received: Option<Decimal>,
    pub paid: Option<Decimal>,
    pub note: Option<String>,
    pub occurred_at: Option<NaiveDateTime>,
    pub purity_carat: Option<Decimal>,
}

impl EntryChanges {
    fn amendment<U: Unit>(self) -> Result<EntryAmendment<U>> {
        if let Some(received) = self.received {
            check_raw_amount("received", received)?;
        }
        if let Some(paid) = self.paid {
            check_raw_amount("paid", paid)?;
        }
        let attrs = match self.purity_carat {
            Some(carat) => Some(U::attrs_from_purity(Some(carat))?),
            None => None,
        };
        Ok(EntryAmendment {
            funding_ref: self.funding_ref,
            received: self.received.map(Quantity::new),
            paid: self.paid.map(Quantity::new),
            note: self.note,
            occurred_at: self.occurred_at,
            attrs,
        })
    }
}

/// Current balances of one customer across every book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerBalances {
    pub customer: CustomerId,
    pub currency: Money,
    pub gold: Grams,
    pub trade_currency: Money,
    pub trade_gold: Grams,
}

/// The ledger engine.
///
/// The three books share one customer directory and one configuration but
/// keep separate stores and separate id sequences.
pub struct LedgerEngine {
    currency: Ledger<Currency>,
    gold: Ledger<Gold>,
    trades: TradeLog,
}

impl LedgerEngine {
    /// Engine over in-memory stores that accepts every customer.
    pub fn new() -> Self {
        Self::build(Arc::new(OpenDirectory), EngineConfig::default())
    }

    /// Engine checking customers and funding sources against `directory`.
    pub fn with_directory(directory: Arc<dyn CustomerDirectory>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(directory, config))
    }

    fn build(directory: Arc<dyn CustomerDirectory>, config: EngineConfig) -> Self {
        LedgerEngine {
            currency: Ledger::in_memory(Arc::clone(&directory), config.clone()),
            gold: Ledger::in_memory(Arc::clone(&directory), config.clone()),
            trades: TradeLog::in_memory(directory, config),
        }
    }

    pub fn currency(&self) -> &Ledger<Currency> {
        &self.currency
    }

    pub fn gold(&self) -> &Ledger<Gold> {
        &self.gold
    }

    pub fn trades(&self) -> &TradeLog {
        &self.trades
    }

    pub fn append_entry(&self, kind: LedgerKind, request: EntryRequest) -> Result<EntryView> {
        on_ledger!(self, kind, ledger => ledger.append(request.draft()?))
    }

    pub fn amend_entry(&self, kind: LedgerKind, id: EntryId, changes: EntryChanges) -> Result<EntryView> {
        on_ledger!(self, kind, ledger => ledger.amend(id, changes.amendment()?))
    }

    /// Returns `false` when the ledger has no entry with this id.
    pub fn retract_entry(&self, kind: LedgerKind, id: EntryId) -> Result<bool> {
        on_ledger!(self, kind, ledger => ledger.retract(id))
    }

    pub fn get_entry(&self, kind: LedgerKind, id: EntryId) -> Result<EntryView> {
        on_ledger!(self, kind, ledger => ledger.get(id))
    }

    pub fn get_balance(&self, kind: LedgerKind, customer: CustomerId) -> Result<Decimal> {
        on_ledger!(self, kind, ledger => ledger.balance(customer).map(|balance| balance.value()))
    }

    pub fn list_entries(
        &self,
        kind: LedgerKind,
        customer: CustomerId,
        query: &HistoryQuery,
    ) -> Result<Page<EntryView>> {
        on_ledger!(self, kind, ledger => ledger.history(customer, query))
    }

    pub fn append_trade(&self, trade: NewTrade) -> Result<TradeView> {
        self.trades.append(trade)
    }

    pub fn amend_trade(&self, id: EntryId, amendment: TradeAmendment) -> Result<TradeView> {
        self.trades.amend(id, amendment)
    }

    pub fn retract_trade(&self, id: EntryId) -> Result<bool> {
        self.trades.retract(id)
    }

    /// Recomputes one book for a customer. Returns the number of rows whose
    /// stored balance was rewritten.
    pub fn recompute(&self, target: Target, customer: CustomerId) -> Result<usize> {
        let rewritten = match target {
            Target::Ledger(kind) => {
                on_ledger!(self, kind, ledger => ledger.recompute(customer)?.rewritten)
            }
            Target::Trades => self.trades.recompute(customer)?.rewritten,
        };
        Ok(rewritten)
    }

    pub fn customer_balances(&self, customer: CustomerId) -> Result<CustomerBalances> {
        let trade = self.trades.balance(customer)?;
        Ok(CustomerBalances {
            customer,
            currency: self.currency.balance(customer)?,
            gold: self.gold.balance(customer)?,
            trade_currency: trade.currency,
            trade_gold: trade.commodity,
        })
    }

    /// Every customer with at least one record in any book, ascending.
    pub fn customers(&self) -> Result<Vec<CustomerId>> {
        let mut customers = BTreeSet::new();
        customers.extend(self.currency.store().customers()?);
        customers.extend(self.gold.store().customers()?);
        customers.extend(self.trades.store().customers()?);
        Ok(customers.into_iter().collect())
    }

    /// Replays operations from a CSV reader.
    ///
    /// Records are applied one at a time in file order. Rejected or
    /// malformed records are logged at warn level and skipped. Store and
    /// consistency failures are logged at error level.
    pub fn process_csv<R: Read>(&self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (row_idx, result) in csv_reader.deserialize::<OperationRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            match result {
                Ok(record) => match record.parse() {
                    Ok(operation) => {
                        match self.process_operation(operation, row_num) {
                            Ok(()) => {}
                            Err(e) if e.is_rejection() => warn!("Row {}: {}", row_num, e),
                            Err(e) => error!("Row {}: {}, skipped", row_num, e),
                        }
                    }
                    Err(message) => {
                        warn!(
                            "{}",
                            LedgerError::InvalidRecord {
                                row: row_num,
                                message
                            }
                        );
                    }
                },
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                }
            }
        }

        Ok(())
    }

    fn process_operation(&self, operation: ParsedOperation, row: usize) -> Result<()> {
        match operation {
            ParsedOperation::Append { kind, request } => {
                let entry = self.append_entry(kind, request)?;
                debug!(
                    "Row {}: appended {} entry {}, balance {}",
                    row, kind, entry.id, entry.balance
                );
            }
            ParsedOperation::Amend { kind, id, changes } => {
                let entry = self.amend_entry(kind, id, changes)?;
                debug!(
                    "Row {}: amended {} entry {}, balance {}",
                    row, kind, id, entry.balance
                );
            }
            ParsedOperation::Retract { kind, id } => {
                if self.retract_entry(kind, id)? {
                    debug!("Row {}: retracted {} entry {}", row, kind, id);
                } else {
                    debug!("Row {}: no {} entry {}, ignoring retract", row, kind, id);
                }
            }
            ParsedOperation::Trade(trade) => {
                let trade = self.append_trade(trade)?;
                debug!(
                    "Row {}: recorded trade {}, balances {} / {}g",
                    row, trade.id, trade.currency_balance, trade.commodity_balance
                );
            }
            ParsedOperation::Recompute { target, customer } => {
                let rewritten = self.recompute(target, customer)?;
                if rewritten > 0 {
                    warn!(
                        "Row {}: recompute of customer {} rewrote {} drifted balances",
                        row, customer, rewritten
                    );
                }
            }
        }

        Ok(())
    }

    /// Writes final balances to CSV.
    ///
    /// Output is sorted by customer id in ascending order. Currency columns
    /// carry 2 decimal places, gold columns 3.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["customer", "currency", "gold", "trade_currency", "trade_gold"])?;

        for customer in self.customers()? {
            let balances = self.customer_balances(customer)?;
            csv_writer.write_record([
                balances.customer.to_string(),
                balances.currency.to_string(),
                balances.gold.to_string(),
                balances.trade_currency.to_string(),
                balances.trade_gold.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}
