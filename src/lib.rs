//! # Commodity Ledger
//!
//! Running-balance bookkeeping for a currency ledger, a gold ledger and a
//! two-legged trade log.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: currency at 2 decimal places, gold at 3, via `rust_decimal`
//! - **Strict invariants**: every stored balance equals the sum of net flows up to and
//!   including its record, in `(occurred_at, id)` order
//! - **Atomic mutations**: append, amend, retract and recompute commit as one batch or not at all
//! - **Deterministic output**: customers sorted by id
//!
//! ## Example
//!
//! ```no_run
//! use commodity_ledger::LedgerEngine;
//! use std::io::Cursor;
//!
//! let csv = "op,ledger,customer,received,note\nappend,currency,1,100.0,deposit\n";
//! let engine = LedgerEngine::new();
//! engine.process_csv(Cursor::new(csv)).unwrap();
//! engine.write_output(std::io::stdout()).unwrap();
//! ```

pub mod balance;
pub mod config;
pub mod coordinator;
pub mod decimal;
pub mod directory;
pub mod engine;
pub mod entry;
pub mod error;
pub mod locks;
pub mod operation;
pub mod store;
pub mod trade;
pub mod unit;
pub mod view;

pub use balance::{running_balances, BalanceError, RunningTotal};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, Ledger, RecomputeReport, TradeLog};
pub use decimal::{Grams, Money, Quantity};
pub use directory::{CustomerDirectory, OpenDirectory, Registry};
pub use engine::{CustomerBalances, EntryChanges, EntryRequest, LedgerEngine, LedgerKind, Target};
pub use entry::{
    CustomerId, EntryAmendment, EntryId, EntryView, FundingRef, LedgerEntry, NewEntry, Posting,
};
pub use error::{LedgerError, Result};
pub use operation::{OperationRecord, ParsedOperation};
pub use store::{EntryStore, MemoryStore, WriteBatch};
pub use trade::{NewTrade, TradeAmendment, TradeBalance, TradeRecord, TradeView};
pub use unit::{Currency, Gold, GoldAttrs, Unit};
pub use view::{DateRange, HistoryQuery, Page, SortOrder};
