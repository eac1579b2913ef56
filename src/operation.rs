//! Operation models for CSV replay.

use crate::decimal::{Grams, Money};
use crate::engine::{EntryChanges, EntryRequest, LedgerKind, Target};
use crate::entry::{check_raw_amount, CustomerId, EntryId};
use crate::trade::NewTrade;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Raw operation record as read from CSV.
///
/// Every column except `op` is optional; which ones are required depends on
/// the operation. Amounts stay strings until the operation is known.
#[derive(Debug, Deserialize)]
pub struct OperationRecord {
    /// append, amend, retract, trade or recompute
    pub op: String,

    /// currency or gold (trade for recompute of the trade log)
    pub ledger: Option<String>,

    pub customer: Option<u32>,

    /// Engine-assigned id of the entry to amend or retract
    pub entry: Option<u64>,

    /// Ledger inflow, or the trade's currency in
    pub received: Option<String>,

    /// Ledger outflow, or the trade's currency out
    pub paid: Option<String>,

    /// Trade gold in (grams)
    pub commodity_received: Option<String>,

    /// Trade gold out (grams)
    pub commodity_paid: Option<String>,

    pub note: Option<String>,

    /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
    pub occurred_at: Option<String>,

    /// Gold purity in carats
    pub purity: Option<String>,
}

/// A parsed operation ready to run against the engine.
#[derive(Debug, Clone)]
pub enum ParsedOperation {
    Append {
        kind: LedgerKind,
        request: EntryRequest,
    },
    Amend {
        kind: LedgerKind,
        id: EntryId,
        changes: EntryChanges,
    },
    Retract {
        kind: LedgerKind,
        id: EntryId,
    },
    Trade(NewTrade),
    Recompute {
        target: Target,
        customer: CustomerId,
    },
}

impl OperationRecord {
    /// Parses the raw CSV record into a typed operation.
    pub fn parse(&self) -> Result<ParsedOperation, String> {
        let op = self.op.trim().to_lowercase();

        match op.as_str() {
            "append" => Ok(ParsedOperation::Append {
                kind: self.kind()?,
                request: EntryRequest {
                    customer_id: self.customer()?,
                    funding_ref: None,
                    received: amount(&self.received, "received")?.unwrap_or_default(),
                    paid: amount(&self.paid, "paid")?.unwrap_or_default(),
                    note: self.note.clone().unwrap_or_default(),
                    occurred_at: self.occurred_at()?,
                    purity_carat: amount(&self.purity, "purity")?,
                },
            }),
            "amend" => Ok(ParsedOperation::Amend {
                kind: self.kind()?,
                id: self.entry()?,
                changes: EntryChanges {
                    funding_ref: None,
                    received: amount(&self.received, "received")?,
                    paid: amount(&self.paid, "paid")?,
                    note: text(&self.note),
                    occurred_at: self.occurred_at()?,
                    purity_carat: amount(&self.purity, "purity")?,
                },
            }),
            "retract" => Ok(ParsedOperation::Retract {
                kind: self.kind()?,
                id: self.entry()?,
            }),
            "trade" => {
                let mut trade = NewTrade::new(self.customer()?, self.note.clone().unwrap_or_default());
                trade.currency_in = Money::new(leg(&self.received, "received")?);
                trade.currency_out = Money::new(leg(&self.paid, "paid")?);
                trade.commodity_in = Grams::new(leg(&self.commodity_received, "commodity_received")?);
                trade.commodity_out = Grams::new(leg(&self.commodity_paid, "commodity_paid")?);
                trade.occurred_at = self.occurred_at()?;
                Ok(ParsedOperation::Trade(trade))
            }
            "recompute" => {
                let ledger = text(&self.ledger).ok_or("missing ledger")?;
                Ok(ParsedOperation::Recompute {
                    target: Target::from_str(&ledger)?,
                    customer: self.customer()?,
                })
            }
            other => Err(format!("unknown operation {other:?}")),
        }
    }

    fn kind(&self) -> Result<LedgerKind, String> {
        let ledger = text(&self.ledger).ok_or("missing ledger")?;
        LedgerKind::from_str(&ledger)
    }

    fn customer(&self) -> Result<CustomerId, String> {
        self.customer
            .map(CustomerId)
            .ok_or_else(|| "missing customer".to_string())
    }

    fn entry(&self) -> Result<EntryId, String> {
        self.entry
            .map(EntryId)
            .ok_or_else(|| "missing entry id".to_string())
    }

    fn occurred_at(&self) -> Result<Option<NaiveDateTime>, String> {
        text(&self.occurred_at).map(|raw| timestamp(&raw)).transpose()
    }
}

/// Trimmed, non-empty field value.
fn text(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn amount(field: &Option<String>, name: &str) -> Result<Option<Decimal>, String> {
    text(field)
        .map(|raw| Decimal::from_str(&raw).map_err(|e| format!("bad {name} {raw:?}: {e}")))
        .transpose()
}

/// Trade leg amount; blank is zero, negatives are refused before rounding.
fn leg(field: &Option<String>, name: &'static str) -> Result<Decimal, String> {
    let value = amount(field, name)?.unwrap_or_default();
    check_raw_amount(name, value).map_err(|e| e.to_string())?;
    Ok(value)
}

fn timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(at);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("bad timestamp {raw:?}"))
}
