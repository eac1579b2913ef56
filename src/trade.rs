//! Combined buy/sell records carrying a currency leg and a gold leg.
//!
//! A trade keeps one running balance per leg. Both legs are summed in the
//! same pass over the same ordered history, so the pair always describes the
//! same prefix of trades.

use crate::balance::RunningTotal;
use crate::decimal::{Grams, Money};
use crate::entry::{check_magnitude, check_note, CustomerId, EntryId, Posting, Reflow};
use crate::error::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Running balance pair of the trade log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TradeBalance {
    pub currency: Money,
    pub commodity: Grams,
}

impl TradeBalance {
    pub fn new(currency: Money, commodity: Grams) -> Self {
        TradeBalance {
            currency,
            commodity,
        }
    }
}

impl fmt::Display for TradeBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}g", self.currency, self.commodity)
    }
}

impl RunningTotal for TradeBalance {
    fn zero() -> Self {
        TradeBalance::default()
    }

    fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(TradeBalance {
            currency: self.currency.checked_add(rhs.currency)?,
            commodity: self.commodity.checked_add(rhs.commodity)?,
        })
    }
}

/// One buy/sell event.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    id: EntryId,
    customer_id: CustomerId,
    currency_in: Money,
    currency_out: Money,
    commodity_in: Grams,
    commodity_out: Grams,
    note: String,
    occurred_at: NaiveDateTime,
    balance: TradeBalance,
}

impl TradeRecord {
    pub fn currency_in(&self) -> Money {
        self.currency_in
    }

    pub fn currency_out(&self) -> Money {
        self.currency_out
    }

    pub fn commodity_in(&self) -> Grams {
        self.commodity_in
    }

    pub fn commodity_out(&self) -> Grams {
        self.commodity_out
    }

    pub fn note(&self) -> &str {
        &self.note
    }
}

/// Input for appending a trade.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub customer_id: CustomerId,
    pub currency_in: Money,
    pub currency_out: Money,
    pub commodity_in: Grams,
    pub commodity_out: Grams,
    pub note: String,
    pub occurred_at: Option<NaiveDateTime>,
    /// Balance computed by an upstream producer. Compared against the
    /// engine's own result and then discarded.
    pub reported_balance: Option<TradeBalance>,
}

impl NewTrade {
    pub fn new(customer_id: CustomerId, note: impl Into<String>) -> Self {
        NewTrade {
            customer_id,
            currency_in: Money::ZERO,
            currency_out: Money::ZERO,
            commodity_in: Grams::ZERO,
            commodity_out: Grams::ZERO,
            note: note.into(),
            occurred_at: None,
            reported_balance: None,
        }
    }

    /// Customer buys gold: pays currency in, receives gold out.
    pub fn buy(customer_id: CustomerId, price: Money, weight: Grams, note: impl Into<String>) -> Self {
        NewTrade {
            currency_in: price,
            commodity_out: weight,
            ..NewTrade::new(customer_id, note)
        }
    }

    /// Customer sells gold: hands gold in, receives currency out.
    pub fn sell(customer_id: CustomerId, price: Money, weight: Grams, note: impl Into<String>) -> Self {
        NewTrade {
            currency_out: price,
            commodity_in: weight,
            ..NewTrade::new(customer_id, note)
        }
    }

    pub fn at(mut self, occurred_at: NaiveDateTime) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// Partial update of a trade. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TradeAmendment {
    pub currency_in: Option<Money>,
    pub currency_out: Option<Money>,
    pub commodity_in: Option<Grams>,
    pub commodity_out: Option<Grams>,
    pub note: Option<String>,
    pub occurred_at: Option<NaiveDateTime>,
}

/// Serializable snapshot of a trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeView {
    pub id: EntryId,
    pub customer_id: CustomerId,
    pub currency_in: Money,
    pub currency_out: Money,
    pub commodity_in: Grams,
    pub commodity_out: Grams,
    pub note: String,
    pub occurred_at: NaiveDateTime,
    pub currency_balance: Money,
    pub commodity_balance: Grams,
}

impl Posting for TradeRecord {
    type Total = TradeBalance;
    type Draft = NewTrade;
    type Amendment = TradeAmendment;
    type View = TradeView;

    const LEDGER: &'static str = "trade";

    fn validate_draft(draft: &NewTrade) -> Result<()> {
        check_magnitude("currency_in", draft.currency_in)?;
        check_magnitude("currency_out", draft.currency_out)?;
        check_magnitude("commodity_in", draft.commodity_in)?;
        check_magnitude("commodity_out", draft.commodity_out)?;
        check_note(&draft.note)
    }

    fn validate_amendment(amendment: &TradeAmendment) -> Result<()> {
        if let Some(amount) = amendment.currency_in {
            check_magnitude("currency_in", amount)?;
        }
        if let Some(amount) = amendment.currency_out {
            check_magnitude("currency_out", amount)?;
        }
        if let Some(amount) = amendment.commodity_in {
            check_magnitude("commodity_in", amount)?;
        }
        if let Some(amount) = amendment.commodity_out {
            check_magnitude("commodity_out", amount)?;
        }
        if let Some(note) = &amendment.note {
            check_note(note)?;
        }
        Ok(())
    }

    fn draft_customer(draft: &NewTrade) -> CustomerId {
        draft.customer_id
    }

    fn reported_total(draft: &NewTrade) -> Option<TradeBalance> {
        draft.reported_balance
    }

    fn create(id: EntryId, draft: NewTrade, now: NaiveDateTime) -> Self {
        TradeRecord {
            id,
            customer_id: draft.customer_id,
            currency_in: draft.currency_in,
            currency_out: draft.currency_out,
            commodity_in: draft.commodity_in,
            commodity_out: draft.commodity_out,
            note: draft.note.trim().to_string(),
            occurred_at: draft.occurred_at.unwrap_or(now),
            balance: TradeBalance::default(),
        }
    }

    fn amend(&mut self, amendment: TradeAmendment) -> Reflow {
        let before = (self.net(), self.occurred_at);

        if let Some(amount) = amendment.currency_in {
            self.currency_in = amount;
        }
        if let Some(amount) = amendment.currency_out {
            self.currency_out = amount;
        }
        if let Some(amount) = amendment.commodity_in {
            self.commodity_in = amount;
        }
        if let Some(amount) = amendment.commodity_out {
            self.commodity_out = amount;
        }
        if let Some(note) = amendment.note {
            self.note = note.trim().to_string();
        }
        if let Some(occurred_at) = amendment.occurred_at {
            self.occurred_at = occurred_at;
        }

        if before == (self.net(), self.occurred_at) {
            Reflow::NotNeeded
        } else {
            Reflow::Required
        }
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    fn occurred_at(&self) -> NaiveDateTime {
        self.occurred_at
    }

    fn net(&self) -> TradeBalance {
        TradeBalance {
            currency: self.currency_in - self.currency_out,
            commodity: self.commodity_in - self.commodity_out,
        }
    }

    fn balance(&self) -> TradeBalance {
        self.balance
    }

    fn set_balance(&mut self, balance: TradeBalance) {
        self.balance = balance;
    }

    fn view(&self) -> TradeView {
        TradeView {
            id: self.id,
            customer_id: self.customer_id,
            currency_in: self.currency_in,
            currency_out: self.currency_out,
            commodity_in: self.commodity_in,
            commodity_out: self.commodity_out,
            note: self.note.clone(),
            occurred_at: self.occurred_at,
            currency_balance: self.balance.currency,
            commodity_balance: self.balance.commodity,
        }
    }
}
