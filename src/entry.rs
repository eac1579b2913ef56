//! Ledger entry model shared by the currency and gold ledgers.

use crate::balance::RunningTotal;
use crate::decimal::Quantity;
use crate::error::{LedgerError, Result};
use crate::unit::Unit;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique, strictly increasing record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque customer reference. Customers are owned by an external directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub u32);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Weak reference to an external capital record. Reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FundingRef(pub u32);

impl fmt::Display for FundingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a record in its customer's history.
pub type OrderKey = (NaiveDateTime, EntryId);

/// Whether an amendment moved flows or order, so balances must be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflow {
    Required,
    NotNeeded,
}

/// A record kept in a running-balance book.
///
/// Implemented by [`LedgerEntry`] and [`TradeRecord`](crate::trade::TradeRecord).
/// The coordinator is written once against this trait.
pub trait Posting: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Balance type; one quantity, or a pair for the trade log.
    type Total: RunningTotal + Send + Sync;
    /// Caller input for a new record.
    type Draft;
    /// Caller input for a partial update.
    type Amendment: Clone;
    /// Read model handed back to callers.
    type View: Serialize;

    /// Name used in logs and errors.
    const LEDGER: &'static str;

    /// Checks a draft without touching the store.
    fn validate_draft(draft: &Self::Draft) -> Result<()>;

    /// Checks an amendment without touching the store.
    fn validate_amendment(amendment: &Self::Amendment) -> Result<()>;

    fn draft_customer(draft: &Self::Draft) -> CustomerId;

    /// Funding source a draft refers to, checked before an id is allocated.
    fn draft_funding(_draft: &Self::Draft) -> Option<FundingRef> {
        None
    }

    /// Balance a producer computed on its own. Never trusted.
    fn reported_total(_draft: &Self::Draft) -> Option<Self::Total> {
        None
    }

    /// Builds the record. `now` fills a missing timestamp.
    fn create(id: EntryId, draft: Self::Draft, now: NaiveDateTime) -> Self;

    /// Applies a validated amendment in place.
    fn amend(&mut self, amendment: Self::Amendment) -> Reflow;

    fn id(&self) -> EntryId;
    fn customer_id(&self) -> CustomerId;
    fn occurred_at(&self) -> NaiveDateTime;

    fn funding_ref(&self) -> Option<FundingRef> {
        None
    }

    /// `received - paid` for every leg.
    fn net(&self) -> Self::Total;
    fn balance(&self) -> Self::Total;
    fn set_balance(&mut self, balance: Self::Total);
    fn view(&self) -> Self::View;

    fn order_key(&self) -> OrderKey {
        (self.occurred_at(), self.id())
    }
}

/// Rejects negative flow magnitudes.
pub(crate) fn check_magnitude<U: Unit>(field: &'static str, amount: Quantity<U>) -> Result<()> {
    if amount.is_negative() {
        return Err(LedgerError::validation(
            field,
            format!("{amount} is negative"),
        ));
    }
    Ok(())
}

/// Rejects a raw amount below zero before it is rounded to a unit's scale.
pub(crate) fn check_raw_amount(field: &'static str, amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::validation(
            field,
            format!("{amount} is negative"),
        ));
    }
    Ok(())
}

/// Rejects notes that are empty after trimming.
pub(crate) fn check_note(note: &str) -> Result<()> {
    if note.trim().is_empty() {
        return Err(LedgerError::validation("note", "must not be empty"));
    }
    Ok(())
}

/// One inflow/outflow record of a commodity ledger.
///
/// `balance` is derived: the engine recomputes it after every mutation of the
/// customer's history, callers can only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry<U: Unit> {
    id: EntryId,
    customer_id: CustomerId,
    funding_ref: Option<FundingRef>,
    received: Quantity<U>,
    paid: Quantity<U>,
    note: String,
    occurred_at: NaiveDateTime,
    attrs: U::Attrs,
    balance: Quantity<U>,
}

impl<U: Unit> LedgerEntry<U> {
    pub fn received(&self) -> Quantity<U> {
        self.received
    }

    pub fn paid(&self) -> Quantity<U> {
        self.paid
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn attrs(&self) -> &U::Attrs {
        &self.attrs
    }
}

/// Input for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewEntry<U: Unit> {
    pub customer_id: CustomerId,
    pub funding_ref: Option<FundingRef>,
    pub received: Quantity<U>,
    pub paid: Quantity<U>,
    pub note: String,
    /// Defaults to the current local time.
    pub occurred_at: Option<NaiveDateTime>,
    pub attrs: U::Attrs,
}

impl<U: Unit> NewEntry<U> {
    pub fn new(
        customer_id: CustomerId,
        received: Quantity<U>,
        paid: Quantity<U>,
        note: impl Into<String>,
    ) -> Self {
        NewEntry {
            customer_id,
            funding_ref: None,
            received,
            paid,
            note: note.into(),
            occurred_at: None,
            attrs: U::Attrs::default(),
        }
    }

    pub fn at(mut self, occurred_at: NaiveDateTime) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn funded_by(mut self, funding_ref: FundingRef) -> Self {
        self.funding_ref = Some(funding_ref);
        self
    }

    pub fn with_attrs(mut self, attrs: U::Attrs) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Partial update of a ledger entry. `None` leaves a field untouched.
///
/// `funding_ref: Some(None)` clears the funding reference.
#[derive(Debug, Clone, Default)]
pub struct EntryAmendment<U: Unit> {
    pub funding_ref: Option<Option<FundingRef>>,
    pub received: Option<Quantity<U>>,
    pub paid: Option<Quantity<U>>,
    pub note: Option<String>,
    pub occurred_at: Option<NaiveDateTime>,
    pub attrs: Option<U::Attrs>,
}

impl<U: Unit> EntryAmendment<U> {
    pub fn flows(received: Quantity<U>, paid: Quantity<U>) -> Self {
        EntryAmendment {
            received: Some(received),
            paid: Some(paid),
            ..Default::default()
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        EntryAmendment {
            note: Some(note.into()),
            ..Default::default()
        }
    }
}

/// Serializable snapshot of a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    pub ledger: &'static str,
    pub id: EntryId,
    pub customer_id: CustomerId,
    pub funding_ref: Option<FundingRef>,
    #[serde(with = "rust_decimal::serde::str")]
    pub received: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub paid: Decimal,
    pub note: String,
    pub occurred_at: NaiveDateTime,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub purity_carat: Option<Decimal>,
}

impl<U: Unit> Posting for LedgerEntry<U> {
    type Total = Quantity<U>;
    type Draft = NewEntry<U>;
    type Amendment = EntryAmendment<U>;
    type View = EntryView;

    const LEDGER: &'static str = U::NAME;

    fn validate_draft(draft: &NewEntry<U>) -> Result<()> {
        check_magnitude("received", draft.received)?;
        check_magnitude("paid", draft.paid)?;
        check_note(&draft.note)?;
        U::validate_attrs(&draft.attrs)
    }

    fn validate_amendment(amendment: &EntryAmendment<U>) -> Result<()> {
        if let Some(received) = amendment.received {
            check_magnitude("received", received)?;
        }
        if let Some(paid) = amendment.paid {
            check_magnitude("paid", paid)?;
        }
        if let Some(note) = &amendment.note {
            check_note(note)?;
        }
        if let Some(attrs) = &amendment.attrs {
            U::validate_attrs(attrs)?;
        }
        Ok(())
    }

    fn draft_customer(draft: &NewEntry<U>) -> CustomerId {
        draft.customer_id
    }

    fn draft_funding(draft: &NewEntry<U>) -> Option<FundingRef> {
        draft.funding_ref
    }

    fn create(id: EntryId, draft: NewEntry<U>, now: NaiveDateTime) -> Self {
        LedgerEntry {
            id,
            customer_id: draft.customer_id,
            funding_ref: draft.funding_ref,
            received: draft.received,
            paid: draft.paid,
            note: draft.note.trim().to_string(),
            occurred_at: draft.occurred_at.unwrap_or(now),
            attrs: draft.attrs,
            balance: Quantity::ZERO,
        }
    }

    fn amend(&mut self, amendment: EntryAmendment<U>) -> Reflow {
        let before = (self.received, self.paid, self.occurred_at);

        if let Some(funding_ref) = amendment.funding_ref {
            self.funding_ref = funding_ref;
        }
        if let Some(received) = amendment.received {
            self.received = received;
        }
        if let Some(paid) = amendment.paid {
            self.paid = paid;
        }
        if let Some(note) = amendment.note {
            self.note = note.trim().to_string();
        }
        if let Some(occurred_at) = amendment.occurred_at {
            self.occurred_at = occurred_at;
        }
        if let Some(attrs) = amendment.attrs {
            self.attrs = attrs;
        }

        if before == (self.received, self.paid, self.occurred_at) {
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

    fn funding_ref(&self) -> Option<FundingRef> {
        self.funding_ref
    }

    fn net(&self) -> Quantity<U> {
        self.received - self.paid
    }

    fn balance(&self) -> Quantity<U> {
        self.balance
    }

    fn set_balance(&mut self, balance: Quantity<U>) {
        self.balance = balance;
    }

    fn view(&self) -> EntryView {
        EntryView {
            ledger: U::NAME,
            id: self.id,
            customer_id: self.customer_id,
            funding_ref: self.funding_ref,
            received: self.received.value(),
            paid: self.paid.value(),
            note: self.note.clone(),
            occurred_at: self.occurred_at,
            balance: self.balance.value(),
            purity_carat: U::purity_of(&self.attrs),
        }
    }
}
