//! Read-only customer queries: current balance and paginated history.

use crate::balance::RunningTotal;
use crate::coordinator::Coordinator;
use crate::entry::{CustomerId, Posting};
use crate::error::{LedgerError, Result};
use crate::store::EntryStore;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Inclusive calendar-day range. `to` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(LedgerError::validation(
                "date_range",
                format!("{from} is after {to}"),
            ));
        }
        Ok(DateRange { from, to })
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let day = at.date();
        self.from <= day && day <= self.to
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recent first, the order statements are read in.
    #[default]
    NewestFirst,
    OldestFirst,
}

/// History filter and pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub range: Option<DateRange>,
    /// 1-based page number.
    pub page: usize,
    /// Falls back to the configured default when `None`.
    pub page_size: Option<usize>,
    pub order: SortOrder,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        HistoryQuery {
            range: None,
            page: 1,
            page_size: None,
            order: SortOrder::default(),
        }
    }
}

impl HistoryQuery {
    pub fn page(page: usize, page_size: usize) -> Self {
        HistoryQuery {
            page,
            page_size: Some(page_size),
            ..Default::default()
        }
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }
}

/// One page of history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    /// Matching records across all pages.
    pub total_items: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.page_size)
    }
}

impl<P: Posting, S: EntryStore<P>> Coordinator<P, S> {
    /// Current balance: the balance of the customer's latest record, zero
    /// when there is none.
    pub fn balance(&self, customer: CustomerId) -> Result<P::Total> {
        self.ensure_customer(customer)?;
        let rows = self.store().list_by_customer(customer)?;
        Ok(rows
            .last()
            .map(P::balance)
            .unwrap_or_else(<P::Total as RunningTotal>::zero))
    }

    /// Filtered, paginated history of one customer.
    pub fn history(&self, customer: CustomerId, query: &HistoryQuery) -> Result<Page<P::View>> {
        if query.page == 0 {
            return Err(LedgerError::validation("page", "pages start at 1"));
        }
        let page_size = query.page_size.unwrap_or(self.config().default_page_size);
        if page_size == 0 || page_size > self.config().max_page_size {
            return Err(LedgerError::validation(
                "page_size",
                format!("must be between 1 and {}", self.config().max_page_size),
            ));
        }
        self.ensure_customer(customer)?;

        let mut rows = self.store().list_by_customer(customer)?;
        if let Some(range) = query.range {
            rows.retain(|row| range.contains(row.occurred_at()));
        }
        if query.order == SortOrder::NewestFirst {
            rows.reverse();
        }

        let total_items = rows.len();
        let items = rows
            .iter()
            .skip((query.page - 1).saturating_mul(page_size))
            .take(page_size)
            .map(P::view)
            .collect();

        Ok(Page {
            items,
            page: query.page,
            page_size,
            total_items,
        })
    }
}
