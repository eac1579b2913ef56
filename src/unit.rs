//! Commodity units tracked by the engine.
//!
//! A [`Unit`] fixes the decimal precision of a ledger and the extra,
//! informational attributes its entries carry. Both commodity ledgers share
//! one generic implementation parameterized by these markers.

use crate::error::{LedgerError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Marker trait for a commodity unit.
pub trait Unit:
    Copy + Debug + Default + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Sync + 'static
{
    /// Number of fractional digits kept for quantities of this unit.
    const SCALE: u32;

    /// Ledger name used in logs and error messages.
    const NAME: &'static str;

    /// Per-entry attributes that never take part in balance math.
    type Attrs: Clone + Debug + Default + PartialEq + Send + Sync + Serialize;

    /// Checks attribute values before they reach the store.
    fn validate_attrs(attrs: &Self::Attrs) -> Result<()>;

    /// Builds attributes from an untyped purity value.
    fn attrs_from_purity(purity_carat: Option<Decimal>) -> Result<Self::Attrs>;

    fn purity_of(_attrs: &Self::Attrs) -> Option<Decimal> {
        None
    }
}

/// Currency ledger (US dollars, 2 fractional digits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency;

impl Unit for Currency {
    const SCALE: u32 = 2;
    const NAME: &'static str = "currency";
    type Attrs = ();

    fn validate_attrs(_attrs: &()) -> Result<()> {
        Ok(())
    }

    fn attrs_from_purity(purity_carat: Option<Decimal>) -> Result<()> {
        match purity_carat {
            Some(_) => Err(LedgerError::validation(
                "purity_carat",
                "not applicable to the currency ledger",
            )),
            None => Ok(()),
        }
    }
}

/// Weighed-gold ledger (grams, 3 fractional digits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gold;

/// Extra attributes of a gold entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoldAttrs {
    /// Assayed purity in carats, `0..=24`.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub purity_carat: Option<Decimal>,
}

impl GoldAttrs {
    pub fn with_purity(carat: Decimal) -> Self {
        GoldAttrs {
            purity_carat: Some(carat.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)),
        }
    }
}

impl Unit for Gold {
    const SCALE: u32 = 3;
    const NAME: &'static str = "gold";
    type Attrs = GoldAttrs;

    fn validate_attrs(attrs: &GoldAttrs) -> Result<()> {
        match attrs.purity_carat {
            Some(carat) if carat.is_sign_negative() && !carat.is_zero() => Err(
                LedgerError::validation("purity_carat", format!("{carat} is negative")),
            ),
            Some(carat) if carat > Decimal::from(24) => Err(LedgerError::validation(
                "purity_carat",
                format!("{carat} exceeds 24 carat"),
            )),
            _ => Ok(()),
        }
    }

    fn attrs_from_purity(purity_carat: Option<Decimal>) -> Result<GoldAttrs> {
        let attrs = purity_carat.map(GoldAttrs::with_purity).unwrap_or_default();
        Self::validate_attrs(&attrs)?;
        Ok(attrs)
    }

    fn purity_of(attrs: &GoldAttrs) -> Option<Decimal> {
        attrs.purity_carat
    }
}
