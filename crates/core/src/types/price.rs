//! Type-safe price representation using decimal arithmetic.
//!
//! Catalog prices and order totals are stored in major units (dollars,
//! naira) as exact decimals. Payment providers want integer minor units, so
//! [`Price::to_minor_units`] performs that conversion once, in one place.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors converting a price to a provider amount.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amount is zero or negative where a positive amount is required.
    #[error("amount must be positive")]
    NotPositive,
    /// Amount has more than two decimal places.
    #[error("amount has more than two decimal places")]
    TooPrecise,
    /// Amount does not fit in an `i64` of minor units.
    #[error("amount is too large")]
    Overflow,
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Amount in minor units (cents, kobo) as payment providers expect.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if the amount is not positive, has sub-cent
    /// precision, or overflows `i64`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        if self.amount <= Decimal::ZERO {
            return Err(MoneyError::NotPositive);
        }
        if self.amount.normalize().scale() > 2 {
            return Err(MoneyError::TooPrecise);
        }
        self.amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.to_i64())
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency_code)
    }
}

/// ISO 4217 currency codes accepted by the configured payment providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    NGN,
    GHS,
    KES,
    ZAR,
}

impl CurrencyCode {
    /// Upper-case ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::NGN => "NGN",
            Self::GHS => "GHS",
            Self::KES => "KES",
            Self::ZAR => "ZAR",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "NGN" => Ok(Self::NGN),
            "GHS" => Ok(Self::GHS),
            "KES" => Ok(Self::KES),
            "ZAR" => Ok(Self::ZAR),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}
