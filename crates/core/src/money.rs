use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ISO 4217 currency code. The exponent lookup covers the zero- and
/// three-decimal currencies; everything else uses two minor-unit digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(pub String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_ascii_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of minor-unit digits for this currency.
    pub fn exponent(&self) -> u32 {
        match self.0.as_str() {
            "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
            | "UGX" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
            "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("amount overflow in {currency} arithmetic")]
    Overflow { currency: Currency },
}

/// Monetary amount in integer minor units tagged with its currency.
///
/// All arithmetic stays in minor units; conversion to a decimal representation
/// happens only in `Display`, which exists for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(minor_units: i64, currency: Currency) -> Self {
        Self { minor_units, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { minor_units: 0, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let minor_units = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or_else(|| MoneyError::Overflow { currency: self.currency.clone() })?;
        Ok(Money { minor_units, currency: self.currency.clone() })
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let minor_units = self
            .minor_units
            .checked_sub(other.minor_units)
            .ok_or_else(|| MoneyError::Overflow { currency: self.currency.clone() })?;
        Ok(Money { minor_units, currency: self.currency.clone() })
    }

    pub fn times(&self, quantity: u32) -> Result<Money, MoneyError> {
        let minor_units = self
            .minor_units
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| MoneyError::Overflow { currency: self.currency.clone() })?;
        Ok(Money { minor_units, currency: self.currency.clone() })
    }

    /// Applies a percentage rate (`10` means 10%) and rounds the result
    /// half-up to minor units. Midpoint-away-from-zero keeps rounding
    /// symmetric for credits and debits.
    pub fn apply_percent(&self, percent: Decimal) -> Result<Money, MoneyError> {
        let raw = Decimal::from(self.minor_units) * percent / Decimal::ONE_HUNDRED;
        let rounded = raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let minor_units = rounded
            .to_i64()
            .ok_or_else(|| MoneyError::Overflow { currency: self.currency.clone() })?;
        Ok(Money { minor_units, currency: self.currency.clone() })
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exponent = self.currency.exponent();
        if exponent == 0 {
            return write!(f, "{} {}", self.currency, self.minor_units);
        }
        let scale = 10_i64.pow(exponent);
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let major = (self.minor_units / scale).abs();
        let minor = (self.minor_units % scale).abs();
        write!(f, "{} {sign}{major}.{minor:0width$}", self.currency, width = exponent as usize)
    }
}
