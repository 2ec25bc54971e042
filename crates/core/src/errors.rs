use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::basket::{BasketId, LineItemId};
use crate::domain::rule::RuleId;
use crate::money::{Currency, MoneyError};

/// Fatal pricing failures. A basket that trips one of these cannot be priced
/// at all; the caller owns the user-facing messaging.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidBasketError {
    #[error("basket {basket_id:?} has no line items")]
    EmptyBasket { basket_id: BasketId },
    #[error("basket {basket_id:?} line {line_id:?} is priced in {found}, basket currency is {expected}")]
    CurrencyMismatch {
        basket_id: BasketId,
        line_id: LineItemId,
        expected: Currency,
        found: Currency,
    },
    #[error("basket {basket_id:?} shipping is priced in {found}, basket currency is {expected}")]
    ShippingCurrencyMismatch { basket_id: BasketId, expected: Currency, found: Currency },
    #[error("basket {basket_id:?} line {line_id:?} has zero quantity")]
    ZeroQuantity { basket_id: BasketId, line_id: LineItemId },
    #[error("basket {basket_id:?} line {line_id:?} has a negative unit price")]
    NegativeUnitPrice { basket_id: BasketId, line_id: LineItemId },
    #[error("basket {basket_id:?} has a negative shipping amount")]
    NegativeShipping { basket_id: BasketId },
    #[error("amount arithmetic failed: {0}")]
    Arithmetic(#[from] MoneyError),
}

/// Outer error type for callers that layer pricing into a larger flow.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error(transparent)]
    InvalidBasket(#[from] InvalidBasketError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDiagnosticKind {
    /// Condition tree contained a predicate kind this engine does not know.
    UnsupportedPredicate,
    /// Stored rule row could not be decoded into the typed representation.
    MalformedRule,
    /// Rule action carried an amount in a currency other than the basket's.
    CurrencyMismatch,
    /// Discount exceeded a cap or a remaining balance and was clamped.
    CapClamped,
    /// Candidate rejected because a non-combinable discount was already admitted.
    ExclusivityRejected,
    /// Candidate rejected by the per-basket coupon limit.
    CouponLimitRejected,
    /// Every target of the candidate was already discounted to zero.
    TargetExhausted,
}

/// Non-fatal pricing observation. A malformed rule never aborts checkout;
/// it is skipped and surfaced here for observability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDiagnostic {
    pub rule_id: Option<RuleId>,
    pub kind: RuleDiagnosticKind,
    pub detail: String,
}

impl RuleDiagnostic {
    pub fn new(
        rule_id: Option<RuleId>,
        kind: RuleDiagnosticKind,
        detail: impl Into<String>,
    ) -> Self {
        Self { rule_id, kind, detail: detail.into() }
    }
}
