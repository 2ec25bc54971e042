use serde::{Deserialize, Serialize};

use crate::domain::basket::LineItemId;
use crate::domain::rule::RuleId;
use crate::money::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountTarget {
    Cart,
    Line(LineItemId),
    Shipping,
}

/// The monetary effect of one rule on one target, produced fresh each pricing
/// pass. Persisting these (as `orderDiscount`/`basketDiscount` rows) is the
/// caller's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountApplication {
    pub rule_id: RuleId,
    pub target: DiscountTarget,
    pub amount: Money,
}
