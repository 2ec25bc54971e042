use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::basket::{CategoryId, CustomerGroupId, CustomerId, ProductId};
use crate::money::Money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// Coupon rules require a customer-entered code upstream and are limited per
/// basket; promotion rules apply automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Coupon,
    Promotion,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Products(Vec<ProductId>),
    Categories(Vec<CategoryId>),
    Customers(Vec<CustomerId>),
    CustomerGroups(Vec<CustomerGroupId>),
}

/// Leaf predicate of a rule condition tree.
///
/// Stored rows may carry predicate kinds this engine release does not know.
/// Deserialization keeps them as `Unsupported` instead of rejecting the whole
/// rule set; the evaluator fails closed on such leaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    ProductInSet { products: Vec<ProductId> },
    CategoryInSet { categories: Vec<CategoryId> },
    CustomerGroupInSet { groups: Vec<CustomerGroupId> },
    QuantityAtLeast { units: u32 },
    QuantityAtMost { units: u32 },
    OrderAmountAtLeast { minor_units: i64 },
    OrderAmountAtMost { minor_units: i64 },
    DateWindow { starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>> },
    Unsupported { found: String },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KnownPredicate {
    ProductInSet { products: Vec<ProductId> },
    CategoryInSet { categories: Vec<CategoryId> },
    CustomerGroupInSet { groups: Vec<CustomerGroupId> },
    QuantityAtLeast { units: u32 },
    QuantityAtMost { units: u32 },
    OrderAmountAtLeast { minor_units: i64 },
    OrderAmountAtMost { minor_units: i64 },
    DateWindow { starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>> },
}

impl From<KnownPredicate> for Predicate {
    fn from(known: KnownPredicate) -> Self {
        match known {
            KnownPredicate::ProductInSet { products } => Predicate::ProductInSet { products },
            KnownPredicate::CategoryInSet { categories } => {
                Predicate::CategoryInSet { categories }
            }
            KnownPredicate::CustomerGroupInSet { groups } => {
                Predicate::CustomerGroupInSet { groups }
            }
            KnownPredicate::QuantityAtLeast { units } => Predicate::QuantityAtLeast { units },
            KnownPredicate::QuantityAtMost { units } => Predicate::QuantityAtMost { units },
            KnownPredicate::OrderAmountAtLeast { minor_units } => {
                Predicate::OrderAmountAtLeast { minor_units }
            }
            KnownPredicate::OrderAmountAtMost { minor_units } => {
                Predicate::OrderAmountAtMost { minor_units }
            }
            KnownPredicate::DateWindow { starts_at, ends_at } => {
                Predicate::DateWindow { starts_at, ends_at }
            }
        }
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let found =
            value.get("kind").and_then(|kind| kind.as_str()).unwrap_or_default().to_string();
        match serde_json::from_value::<KnownPredicate>(value) {
            Ok(known) => Ok(known.into()),
            Err(_) => Ok(Predicate::Unsupported { found }),
        }
    }
}

/// Rule condition tree. `All` and `Any` combine recursively; `Is` wraps a
/// leaf predicate. An empty tree matches unconditionally (global promotion).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Is(Predicate),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::All(Vec::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Cart,
    Item,
    Shipping,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountAction {
    Percentage { target: ActionTarget, rate: Decimal, max_amount: Option<Money> },
    Fixed { target: ActionTarget, amount: Money, max_amount: Option<Money> },
    FreeShipping,
    BuyXGetY { buy_quantity: u32, get_quantity: u32, max_free_units: Option<u32> },
    GiftCard { amount: Money },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub kind: RuleKind,
    pub scope: RuleScope,
    #[serde(default)]
    pub condition: Condition,
    pub action: DiscountAction,
    pub priority: i32,
    pub combinable: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Creation order across the rule set, the deterministic tie-break when
    /// priorities collide.
    pub created_ordinal: u32,
}

impl Rule {
    pub fn active_at(&self, at: DateTime<Utc>) -> bool {
        let started = self.starts_at.map_or(true, |starts_at| at >= starts_at);
        let not_ended = self.ends_at.map_or(true, |ends_at| at <= ends_at);
        started && not_ended
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{
        ActionTarget, Condition, DiscountAction, Predicate, Rule, RuleId, RuleKind, RuleScope,
    };

    fn rule_fixture() -> Rule {
        Rule {
            id: RuleId("rule-10-off".to_string()),
            name: "10% off".to_string(),
            kind: RuleKind::Promotion,
            scope: RuleScope::Global,
            condition: Condition::default(),
            action: DiscountAction::Percentage {
                target: ActionTarget::Cart,
                rate: Decimal::from(10),
                max_amount: None,
            },
            priority: 0,
            combinable: true,
            starts_at: None,
            ends_at: None,
            created_ordinal: 0,
        }
    }

    #[test]
    fn validity_window_bounds_are_inclusive() {
        let now = Utc::now();
        let mut rule = rule_fixture();
        rule.starts_at = Some(now - Duration::days(1));
        rule.ends_at = Some(now + Duration::days(1));
        assert!(rule.active_at(now));

        rule.ends_at = Some(now - Duration::hours(1));
        assert!(!rule.active_at(now));
    }

    #[test]
    fn unknown_predicate_kind_deserializes_as_unsupported() {
        let predicate: Predicate = serde_json::from_value(serde_json::json!({
            "kind": "loyalty_points_at_least",
            "points": 500,
        }))
        .expect("unknown kinds must not fail deserialization");

        assert_eq!(predicate, Predicate::Unsupported { found: "loyalty_points_at_least".to_string() });
    }

    #[test]
    fn condition_tree_round_trips_through_json() {
        let condition = Condition::All(vec![
            Condition::Is(Predicate::QuantityAtLeast { units: 2 }),
            Condition::Any(vec![Condition::Is(Predicate::OrderAmountAtLeast {
                minor_units: 10_000,
            })]),
        ]);

        let encoded = serde_json::to_value(&condition).expect("serialize");
        let decoded: Condition = serde_json::from_value(encoded).expect("deserialize");
        assert_eq!(decoded, condition);
    }
}
