use thiserror::Error;
use tracing::warn;

use crate::domain::basket::BasketSnapshot;
use crate::domain::rule::{Condition, Predicate};
use crate::money::MoneyError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    #[error("unsupported predicate kind `{found}`")]
    Unsupported { found: String },
    #[error(transparent)]
    Arithmetic(#[from] MoneyError),
}

pub trait ConditionEvaluator: Send + Sync {
    fn matches(
        &self,
        condition: &Condition,
        snapshot: &BasketSnapshot,
    ) -> Result<bool, PredicateError>;
}

#[derive(Default)]
pub struct DeterministicConditionEvaluator;

impl ConditionEvaluator for DeterministicConditionEvaluator {
    fn matches(
        &self,
        condition: &Condition,
        snapshot: &BasketSnapshot,
    ) -> Result<bool, PredicateError> {
        evaluate_condition(condition, snapshot)
    }
}

/// Walks the condition tree. `All` short-circuits on the first false, `Any`
/// on the first true; empty combinator nodes match vacuously, so a rule with
/// an empty tree is a global promotion.
pub fn evaluate_condition(
    condition: &Condition,
    snapshot: &BasketSnapshot,
) -> Result<bool, PredicateError> {
    match condition {
        Condition::All(children) => {
            for child in children {
                if !evaluate_condition(child, snapshot)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any(children) => {
            if children.is_empty() {
                return Ok(true);
            }
            for child in children {
                if evaluate_condition(child, snapshot)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Is(predicate) => evaluate_predicate(predicate, snapshot),
    }
}

fn evaluate_predicate(
    predicate: &Predicate,
    snapshot: &BasketSnapshot,
) -> Result<bool, PredicateError> {
    match predicate {
        Predicate::ProductInSet { products } => {
            Ok(snapshot.lines.iter().any(|line| products.contains(&line.product_id)))
        }
        Predicate::CategoryInSet { categories } => Ok(snapshot
            .lines
            .iter()
            .any(|line| line.category_ids.iter().any(|category| categories.contains(category)))),
        Predicate::CustomerGroupInSet { groups } => {
            Ok(snapshot.customer.group_ids.iter().any(|group| groups.contains(group)))
        }
        Predicate::QuantityAtLeast { units } => {
            Ok(snapshot.total_units() >= u64::from(*units))
        }
        Predicate::QuantityAtMost { units } => Ok(snapshot.total_units() <= u64::from(*units)),
        Predicate::OrderAmountAtLeast { minor_units } => {
            Ok(snapshot.subtotal()?.minor_units >= *minor_units)
        }
        Predicate::OrderAmountAtMost { minor_units } => {
            Ok(snapshot.subtotal()?.minor_units <= *minor_units)
        }
        Predicate::DateWindow { starts_at, ends_at } => {
            let started = starts_at.map_or(true, |starts_at| snapshot.priced_at >= starts_at);
            let not_ended = ends_at.map_or(true, |ends_at| snapshot.priced_at <= ends_at);
            Ok(started && not_ended)
        }
        Predicate::Unsupported { found } => {
            // Fail closed: an unrecognized predicate must never match, and
            // must never break checkout either.
            warn!(
                basket_id = %snapshot.id.0,
                predicate_kind = %found,
                "skipping rule with unsupported predicate kind"
            );
            Err(PredicateError::Unsupported { found: found.clone() })
        }
    }
}
