//! Boundary decoding of stored rule rows.
//!
//! Promotion and tax rules live in the caller's database as JSON-shaped rows.
//! They are parsed into the typed representation exactly once, here; the
//! evaluation hot path never interprets loosely-typed JSON. A row that does
//! not decode is dropped fail-closed with a diagnostic.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::rule::{Rule, RuleId};
use crate::domain::tax::TaxRule;
use crate::errors::{RuleDiagnostic, RuleDiagnosticKind};

#[derive(Debug, Error)]
pub enum StoredRuleError {
    #[error("stored rule row is not valid: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode_rule(row: &Value) -> Result<Rule, StoredRuleError> {
    Ok(serde_json::from_value(row.clone())?)
}

pub fn decode_tax_rule(row: &Value) -> Result<TaxRule, StoredRuleError> {
    Ok(serde_json::from_value(row.clone())?)
}

/// Decodes a batch of stored promotion/coupon rows. Malformed rows never
/// abort the batch; they surface as diagnostics alongside the rules that did
/// decode.
pub fn decode_rules(rows: &[Value]) -> (Vec<Rule>, Vec<RuleDiagnostic>) {
    let mut rules = Vec::with_capacity(rows.len());
    let mut diagnostics = Vec::new();
    for row in rows {
        match decode_rule(row) {
            Ok(rule) => rules.push(rule),
            Err(error) => {
                let rule_id = row_rule_id(row);
                warn!(
                    rule_id = rule_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
                    %error,
                    "dropping stored rule row that failed to decode"
                );
                diagnostics.push(RuleDiagnostic::new(
                    rule_id,
                    RuleDiagnosticKind::MalformedRule,
                    error.to_string(),
                ));
            }
        }
    }
    (rules, diagnostics)
}

pub fn decode_tax_rules(rows: &[Value]) -> (Vec<TaxRule>, Vec<RuleDiagnostic>) {
    let mut rules = Vec::with_capacity(rows.len());
    let mut diagnostics = Vec::new();
    for row in rows {
        match decode_tax_rule(row) {
            Ok(rule) => rules.push(rule),
            Err(error) => {
                diagnostics.push(RuleDiagnostic::new(
                    row_rule_id(row),
                    RuleDiagnosticKind::MalformedRule,
                    error.to_string(),
                ));
            }
        }
    }
    (rules, diagnostics)
}

fn row_rule_id(row: &Value) -> Option<RuleId> {
    row.get("id").and_then(Value::as_str).map(|id| RuleId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::rule::{Condition, Predicate, RuleId, RuleKind};
    use crate::errors::RuleDiagnosticKind;

    use super::{decode_rules, decode_tax_rules};

    fn valid_rule_row() -> serde_json::Value {
        json!({
            "id": "rule-spring",
            "name": "Spring sale",
            "kind": "promotion",
            "scope": "global",
            "condition": { "all": [ { "is": { "kind": "quantity_at_least", "units": 2 } } ] },
            "action": { "type": "percentage", "target": "cart", "rate": "10", "max_amount": null },
            "priority": 5,
            "combinable": true,
            "starts_at": null,
            "ends_at": null,
            "created_ordinal": 0,
        })
    }

    #[test]
    fn valid_rows_decode_into_typed_rules() {
        let (rules, diagnostics) = decode_rules(&[valid_rule_row()]);
        assert_eq!(diagnostics.len(), 0);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, RuleId("rule-spring".to_string()));
        assert_eq!(rules[0].kind, RuleKind::Promotion);
        assert_eq!(
            rules[0].condition,
            Condition::All(vec![Condition::Is(Predicate::QuantityAtLeast { units: 2 })])
        );
    }

    #[test]
    fn malformed_row_is_dropped_with_a_diagnostic() {
        let broken = json!({ "id": "rule-broken", "name": "nope" });
        let (rules, diagnostics) = decode_rules(&[broken, valid_rule_row()]);
        assert_eq!(rules.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, RuleDiagnosticKind::MalformedRule);
        assert_eq!(diagnostics[0].rule_id, Some(RuleId("rule-broken".to_string())));
    }

    #[test]
    fn unknown_predicate_kind_survives_decoding_as_unsupported() {
        let mut row = valid_rule_row();
        row["condition"] = json!({ "is": { "kind": "loyalty_tier_at_least", "tier": 3 } });
        let (rules, diagnostics) = decode_rules(&[row]);
        assert_eq!(diagnostics.len(), 0);
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].condition,
            Condition::Is(Predicate::Unsupported { found: "loyalty_tier_at_least".to_string() })
        );
    }

    #[test]
    fn tax_rows_decode_with_the_same_fail_closed_contract() {
        let valid = json!({
            "id": "tax-ca",
            "name": "California sales tax",
            "jurisdiction": { "country": "US", "region": "CA", "postal_prefix": null },
            "rate": "8.25",
            "priority": 0,
            "compound": false,
            "applies_after_discount": true,
        });
        let broken = json!({ "id": "tax-broken" });

        let (rules, diagnostics) = decode_tax_rules(&[valid, broken]);
        assert_eq!(rules.len(), 1);
        assert_eq!(diagnostics.len(), 1);
    }
}
