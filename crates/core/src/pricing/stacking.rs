use std::collections::BTreeMap;

use tracing::debug;

use crate::config::EngineConfig;
use crate::domain::basket::{BasketSnapshot, LineItemId};
use crate::domain::discount::{DiscountApplication, DiscountTarget};
use crate::domain::rule::{RuleId, RuleKind};
use crate::errors::{RuleDiagnostic, RuleDiagnosticKind};
use crate::money::{Money, MoneyError};

/// One matched rule with its raw applications, waiting for stacking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateDiscount {
    pub rule_id: RuleId,
    pub kind: RuleKind,
    pub priority: i32,
    pub combinable: bool,
    pub created_ordinal: u32,
    pub applications: Vec<DiscountApplication>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackingOutcome {
    pub applications: Vec<DiscountApplication>,
    pub diagnostics: Vec<RuleDiagnostic>,
}

pub trait StackingResolver: Send + Sync {
    fn resolve(
        &self,
        candidates: Vec<CandidateDiscount>,
        snapshot: &BasketSnapshot,
        config: &EngineConfig,
    ) -> Result<StackingOutcome, MoneyError>;
}

#[derive(Default)]
pub struct GreedyStackingResolver;

impl StackingResolver for GreedyStackingResolver {
    fn resolve(
        &self,
        candidates: Vec<CandidateDiscount>,
        snapshot: &BasketSnapshot,
        config: &EngineConfig,
    ) -> Result<StackingOutcome, MoneyError> {
        resolve_stacking(candidates, snapshot, config)
    }
}

/// Greedy stacking: candidates sorted by priority descending, then creation
/// order, then rule id. Greedy is not globally optimal; it is chosen because
/// the walk is deterministic and every admission or rejection is auditable.
pub fn resolve_stacking(
    mut candidates: Vec<CandidateDiscount>,
    snapshot: &BasketSnapshot,
    config: &EngineConfig,
) -> Result<StackingOutcome, MoneyError> {
    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_ordinal.cmp(&b.created_ordinal))
            .then(a.rule_id.cmp(&b.rule_id))
    });

    let mut remaining_lines: BTreeMap<LineItemId, i64> = BTreeMap::new();
    for line in &snapshot.lines {
        remaining_lines.insert(line.id.clone(), line.extended_price()?.minor_units);
    }
    let mut remaining_cart = snapshot.subtotal()?.minor_units;
    let mut remaining_shipping = snapshot.shipping_amount.minor_units;

    let mut outcome = StackingOutcome { applications: Vec::new(), diagnostics: Vec::new() };
    let mut coupons_admitted = 0u32;
    let mut exclusive_admitted = false;

    for candidate in candidates {
        if candidate.kind == RuleKind::Coupon && coupons_admitted >= config.max_coupons_per_basket
        {
            outcome.diagnostics.push(RuleDiagnostic::new(
                Some(candidate.rule_id.clone()),
                RuleDiagnosticKind::CouponLimitRejected,
                format!("coupon limit of {} already reached", config.max_coupons_per_basket),
            ));
            continue;
        }
        if !candidate.combinable && exclusive_admitted {
            outcome.diagnostics.push(RuleDiagnostic::new(
                Some(candidate.rule_id.clone()),
                RuleDiagnosticKind::ExclusivityRejected,
                "a non-combinable discount was already admitted",
            ));
            continue;
        }

        let mut admitted: Vec<DiscountApplication> = Vec::new();
        for application in candidate.applications {
            let (granted, exhausted) = match &application.target {
                DiscountTarget::Line(line_id) => {
                    let remaining = remaining_lines.entry(line_id.clone()).or_insert(0);
                    let granted = application.amount.minor_units.min(*remaining).max(0);
                    *remaining -= granted;
                    (granted, granted == 0)
                }
                DiscountTarget::Cart => {
                    let granted = application.amount.minor_units.min(remaining_cart).max(0);
                    remaining_cart -= granted;
                    (granted, granted == 0)
                }
                DiscountTarget::Shipping => {
                    let granted = application.amount.minor_units.min(remaining_shipping).max(0);
                    remaining_shipping -= granted;
                    (granted, granted == 0)
                }
            };

            if exhausted {
                outcome.diagnostics.push(RuleDiagnostic::new(
                    Some(candidate.rule_id.clone()),
                    RuleDiagnosticKind::TargetExhausted,
                    "target already fully discounted",
                ));
                continue;
            }
            if granted < application.amount.minor_units {
                outcome.diagnostics.push(RuleDiagnostic::new(
                    Some(candidate.rule_id.clone()),
                    RuleDiagnosticKind::CapClamped,
                    format!(
                        "discount of {} minor units clamped to remaining {} on its target",
                        application.amount.minor_units, granted
                    ),
                ));
            }
            admitted.push(DiscountApplication {
                rule_id: application.rule_id,
                target: application.target,
                amount: Money::new(granted, application.amount.currency),
            });
        }

        if admitted.is_empty() {
            continue;
        }
        debug!(
            rule_id = %candidate.rule_id.0,
            priority = candidate.priority,
            combinable = candidate.combinable,
            "admitted discount candidate"
        );
        if candidate.kind == RuleKind::Coupon {
            coupons_admitted += 1;
        }
        if !candidate.combinable {
            exclusive_admitted = true;
        }
        outcome.applications.extend(admitted);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::config::EngineConfig;
    use crate::domain::basket::{
        BasketId, BasketSnapshot, CustomerContext, LineItem, LineItemId, ProductId,
    };
    use crate::domain::discount::{DiscountApplication, DiscountTarget};
    use crate::domain::rule::{RuleId, RuleKind};
    use crate::errors::RuleDiagnosticKind;
    use crate::money::{Currency, Money};

    use super::{resolve_stacking, CandidateDiscount};

    fn usd(minor_units: i64) -> Money {
        Money::new(minor_units, Currency::new("USD"))
    }

    fn snapshot() -> BasketSnapshot {
        BasketSnapshot {
            id: BasketId("B-1".to_string()),
            currency: Currency::new("USD"),
            priced_at: Utc::now(),
            customer: CustomerContext::default(),
            lines: vec![LineItem {
                id: LineItemId("l1".to_string()),
                product_id: ProductId("sku-1".to_string()),
                variant_id: None,
                category_ids: Vec::new(),
                quantity: 2,
                unit_price: usd(5000),
                tax_exempt: false,
                created_ordinal: 0,
            }],
            shipping_amount: usd(500),
            ship_to: None,
        }
    }

    fn candidate(
        rule_id: &str,
        kind: RuleKind,
        priority: i32,
        combinable: bool,
        ordinal: u32,
        applications: Vec<DiscountApplication>,
    ) -> CandidateDiscount {
        CandidateDiscount {
            rule_id: RuleId(rule_id.to_string()),
            kind,
            priority,
            combinable,
            created_ordinal: ordinal,
            applications,
        }
    }

    fn cart_application(rule_id: &str, minor_units: i64) -> DiscountApplication {
        DiscountApplication {
            rule_id: RuleId(rule_id.to_string()),
            target: DiscountTarget::Cart,
            amount: usd(minor_units),
        }
    }

    #[test]
    fn higher_priority_non_combinable_wins_over_lower() {
        let candidates = vec![
            candidate("low", RuleKind::Promotion, 1, false, 0, vec![cart_application("low", 500)]),
            candidate("high", RuleKind::Promotion, 5, false, 1, vec![cart_application("high", 1000)]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 1);
        assert_eq!(outcome.applications[0].rule_id, RuleId("high".to_string()));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.kind == RuleDiagnosticKind::ExclusivityRejected));
    }

    #[test]
    fn only_one_coupon_is_admitted() {
        let candidates = vec![
            candidate("coupon-a", RuleKind::Coupon, 5, true, 0, vec![cart_application("coupon-a", 1000)]),
            candidate("coupon-b", RuleKind::Coupon, 1, true, 1, vec![cart_application("coupon-b", 2000)]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 1);
        assert_eq!(outcome.applications[0].rule_id, RuleId("coupon-a".to_string()));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.kind == RuleDiagnosticKind::CouponLimitRejected));
    }

    #[test]
    fn combinable_promotions_stack_with_a_coupon() {
        let candidates = vec![
            candidate("promo", RuleKind::Promotion, 2, true, 0, vec![cart_application("promo", 500)]),
            candidate("coupon", RuleKind::Coupon, 1, true, 1, vec![cart_application("coupon", 700)]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 2);
    }

    #[test]
    fn equal_priority_falls_back_to_creation_order() {
        let candidates = vec![
            candidate("later", RuleKind::Promotion, 3, false, 7, vec![cart_application("later", 100)]),
            candidate("earlier", RuleKind::Promotion, 3, false, 2, vec![cart_application("earlier", 100)]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 1);
        assert_eq!(outcome.applications[0].rule_id, RuleId("earlier".to_string()));
    }

    #[test]
    fn line_discounts_never_push_a_line_below_zero() {
        let full = DiscountApplication {
            rule_id: RuleId("first".to_string()),
            target: DiscountTarget::Line(LineItemId("l1".to_string())),
            amount: usd(10_000),
        };
        let follow_up = DiscountApplication {
            rule_id: RuleId("second".to_string()),
            target: DiscountTarget::Line(LineItemId("l1".to_string())),
            amount: usd(2500),
        };
        let candidates = vec![
            candidate("first", RuleKind::Promotion, 5, true, 0, vec![full]),
            candidate("second", RuleKind::Promotion, 1, true, 1, vec![follow_up]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 1);
        assert_eq!(outcome.applications[0].amount, usd(10_000));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.kind == RuleDiagnosticKind::TargetExhausted));
    }

    #[test]
    fn cart_discounts_clamp_to_the_remaining_subtotal() {
        let candidates = vec![
            candidate("big", RuleKind::Promotion, 5, true, 0, vec![cart_application("big", 9000)]),
            candidate("small", RuleKind::Promotion, 1, true, 1, vec![cart_application("small", 3000)]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 2);
        assert_eq!(outcome.applications[0].amount, usd(9000));
        // Only $10.00 of subtotal remained for the second promotion.
        assert_eq!(outcome.applications[1].amount, usd(1000));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.kind == RuleDiagnosticKind::CapClamped));
    }

    #[test]
    fn rejected_exclusive_candidate_does_not_block_later_ones() {
        // An exclusive candidate whose only target is exhausted is never
        // admitted, so it must not trip the exclusivity latch.
        let exhaust = DiscountApplication {
            rule_id: RuleId("drain".to_string()),
            target: DiscountTarget::Cart,
            amount: usd(10_000),
        };
        let blocked = cart_application("exclusive-a", 500);
        let viable = DiscountApplication {
            rule_id: RuleId("exclusive-b".to_string()),
            target: DiscountTarget::Shipping,
            amount: usd(500),
        };
        let candidates = vec![
            candidate("drain", RuleKind::Promotion, 9, true, 0, vec![exhaust]),
            candidate("exclusive-a", RuleKind::Promotion, 5, false, 1, vec![blocked]),
            candidate("exclusive-b", RuleKind::Promotion, 1, false, 2, vec![viable]),
        ];

        let outcome = resolve_stacking(candidates, &snapshot(), &EngineConfig::default())
            .expect("resolves");
        assert_eq!(outcome.applications.len(), 2);
        assert_eq!(outcome.applications[1].rule_id, RuleId("exclusive-b".to_string()));
    }
}
