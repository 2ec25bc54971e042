pub mod actions;
pub mod predicates;
pub mod stacking;
pub mod tax;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::domain::basket::{BasketId, BasketSnapshot};
use crate::domain::discount::{DiscountApplication, DiscountTarget};
use crate::domain::rule::Rule;
use crate::domain::tax::{TaxLine, TaxRule};
use crate::errors::{InvalidBasketError, RuleDiagnostic, RuleDiagnosticKind};
use crate::money::{Currency, Money, MoneyError};

use self::actions::{scope_applies, ActionApplier, ActionError, DeterministicActionApplier};
use self::predicates::{ConditionEvaluator, DeterministicConditionEvaluator, PredicateError};
use self::stacking::{CandidateDiscount, GreedyStackingResolver, StackingResolver};
use self::tax::{DeterministicTaxCalculator, DiscountedLine, TaxCalculator};

#[derive(Clone, Debug)]
pub struct PricingRequest<'a> {
    pub snapshot: &'a BasketSnapshot,
    pub rules: &'a [Rule],
    pub tax_rules: &'a [TaxRule],
}

/// The priced basket. Every term of
/// `grand_total = subtotal - discount_total + tax_total + shipping`
/// is carried explicitly so callers can re-derive and audit the result.
/// Shipping discounts count toward `discount_total`; `shipping` stays the
/// pre-discount amount so the identity holds exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub basket_id: BasketId,
    pub currency: Currency,
    pub subtotal: Money,
    pub discounts: Vec<DiscountApplication>,
    pub discount_total: Money,
    pub tax_lines: Vec<TaxLine>,
    pub tax_total: Money,
    pub shipping: Money,
    pub grand_total: Money,
    pub diagnostics: Vec<RuleDiagnostic>,
}

pub trait BasketPricer: Send + Sync {
    fn price(&self, request: PricingRequest<'_>) -> Result<PricingResult, InvalidBasketError>;
}

/// Pricing pipeline composed from the four engine seams. The deterministic
/// default wiring is what production callers use; tests swap individual
/// engines through the traits.
pub struct PricingPipeline<C, A, S, T> {
    evaluator: C,
    applier: A,
    resolver: S,
    tax_calculator: T,
    config: EngineConfig,
}

impl<C, A, S, T> PricingPipeline<C, A, S, T> {
    pub fn new(evaluator: C, applier: A, resolver: S, tax_calculator: T, config: EngineConfig) -> Self {
        Self { evaluator, applier, resolver, tax_calculator, config }
    }
}

pub type DeterministicPricingPipeline = PricingPipeline<
    DeterministicConditionEvaluator,
    DeterministicActionApplier,
    GreedyStackingResolver,
    DeterministicTaxCalculator,
>;

impl Default for DeterministicPricingPipeline {
    fn default() -> Self {
        Self::new(
            DeterministicConditionEvaluator,
            DeterministicActionApplier,
            GreedyStackingResolver,
            DeterministicTaxCalculator,
            EngineConfig::default(),
        )
    }
}

impl DeterministicPricingPipeline {
    pub fn with_config(config: EngineConfig) -> Self {
        Self { config, ..Self::default() }
    }
}

impl<C, A, S, T> BasketPricer for PricingPipeline<C, A, S, T>
where
    C: ConditionEvaluator,
    A: ActionApplier,
    S: StackingResolver,
    T: TaxCalculator,
{
    fn price(&self, request: PricingRequest<'_>) -> Result<PricingResult, InvalidBasketError> {
        let snapshot = request.snapshot;
        let subtotal = validate_snapshot(snapshot)?;
        let mut diagnostics: Vec<RuleDiagnostic> = Vec::new();

        // Stage 1 and 2: evaluate conditions and apply actions. A malformed
        // rule is skipped with a diagnostic, never a checkout failure.
        let mut candidates: Vec<CandidateDiscount> = Vec::new();
        for rule in request.rules {
            if !rule.active_at(snapshot.priced_at) {
                debug!(rule_id = %rule.id.0, "rule outside validity window");
                continue;
            }
            if !scope_applies(rule, snapshot) {
                continue;
            }
            match self.evaluator.matches(&rule.condition, snapshot) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(PredicateError::Unsupported { found }) => {
                    diagnostics.push(RuleDiagnostic::new(
                        Some(rule.id.clone()),
                        RuleDiagnosticKind::UnsupportedPredicate,
                        format!("predicate kind `{found}` is not supported"),
                    ));
                    continue;
                }
                Err(PredicateError::Arithmetic(source)) => {
                    diagnostics.push(RuleDiagnostic::new(
                        Some(rule.id.clone()),
                        RuleDiagnosticKind::MalformedRule,
                        format!("condition evaluation failed: {source}"),
                    ));
                    continue;
                }
            }

            match self.applier.apply(rule, snapshot, &self.config) {
                Ok(outcome) => {
                    diagnostics.extend(outcome.diagnostics);
                    if outcome.applications.is_empty() {
                        continue;
                    }
                    candidates.push(CandidateDiscount {
                        rule_id: rule.id.clone(),
                        kind: rule.kind,
                        priority: rule.priority,
                        combinable: rule.combinable,
                        created_ordinal: rule.created_ordinal,
                        applications: outcome.applications,
                    });
                }
                Err(ActionError::CurrencyMismatch { expected, found }) => {
                    warn!(
                        rule_id = %rule.id.0,
                        %expected,
                        %found,
                        "skipping rule with foreign-currency action"
                    );
                    diagnostics.push(RuleDiagnostic::new(
                        Some(rule.id.clone()),
                        RuleDiagnosticKind::CurrencyMismatch,
                        format!("action amount is in {found}, basket currency is {expected}"),
                    ));
                }
                Err(ActionError::Arithmetic(source)) => {
                    return Err(InvalidBasketError::Arithmetic(source));
                }
            }
        }

        // Stage 3: stacking.
        let stacked = self
            .resolver
            .resolve(candidates, snapshot, &self.config)
            .map_err(InvalidBasketError::Arithmetic)?;
        diagnostics.extend(stacked.diagnostics);
        let discounts = stacked.applications;

        // Stage 4: tax on the discounted amounts.
        let discounted_lines = discounted_lines(snapshot, &discounts)?;
        let tax_lines = self
            .tax_calculator
            .compute(snapshot, &discounted_lines, request.tax_rules)
            .map_err(InvalidBasketError::Arithmetic)?;

        // Stage 5: totals.
        let currency = snapshot.currency.clone();
        let discount_total = sum_amounts(discounts.iter().map(|discount| &discount.amount), &currency)?;
        let tax_total = sum_amounts(tax_lines.iter().map(|tax_line| &tax_line.amount), &currency)?;
        let grand_total = subtotal
            .checked_sub(&discount_total)?
            .checked_add(&tax_total)?
            .checked_add(&snapshot.shipping_amount)?;

        Ok(PricingResult {
            basket_id: snapshot.id.clone(),
            currency,
            subtotal,
            discounts,
            discount_total,
            tax_lines,
            tax_total,
            shipping: snapshot.shipping_amount.clone(),
            grand_total,
            diagnostics,
        })
    }
}

/// Prices a basket with the deterministic default pipeline.
pub fn price_basket(
    snapshot: &BasketSnapshot,
    rules: &[Rule],
    tax_rules: &[TaxRule],
) -> Result<PricingResult, InvalidBasketError> {
    DeterministicPricingPipeline::default().price(PricingRequest { snapshot, rules, tax_rules })
}

/// Fatal snapshot checks; returns the basket subtotal on success.
fn validate_snapshot(snapshot: &BasketSnapshot) -> Result<Money, InvalidBasketError> {
    if snapshot.lines.is_empty() {
        return Err(InvalidBasketError::EmptyBasket { basket_id: snapshot.id.clone() });
    }
    if snapshot.shipping_amount.currency != snapshot.currency {
        return Err(InvalidBasketError::ShippingCurrencyMismatch {
            basket_id: snapshot.id.clone(),
            expected: snapshot.currency.clone(),
            found: snapshot.shipping_amount.currency.clone(),
        });
    }
    if snapshot.shipping_amount.is_negative() {
        return Err(InvalidBasketError::NegativeShipping { basket_id: snapshot.id.clone() });
    }
    for line in &snapshot.lines {
        if line.unit_price.currency != snapshot.currency {
            return Err(InvalidBasketError::CurrencyMismatch {
                basket_id: snapshot.id.clone(),
                line_id: line.id.clone(),
                expected: snapshot.currency.clone(),
                found: line.unit_price.currency.clone(),
            });
        }
        if line.quantity == 0 {
            return Err(InvalidBasketError::ZeroQuantity {
                basket_id: snapshot.id.clone(),
                line_id: line.id.clone(),
            });
        }
        if line.unit_price.is_negative() {
            return Err(InvalidBasketError::NegativeUnitPrice {
                basket_id: snapshot.id.clone(),
                line_id: line.id.clone(),
            });
        }
    }
    Ok(snapshot.subtotal()?)
}

/// Post-discount amounts per line, the tax base for after-discount rules.
/// Line-targeted discounts subtract directly; cart-targeted discounts are
/// prorated across the remaining line values with a largest-remainder
/// allocation so the prorated units sum exactly to the cart discount.
fn discounted_lines(
    snapshot: &BasketSnapshot,
    discounts: &[DiscountApplication],
) -> Result<Vec<DiscountedLine>, InvalidBasketError> {
    let mut lines = Vec::with_capacity(snapshot.lines.len());
    for line in &snapshot.lines {
        let gross = line.extended_price()?.minor_units;
        let discounted: i64 = discounts
            .iter()
            .filter_map(|application| match &application.target {
                DiscountTarget::Line(line_id) if *line_id == line.id => {
                    Some(application.amount.minor_units)
                }
                _ => None,
            })
            .sum();
        lines.push(DiscountedLine {
            line_id: line.id.clone(),
            gross_minor_units: gross,
            net_minor_units: (gross - discounted).max(0),
        });
    }

    let cart_discount: i64 = discounts
        .iter()
        .filter(|application| application.target == DiscountTarget::Cart)
        .map(|application| application.amount.minor_units)
        .sum();
    prorate_cart_discount(&mut lines, cart_discount);
    Ok(lines)
}

fn prorate_cart_discount(lines: &mut [DiscountedLine], cart_discount: i64) {
    let net_sum: i64 = lines.iter().map(|line| line.net_minor_units).sum();
    if cart_discount <= 0 || net_sum <= 0 {
        return;
    }
    let to_allocate = cart_discount.min(net_sum);

    // Floor shares first, then hand out the remaining units by descending
    // fractional remainder (ties in line order).
    let mut remainders: Vec<(usize, i64)> = Vec::with_capacity(lines.len());
    let mut distributed = 0i64;
    for (index, line) in lines.iter_mut().enumerate() {
        let scaled = i128::from(to_allocate) * i128::from(line.net_minor_units);
        let share = (scaled / i128::from(net_sum)) as i64;
        let remainder = (scaled % i128::from(net_sum)) as i64;
        line.net_minor_units -= share;
        distributed += share;
        remainders.push((index, remainder));
    }
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut leftover = to_allocate - distributed;
    for (index, _) in remainders {
        if leftover == 0 {
            break;
        }
        if lines[index].net_minor_units > 0 {
            lines[index].net_minor_units -= 1;
            leftover -= 1;
        }
    }
}

fn sum_amounts<'a>(
    amounts: impl Iterator<Item = &'a Money>,
    currency: &Currency,
) -> Result<Money, MoneyError> {
    let mut total = Money::zero(currency.clone());
    for amount in amounts {
        total = total.checked_add(amount)?;
    }
    Ok(total)
}
