use thiserror::Error;
use tracing::warn;

use crate::config::{EngineConfig, FreeUnitSelection};
use crate::domain::basket::{BasketSnapshot, LineItem, LineItemId};
use crate::domain::discount::{DiscountApplication, DiscountTarget};
use crate::domain::rule::{ActionTarget, DiscountAction, Rule, RuleScope};
use crate::errors::{RuleDiagnostic, RuleDiagnosticKind};
use crate::money::{Currency, Money, MoneyError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("action amount is in {found}, basket currency is {expected}")]
    CurrencyMismatch { expected: Currency, found: Currency },
    #[error(transparent)]
    Arithmetic(#[from] MoneyError),
}

/// Raw applications for one matched rule, before stacking. Cap clamps are
/// reported as diagnostics so the original intent stays auditable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub applications: Vec<DiscountApplication>,
    pub diagnostics: Vec<RuleDiagnostic>,
}

pub trait ActionApplier: Send + Sync {
    fn apply(
        &self,
        rule: &Rule,
        snapshot: &BasketSnapshot,
        config: &EngineConfig,
    ) -> Result<ActionOutcome, ActionError>;
}

#[derive(Default)]
pub struct DeterministicActionApplier;

impl ActionApplier for DeterministicActionApplier {
    fn apply(
        &self,
        rule: &Rule,
        snapshot: &BasketSnapshot,
        config: &EngineConfig,
    ) -> Result<ActionOutcome, ActionError> {
        apply_action(rule, snapshot, config)
    }
}

/// Whether a rule applies to this basket at all, per its scope. Product and
/// category scopes require at least one eligible line; customer scopes gate
/// on the snapshot's customer context.
pub fn scope_applies(rule: &Rule, snapshot: &BasketSnapshot) -> bool {
    match &rule.scope {
        RuleScope::Global => true,
        RuleScope::Products(_) | RuleScope::Categories(_) => {
            !eligible_lines(rule, snapshot).is_empty()
        }
        RuleScope::Customers(customers) => snapshot
            .customer
            .customer_id
            .as_ref()
            .map_or(false, |customer_id| customers.contains(customer_id)),
        RuleScope::CustomerGroups(groups) => {
            snapshot.customer.group_ids.iter().any(|group| groups.contains(group))
        }
    }
}

/// Lines a rule's item-level action may touch, in creation order. Customer
/// scopes do not narrow the line set.
pub fn eligible_lines<'a>(rule: &Rule, snapshot: &'a BasketSnapshot) -> Vec<&'a LineItem> {
    let mut lines: Vec<&LineItem> = snapshot
        .lines
        .iter()
        .filter(|line| match &rule.scope {
            RuleScope::Products(products) => products.contains(&line.product_id),
            RuleScope::Categories(categories) => {
                line.category_ids.iter().any(|category| categories.contains(category))
            }
            _ => true,
        })
        .collect();
    lines.sort_by_key(|line| line.created_ordinal);
    lines
}

pub fn apply_action(
    rule: &Rule,
    snapshot: &BasketSnapshot,
    config: &EngineConfig,
) -> Result<ActionOutcome, ActionError> {
    let mut outcome = ActionOutcome { applications: Vec::new(), diagnostics: Vec::new() };

    match &rule.action {
        DiscountAction::Percentage { target, rate, max_amount } => {
            if let Some(cap) = max_amount {
                require_basket_currency(snapshot, cap)?;
            }
            let cap_minor = max_amount.as_ref().map(|cap| cap.minor_units.max(0));
            match target {
                ActionTarget::Cart => {
                    let subtotal = snapshot.subtotal()?;
                    let raw = subtotal.apply_percent(*rate)?.minor_units.max(0);
                    let amount = clamp(rule, raw, subtotal.minor_units, "cart subtotal", &mut outcome);
                    let amount = apply_cap(rule, amount, cap_minor, &mut outcome);
                    push(&mut outcome, rule, DiscountTarget::Cart, amount, snapshot);
                }
                ActionTarget::Item => {
                    let mut remaining_cap = cap_minor;
                    for line in eligible_lines(rule, snapshot) {
                        let extended = line.extended_price()?;
                        let raw = extended.apply_percent(*rate)?.minor_units.max(0);
                        let amount =
                            clamp(rule, raw, extended.minor_units, "line extended price", &mut outcome);
                        let amount = draw_from_cap(rule, amount, &mut remaining_cap, &mut outcome);
                        push(&mut outcome, rule, DiscountTarget::Line(line.id.clone()), amount, snapshot);
                    }
                }
                ActionTarget::Shipping => {
                    let shipping = &snapshot.shipping_amount;
                    let raw = shipping.apply_percent(*rate)?.minor_units.max(0);
                    let amount = clamp(rule, raw, shipping.minor_units, "shipping amount", &mut outcome);
                    let amount = apply_cap(rule, amount, cap_minor, &mut outcome);
                    push(&mut outcome, rule, DiscountTarget::Shipping, amount, snapshot);
                }
            }
        }
        DiscountAction::Fixed { target, amount, max_amount } => {
            require_basket_currency(snapshot, amount)?;
            if let Some(cap) = max_amount {
                require_basket_currency(snapshot, cap)?;
            }
            let cap_minor = max_amount.as_ref().map(|cap| cap.minor_units.max(0));
            let fixed = amount.minor_units.max(0);
            match target {
                ActionTarget::Cart => {
                    let subtotal = snapshot.subtotal()?;
                    let amount = clamp(rule, fixed, subtotal.minor_units, "cart subtotal", &mut outcome);
                    let amount = apply_cap(rule, amount, cap_minor, &mut outcome);
                    push(&mut outcome, rule, DiscountTarget::Cart, amount, snapshot);
                }
                ActionTarget::Item => {
                    let mut remaining_cap = cap_minor;
                    for line in eligible_lines(rule, snapshot) {
                        let extended = line.extended_price()?;
                        let amount =
                            clamp(rule, fixed, extended.minor_units, "line extended price", &mut outcome);
                        let amount = draw_from_cap(rule, amount, &mut remaining_cap, &mut outcome);
                        push(&mut outcome, rule, DiscountTarget::Line(line.id.clone()), amount, snapshot);
                    }
                }
                ActionTarget::Shipping => {
                    let amount = clamp(
                        rule,
                        fixed,
                        snapshot.shipping_amount.minor_units,
                        "shipping amount",
                        &mut outcome,
                    );
                    let amount = apply_cap(rule, amount, cap_minor, &mut outcome);
                    push(&mut outcome, rule, DiscountTarget::Shipping, amount, snapshot);
                }
            }
        }
        DiscountAction::FreeShipping => {
            push(
                &mut outcome,
                rule,
                DiscountTarget::Shipping,
                snapshot.shipping_amount.minor_units.max(0),
                snapshot,
            );
        }
        DiscountAction::BuyXGetY { buy_quantity, get_quantity, max_free_units } => {
            apply_buy_x_get_y(
                rule,
                snapshot,
                config,
                *buy_quantity,
                *get_quantity,
                *max_free_units,
                &mut outcome,
            )?;
        }
        DiscountAction::GiftCard { amount } => {
            require_basket_currency(snapshot, amount)?;
            let subtotal = snapshot.subtotal()?;
            let amount = clamp(
                rule,
                amount.minor_units.max(0),
                subtotal.minor_units,
                "cart subtotal",
                &mut outcome,
            );
            push(&mut outcome, rule, DiscountTarget::Cart, amount, snapshot);
        }
    }

    Ok(outcome)
}

/// Selects free units for a buy-X-get-Y action. Every complete group of
/// `buy + get` eligible units earns `get` free units; the free units are the
/// cheapest eligible ones (tie-break: lowest line creation ordinal) unless
/// the engine is configured for most-expensive-first.
fn apply_buy_x_get_y(
    rule: &Rule,
    snapshot: &BasketSnapshot,
    config: &EngineConfig,
    buy_quantity: u32,
    get_quantity: u32,
    max_free_units: Option<u32>,
    outcome: &mut ActionOutcome,
) -> Result<(), ActionError> {
    let group_size = u64::from(buy_quantity) + u64::from(get_quantity);
    if buy_quantity == 0 || get_quantity == 0 {
        warn!(rule_id = %rule.id.0, "buy-x-get-y action has a zero quantity");
        outcome.diagnostics.push(RuleDiagnostic::new(
            Some(rule.id.clone()),
            RuleDiagnosticKind::MalformedRule,
            "buy-x-get-y quantities must both be positive",
        ));
        return Ok(());
    }

    let mut lines = eligible_lines(rule, snapshot);
    let total_units: u64 = lines.iter().map(|line| u64::from(line.quantity)).sum();

    let mut free_count = (total_units / group_size) * u64::from(get_quantity);
    if let Some(max_free) = max_free_units {
        if free_count > u64::from(max_free) {
            outcome.diagnostics.push(RuleDiagnostic::new(
                Some(rule.id.clone()),
                RuleDiagnosticKind::CapClamped,
                format!("free units clamped from {free_count} to {max_free}"),
            ));
            free_count = u64::from(max_free);
        }
    }
    if free_count == 0 {
        return Ok(());
    }

    // Units within one line are interchangeable, so selection works on lines
    // ordered by unit price and draws whole runs of units from each.
    match config.free_unit_selection {
        FreeUnitSelection::CheapestFirst => {
            lines.sort_by(|a, b| {
                a.unit_price
                    .minor_units
                    .cmp(&b.unit_price.minor_units)
                    .then(a.created_ordinal.cmp(&b.created_ordinal))
            });
        }
        FreeUnitSelection::MostExpensiveFirst => {
            lines.sort_by(|a, b| {
                b.unit_price
                    .minor_units
                    .cmp(&a.unit_price.minor_units)
                    .then(a.created_ordinal.cmp(&b.created_ordinal))
            });
        }
    }

    let mut per_line: Vec<(LineItemId, u32, Money)> = Vec::new();
    let mut remaining = free_count;
    for line in lines {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(u64::from(line.quantity));
        let amount = line.unit_price.times(taken as u32)?;
        per_line.push((line.id.clone(), line.created_ordinal, amount));
        remaining -= taken;
    }
    per_line.sort_by_key(|(_, ordinal, _)| *ordinal);
    for (line_id, _, amount) in per_line {
        push(outcome, rule, DiscountTarget::Line(line_id), amount.minor_units, snapshot);
    }
    Ok(())
}

fn require_basket_currency(snapshot: &BasketSnapshot, amount: &Money) -> Result<(), ActionError> {
    if amount.currency != snapshot.currency {
        return Err(ActionError::CurrencyMismatch {
            expected: snapshot.currency.clone(),
            found: amount.currency.clone(),
        });
    }
    Ok(())
}

fn clamp(
    rule: &Rule,
    amount: i64,
    limit: i64,
    what: &str,
    outcome: &mut ActionOutcome,
) -> i64 {
    if amount > limit {
        outcome.diagnostics.push(RuleDiagnostic::new(
            Some(rule.id.clone()),
            RuleDiagnosticKind::CapClamped,
            format!("discount of {amount} minor units clamped to {what} of {limit}"),
        ));
        return limit.max(0);
    }
    amount
}

fn apply_cap(rule: &Rule, amount: i64, cap: Option<i64>, outcome: &mut ActionOutcome) -> i64 {
    match cap {
        Some(cap) if amount > cap => {
            outcome.diagnostics.push(RuleDiagnostic::new(
                Some(rule.id.clone()),
                RuleDiagnosticKind::CapClamped,
                format!("discount of {amount} minor units clamped to max amount {cap}"),
            ));
            cap
        }
        _ => amount,
    }
}

/// Draws from a shared max-amount budget allocated across line applications
/// in line order.
fn draw_from_cap(
    rule: &Rule,
    amount: i64,
    remaining: &mut Option<i64>,
    outcome: &mut ActionOutcome,
) -> i64 {
    match remaining {
        Some(budget) => {
            let granted = amount.min(*budget);
            if granted < amount {
                outcome.diagnostics.push(RuleDiagnostic::new(
                    Some(rule.id.clone()),
                    RuleDiagnosticKind::CapClamped,
                    format!("discount of {amount} minor units clamped to remaining cap {budget}"),
                ));
            }
            *budget -= granted;
            granted
        }
        None => amount,
    }
}

fn push(
    outcome: &mut ActionOutcome,
    rule: &Rule,
    target: DiscountTarget,
    minor_units: i64,
    snapshot: &BasketSnapshot,
) {
    if minor_units <= 0 {
        return;
    }
    outcome.applications.push(DiscountApplication {
        rule_id: rule.id.clone(),
        target,
        amount: Money::new(minor_units, snapshot.currency.clone()),
    });
}
