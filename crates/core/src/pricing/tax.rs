use crate::domain::basket::{BasketSnapshot, LineItemId};
use crate::domain::tax::{TaxLine, TaxRule};
use crate::money::{Money, MoneyError};

/// Per-line amounts after stacking, the tax base for after-discount rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscountedLine {
    pub line_id: LineItemId,
    pub gross_minor_units: i64,
    pub net_minor_units: i64,
}

pub trait TaxCalculator: Send + Sync {
    fn compute(
        &self,
        snapshot: &BasketSnapshot,
        discounted_lines: &[DiscountedLine],
        rules: &[TaxRule],
    ) -> Result<Vec<TaxLine>, MoneyError>;
}

#[derive(Default)]
pub struct DeterministicTaxCalculator;

impl TaxCalculator for DeterministicTaxCalculator {
    fn compute(
        &self,
        snapshot: &BasketSnapshot,
        discounted_lines: &[DiscountedLine],
        rules: &[TaxRule],
    ) -> Result<Vec<TaxLine>, MoneyError> {
        compute_tax(snapshot, discounted_lines, rules)
    }
}

/// Applies jurisdiction-matching tax rules per line, highest priority first,
/// then declaration order (which fixes the compounding sequence). Each
/// (rule, line) amount is rounded half-up to minor units independently so the
/// summed total always reproduces the displayable line amounts.
pub fn compute_tax(
    snapshot: &BasketSnapshot,
    discounted_lines: &[DiscountedLine],
    rules: &[TaxRule],
) -> Result<Vec<TaxLine>, MoneyError> {
    let Some(jurisdiction) = &snapshot.ship_to else {
        return Ok(Vec::new());
    };

    let mut matching: Vec<(usize, &TaxRule)> = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.jurisdiction.matches(jurisdiction))
        .collect();
    matching.sort_by(|(a_index, a), (b_index, b)| {
        b.priority.cmp(&a.priority).then(a_index.cmp(b_index))
    });

    let mut tax_lines = Vec::new();
    for line in &snapshot.lines {
        if snapshot.customer.tax_exempt || line.tax_exempt {
            continue;
        }
        let discounted = discounted_lines.iter().find(|candidate| candidate.line_id == line.id);
        let gross = match discounted {
            Some(discounted) => discounted.gross_minor_units,
            None => line.extended_price()?.minor_units,
        };
        let net = discounted.map_or(gross, |discounted| discounted.net_minor_units);

        let mut accumulated_tax = 0i64;
        for (_, rule) in &matching {
            let mut base = if rule.applies_after_discount { net } else { gross };
            if rule.compound {
                base += accumulated_tax;
            }
            let amount =
                Money::new(base, snapshot.currency.clone()).apply_percent(rule.rate)?;
            accumulated_tax += amount.minor_units;
            if amount.is_zero() {
                continue;
            }
            tax_lines.push(TaxLine {
                tax_rule_id: rule.id.clone(),
                line_item_id: line.id.clone(),
                rate: rule.rate,
                amount,
            });
        }
    }
    Ok(tax_lines)
}
