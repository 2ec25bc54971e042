use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Currency, Money, MoneyError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasketId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerGroupId(pub String);

/// Tax-applicable geographic scope taken from the shipping address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub country: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerContext {
    pub customer_id: Option<CustomerId>,
    pub group_ids: Vec<CustomerGroupId>,
    pub segment_ids: Vec<String>,
    pub tax_exempt: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub category_ids: Vec<CategoryId>,
    pub quantity: u32,
    pub unit_price: Money,
    pub tax_exempt: bool,
    /// Position of the line within the basket at creation time. Used as the
    /// deterministic tie-break wherever otherwise-equal lines compete.
    pub created_ordinal: u32,
}

impl LineItem {
    pub fn extended_price(&self) -> Result<Money, MoneyError> {
        self.unit_price.times(self.quantity)
    }
}

/// Immutable view of a basket taken for one pricing pass.
///
/// The snapshot carries the `priced_at` instant so validity windows and
/// date-window predicates never read an ambient clock; pricing the same
/// snapshot twice yields identical results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketSnapshot {
    pub id: BasketId,
    pub currency: Currency,
    pub priced_at: DateTime<Utc>,
    pub customer: CustomerContext,
    pub lines: Vec<LineItem>,
    pub shipping_amount: Money,
    pub ship_to: Option<Jurisdiction>,
}

impl BasketSnapshot {
    pub fn subtotal(&self) -> Result<Money, MoneyError> {
        let mut subtotal = Money::zero(self.currency.clone());
        for line in &self.lines {
            subtotal = subtotal.checked_add(&line.extended_price()?)?;
        }
        Ok(subtotal)
    }

    pub fn total_units(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }
}
