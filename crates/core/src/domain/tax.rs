use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::basket::{Jurisdiction, LineItemId};
use crate::money::Money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxRuleId(pub String);

/// Matches a shipping jurisdiction. Country is required; region and postal
/// prefix narrow the match when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionMatcher {
    pub country: String,
    pub region: Option<String>,
    pub postal_prefix: Option<String>,
}

impl JurisdictionMatcher {
    pub fn matches(&self, jurisdiction: &Jurisdiction) -> bool {
        if !self.country.eq_ignore_ascii_case(&jurisdiction.country) {
            return false;
        }
        if let Some(region) = &self.region {
            match &jurisdiction.region {
                Some(candidate) if region.eq_ignore_ascii_case(candidate) => {}
                _ => return false,
            }
        }
        if let Some(prefix) = &self.postal_prefix {
            match &jurisdiction.postal_code {
                Some(postal_code) if postal_code.starts_with(prefix.as_str()) => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRule {
    pub id: TaxRuleId,
    pub name: String,
    pub jurisdiction: JurisdictionMatcher,
    /// Percentage rate, `8.25` means 8.25%.
    pub rate: Decimal,
    pub priority: i32,
    /// Compound rules accumulate previously computed tax into their base.
    pub compound: bool,
    /// When false the rule taxes the pre-discount line amount.
    pub applies_after_discount: bool,
}

/// One tax amount for one rule applied to one line. Kept per line so the
/// displayed line-item tax is reproducible from the result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub tax_rule_id: TaxRuleId,
    pub line_item_id: LineItemId,
    pub rate: Decimal,
    pub amount: Money,
}

#[cfg(test)]
mod tests {
    use crate::domain::basket::Jurisdiction;

    use super::JurisdictionMatcher;

    fn california() -> Jurisdiction {
        Jurisdiction {
            country: "US".to_string(),
            region: Some("CA".to_string()),
            postal_code: Some("94103".to_string()),
        }
    }

    #[test]
    fn country_only_matcher_covers_all_regions() {
        let matcher =
            JurisdictionMatcher { country: "us".to_string(), region: None, postal_prefix: None };
        assert!(matcher.matches(&california()));
    }

    #[test]
    fn region_and_postal_prefix_narrow_the_match() {
        let matcher = JurisdictionMatcher {
            country: "US".to_string(),
            region: Some("ca".to_string()),
            postal_prefix: Some("941".to_string()),
        };
        assert!(matcher.matches(&california()));

        let wrong_prefix = JurisdictionMatcher {
            country: "US".to_string(),
            region: Some("CA".to_string()),
            postal_prefix: Some("90".to_string()),
        };
        assert!(!wrong_prefix.matches(&california()));
    }

    #[test]
    fn missing_region_on_address_fails_region_matcher() {
        let matcher = JurisdictionMatcher {
            country: "US".to_string(),
            region: Some("CA".to_string()),
            postal_prefix: None,
        };
        let address =
            Jurisdiction { country: "US".to_string(), region: None, postal_code: None };
        assert!(!matcher.matches(&address));
    }
}
