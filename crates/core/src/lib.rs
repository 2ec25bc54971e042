pub mod config;
pub mod domain;
pub mod errors;
pub mod money;
pub mod pricing;
pub mod stored;

pub use config::{ConfigError, EngineConfig, FreeUnitSelection, LoadOptions};
pub use domain::basket::{
    BasketId, BasketSnapshot, CategoryId, CustomerContext, CustomerGroupId, CustomerId,
    Jurisdiction, LineItem, LineItemId, ProductId, VariantId,
};
pub use domain::discount::{DiscountApplication, DiscountTarget};
pub use domain::rule::{
    ActionTarget, Condition, DiscountAction, Predicate, Rule, RuleId, RuleKind, RuleScope,
};
pub use domain::tax::{JurisdictionMatcher, TaxLine, TaxRule, TaxRuleId};
pub use errors::{InvalidBasketError, PricingError, RuleDiagnostic, RuleDiagnosticKind};
pub use money::{Currency, Money, MoneyError};
pub use pricing::{
    price_basket, BasketPricer, DeterministicPricingPipeline, PricingPipeline, PricingRequest,
    PricingResult,
};
pub use stored::{decode_rule, decode_rules, decode_tax_rule, decode_tax_rules, StoredRuleError};
