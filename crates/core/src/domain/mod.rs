pub mod basket;
pub mod discount;
pub mod rule;
pub mod tax;
