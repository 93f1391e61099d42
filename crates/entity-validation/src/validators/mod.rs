//! Built-in rules for common validation scenarios

pub mod compare;
pub mod custom;
pub mod length;
pub mod numeric;
pub mod pattern;
pub mod required;

pub use compare::{CompareRule, Comparison};
pub use custom::{AsyncCustomRule, CustomRule};
pub use length::LengthRule;
pub use numeric::NumericRule;
pub use pattern::PatternRule;
pub use required::RequiredRule;
