//! Entities that can be validated and conversions into validation values

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// An object whose properties can be read for validation.
///
/// The validator only ever reads through this trait; it never writes
/// property values back.
pub trait Validatable: Send + Sync {
    /// Current value of a property, or `None` when the entity has no such property
    fn property_value(&self, name: &str) -> Option<Value>;

    /// Whether the entity exposes a property with this name
    fn has_property(&self, name: &str) -> bool {
        self.property_value(name).is_some()
    }
}

/// Trait for types that can be converted to a validation value
pub trait ToValidationValue {
    fn to_validation_value(&self) -> Value;
}

impl ToValidationValue for String {
    fn to_validation_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl ToValidationValue for &str {
    fn to_validation_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToValidationValue for i32 {
    fn to_validation_value(&self) -> Value {
        Value::from(*self)
    }
}

impl ToValidationValue for i64 {
    fn to_validation_value(&self) -> Value {
        Value::from(*self)
    }
}

impl ToValidationValue for u32 {
    fn to_validation_value(&self) -> Value {
        Value::from(*self)
    }
}

impl ToValidationValue for f64 {
    fn to_validation_value(&self) -> Value {
        serde_json::Number::from_f64(*self)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl ToValidationValue for bool {
    fn to_validation_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValidationValue for Value {
    fn to_validation_value(&self) -> Value {
        self.clone()
    }
}

impl<T> ToValidationValue for Option<T>
where
    T: ToValidationValue,
{
    fn to_validation_value(&self) -> Value {
        match self {
            Some(value) => value.to_validation_value(),
            None => Value::Null,
        }
    }
}

impl<T> ToValidationValue for Vec<T>
where
    T: ToValidationValue,
{
    fn to_validation_value(&self) -> Value {
        Value::Array(self.iter().map(|item| item.to_validation_value()).collect())
    }
}

/// A ready-made entity storing its properties as JSON values
#[derive(Debug, Default)]
pub struct PropertyBag {
    values: RwLock<HashMap<String, Value>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property with its initial value
    pub fn with(self, name: impl Into<String>, value: impl ToValidationValue) -> Self {
        self.values
            .write()
            .insert(name.into(), value.to_validation_value());
        self
    }

    /// Set a property value, returning whether the stored value changed
    pub fn set(&self, name: impl Into<String>, value: impl ToValidationValue) -> bool {
        let value = value.to_validation_value();
        let mut values = self.values.write();
        match values.insert(name.into(), value.clone()) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }
}

impl Validatable for PropertyBag {
    fn property_value(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_validation_value() {
        assert_eq!("hello".to_validation_value(), Value::String("hello".to_string()));
        assert_eq!(42i32.to_validation_value(), Value::from(42));
        assert_eq!(true.to_validation_value(), Value::Bool(true));
        assert_eq!(f64::NAN.to_validation_value(), Value::Null);

        let opt_none: Option<String> = None;
        assert_eq!(opt_none.to_validation_value(), Value::Null);
    }

    #[test]
    fn test_property_bag_set_reports_change() {
        let bag = PropertyBag::new().with("Bid", 10);
        assert!(!bag.set("Bid", 10));
        assert!(bag.set("Bid", 11));
        assert!(bag.set("MaxBid", 20));
        assert_eq!(bag.get("Bid"), Some(Value::from(11)));
    }

    #[test]
    fn test_property_bag_unknown_property() {
        let bag = PropertyBag::new().with("Bid", Value::Null);
        assert!(bag.has_property("Bid"));
        assert!(!bag.has_property("Ask"));
    }
}
