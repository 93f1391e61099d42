//! Custom rules backed by closures

use crate::entity::Validatable;
use crate::rules::{AsyncRule, RuleContext, RuleResult, SyncRule};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Sync check function over `T`
pub type CheckFn<T> = Arc<dyn Fn(&T, &RuleContext<'_>) -> RuleResult + Send + Sync>;

/// Async check function; receives an owned copy of the value and the property name
pub type AsyncCheckFn = Arc<dyn Fn(Value, Option<String>) -> BoxFuture<'static, RuleResult> + Send + Sync>;

/// Synchronous rule built from a closure.
///
/// `CustomRule<Value>` checks one property value, `CustomRule<dyn Validatable>`
/// checks the whole entity and is registered as a group rule.
pub struct CustomRule<T: ?Sized + 'static> {
    name: String,
    check: CheckFn<T>,
}

impl<T: ?Sized + 'static> Clone for CustomRule<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: self.check.clone(),
        }
    }
}

impl CustomRule<Value> {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &RuleContext<'_>) -> RuleResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

impl CustomRule<dyn Validatable> {
    pub fn group<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&(dyn Validatable + 'static), &RuleContext<'_>) -> RuleResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

impl<T: ?Sized + 'static> CustomRule<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: ?Sized + 'static> fmt::Debug for CustomRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule").field("name", &self.name).finish()
    }
}

impl<T: ?Sized + 'static> SyncRule<T> for CustomRule<T> {
    fn check(&self, input: &T, ctx: &RuleContext<'_>) -> RuleResult {
        (self.check)(input, ctx)
    }

    fn rule_name(&self) -> &str {
        &self.name
    }
}

/// Asynchronous single-property rule built from a closure returning a future
#[derive(Clone)]
pub struct AsyncCustomRule {
    name: String,
    check: AsyncCheckFn,
}

impl AsyncCustomRule {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value, Option<String>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = RuleResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |value, property| Box::pin(check(value, property))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for AsyncCustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCustomRule")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl AsyncRule<Value> for AsyncCustomRule {
    async fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> RuleResult {
        (self.check)(value.clone(), ctx.property().map(str::to_string)).await
    }

    fn rule_name(&self) -> &str {
        &self.name
    }
}
