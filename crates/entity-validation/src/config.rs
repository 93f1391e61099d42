//! Validator configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;

/// Configuration for an [`EntityValidator`](crate::EntityValidator)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct ValidatorConfig {
    /// Keep running queued requests after an earlier request failed
    #[builder(default = "true", getter)]
    pub continue_on_failure: bool,

    /// Run implicit validation when a property change is reported
    #[builder(default = "true", getter)]
    pub validate_on_property_change: bool,

    /// Initial state of the validation switch
    #[builder(default = "true", getter)]
    pub enabled: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            continue_on_failure: true,
            validate_on_property_change: true,
            enabled: true,
        }
    }
}

impl ValidatorConfigBuilder {
    /// Only validate when asked to; property changes are ignored
    pub fn explicit_only() -> Self {
        ValidatorConfigBuilder::new().validate_on_property_change(false)
    }

    /// Reject requests queued behind a failed one until the queue drains
    pub fn fail_fast() -> Self {
        ValidatorConfigBuilder::new().continue_on_failure(false)
    }
}
