//! Result of a generator run.

use serde_json::Value;
use sigil_core::{RunUsage, UsageLedger};
use sigil_extract::Values;

use crate::assertion::AssertionError;

/// Extracted values and run metadata.
#[derive(Debug, Clone)]
pub struct GenerateOutput {
    /// Output values, internal fields removed.
    pub values: Values,
    /// Token usage per provider and model.
    pub usage: UsageLedger,
    /// Token usage per request, in order.
    pub run_usage: RunUsage,
    /// Steps taken.
    pub steps: usize,
    /// Corrective retries across all steps.
    pub retries: usize,
    /// Lower-cased names of every function run, in first-run order.
    pub functions_executed: Vec<String>,
    /// Run id.
    pub run_id: String,
    /// Memory session.
    pub session_id: Option<String>,
    /// Set when an optional assertion still failed after the last retry.
    pub unmet_assertion: Option<AssertionError>,
}

impl GenerateOutput {
    /// Value of an output field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value of an output field.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Consume the output, returning the values.
    #[must_use]
    pub fn into_values(self) -> Values {
        self.values
    }

    /// Whether every assertion passed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unmet_assertion.is_none()
    }
}
