//! Token usage tracking.
//!
//! [`RequestUsage`] is what a single chat call reports. A generator run
//! records every call twice: in a [`RunUsage`] (the chronological list,
//! used for limit checks) and in a [`UsageLedger`] keyed by provider and
//! model so usage stays attributable when steps and retries hit
//! different models.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{UsageLimitExceeded, UsageLimitType};

/// Token usage for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUsage {
    /// Number of prompt tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_tokens: Option<u64>,
    /// Number of completion tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_tokens: Option<u64>,
    /// Total tokens (request + response).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl RequestUsage {
    /// Create a new empty usage record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create usage with request and response tokens.
    #[must_use]
    pub fn with_tokens(request_tokens: u64, response_tokens: u64) -> Self {
        Self {
            request_tokens: Some(request_tokens),
            response_tokens: Some(response_tokens),
            total_tokens: Some(request_tokens + response_tokens),
        }
    }

    /// Merge another usage record into this one.
    pub fn merge(&mut self, other: &RequestUsage) {
        self.request_tokens = add_opt(self.request_tokens, other.request_tokens);
        self.response_tokens = add_opt(self.response_tokens, other.response_tokens);
        self.total_tokens = match (self.request_tokens, self.response_tokens) {
            (None, None) => add_opt(self.total_tokens, other.total_tokens),
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };
    }

    /// Get total tokens, calculating if not set.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total_tokens
            .unwrap_or_else(|| self.request_tokens.unwrap_or(0) + self.response_tokens.unwrap_or(0))
    }

    /// Check if this usage record has any data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request_tokens.is_none() && self.response_tokens.is_none() && self.total_tokens.is_none()
    }
}

fn add_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, None) => a,
        (None, b) => b,
    }
}

impl std::ops::AddAssign for RequestUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}

/// Accumulated usage for a generator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUsage {
    /// Individual request usages.
    pub requests: Vec<RequestUsage>,
    /// Total request tokens across all requests.
    pub total_request_tokens: u64,
    /// Total response tokens across all requests.
    pub total_response_tokens: u64,
    /// Total tokens across all requests.
    pub total_tokens: u64,
}

impl RunUsage {
    /// Create a new empty run usage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request's usage.
    pub fn add_request(&mut self, usage: RequestUsage) {
        self.total_request_tokens += usage.request_tokens.unwrap_or(0);
        self.total_response_tokens += usage.response_tokens.unwrap_or(0);
        self.total_tokens += usage.total();
        self.requests.push(usage);
    }

    /// Get the number of requests.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }
}

/// Provider and model a usage record is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    /// Provider / system name, e.g. `openai`.
    pub provider: String,
    /// Model name, e.g. `gpt-4o`.
    pub model: String,
}

impl ModelKey {
    /// Create a key.
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Usage accumulated per provider+model pair, in first-use order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageLedger {
    entries: IndexMap<ModelKey, RequestUsage>,
    calls: IndexMap<ModelKey, u64>,
}

impl UsageLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the usage of one call.
    pub fn record(&mut self, provider: &str, model: &str, usage: RequestUsage) {
        let key = ModelKey::new(provider, model);
        *self.calls.entry(key.clone()).or_insert(0) += 1;
        self.entries.entry(key).or_default().merge(&usage);
    }

    /// Merge another ledger into this one.
    pub fn extend(&mut self, other: &UsageLedger) {
        for (key, usage) in &other.entries {
            self.entries.entry(key.clone()).or_default().merge(usage);
        }
        for (key, n) in &other.calls {
            *self.calls.entry(key.clone()).or_insert(0) += n;
        }
    }

    /// Usage for one provider+model pair.
    #[must_use]
    pub fn get(&self, provider: &str, model: &str) -> Option<&RequestUsage> {
        self.entries.get(&ModelKey::new(provider, model))
    }

    /// Number of calls recorded for one provider+model pair.
    #[must_use]
    pub fn calls(&self, provider: &str, model: &str) -> u64 {
        self.calls
            .get(&ModelKey::new(provider, model))
            .copied()
            .unwrap_or(0)
    }

    /// Iterate over all pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ModelKey, &RequestUsage)> {
        self.entries.iter()
    }

    /// Sum over all pairs.
    #[must_use]
    pub fn total(&self) -> RequestUsage {
        let mut total = RequestUsage::new();
        for usage in self.entries.values() {
            total.merge(usage);
        }
        total
    }

    /// Check if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Usage limits for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    /// Maximum request tokens across the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_request_tokens: Option<u64>,
    /// Maximum response tokens across the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_tokens: Option<u64>,
    /// Maximum total tokens for the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_tokens: Option<u64>,
    /// Maximum number of model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u64>,
}

impl UsageLimits {
    /// Create new empty limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max request tokens.
    #[must_use]
    pub fn max_request_tokens(mut self, tokens: u64) -> Self {
        self.max_request_tokens = Some(tokens);
        self
    }

    /// Set max response tokens.
    #[must_use]
    pub fn max_response_tokens(mut self, tokens: u64) -> Self {
        self.max_response_tokens = Some(tokens);
        self
    }

    /// Set max total tokens.
    #[must_use]
    pub fn max_total_tokens(mut self, tokens: u64) -> Self {
        self.max_total_tokens = Some(tokens);
        self
    }

    /// Set max requests.
    #[must_use]
    pub fn max_requests(mut self, requests: u64) -> Self {
        self.max_requests = Some(requests);
        self
    }

    /// Check usage against the limits.
    pub fn check(&self, usage: &RunUsage) -> Result<(), UsageLimitExceeded> {
        let checks = [
            (
                self.max_request_tokens,
                usage.total_request_tokens,
                UsageLimitType::RequestTokens,
            ),
            (
                self.max_response_tokens,
                usage.total_response_tokens,
                UsageLimitType::ResponseTokens,
            ),
            (self.max_total_tokens, usage.total_tokens, UsageLimitType::TotalTokens),
            (
                self.max_requests,
                usage.request_count() as u64,
                UsageLimitType::Requests,
            ),
        ];

        for (max, current, kind) in checks {
            if let Some(max) = max {
                if current > max {
                    return Err(UsageLimitExceeded::new(kind, current, max));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_usage_merge() {
        let mut usage = RequestUsage::with_tokens(100, 50);
        usage += RequestUsage::with_tokens(200, 100);
        assert_eq!(usage, RequestUsage::with_tokens(300, 150));
        assert_eq!(usage.total(), 450);
    }

    #[test]
    fn test_merge_into_empty() {
        let mut usage = RequestUsage::new();
        assert!(usage.is_empty());
        usage.merge(&RequestUsage::with_tokens(10, 5));
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn test_run_usage() {
        let mut run = RunUsage::new();
        run.add_request(RequestUsage::with_tokens(100, 50));
        run.add_request(RequestUsage::new());

        assert_eq!(run.request_count(), 2);
        assert_eq!(run.total_request_tokens, 100);
        assert_eq!(run.total_tokens, 150);
    }

    #[test]
    fn test_ledger_attributes_per_model() {
        let mut ledger = UsageLedger::new();
        ledger.record("openai", "gpt-4o", RequestUsage::with_tokens(100, 20));
        ledger.record("anthropic", "claude", RequestUsage::with_tokens(50, 10));
        ledger.record("openai", "gpt-4o", RequestUsage::with_tokens(30, 5));

        assert_eq!(
            ledger.get("openai", "gpt-4o"),
            Some(&RequestUsage::with_tokens(130, 25))
        );
        assert_eq!(ledger.calls("openai", "gpt-4o"), 2);
        assert_eq!(ledger.calls("anthropic", "claude"), 1);
        assert_eq!(ledger.total().total(), 215);

        let keys: Vec<String> = ledger.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["openai:gpt-4o", "anthropic:claude"]);
    }

    #[test]
    fn test_ledger_extend() {
        let mut a = UsageLedger::new();
        a.record("p", "m", RequestUsage::with_tokens(1, 1));
        let mut b = UsageLedger::new();
        b.record("p", "m", RequestUsage::with_tokens(2, 2));
        b.record("p", "n", RequestUsage::with_tokens(3, 3));

        a.extend(&b);
        assert_eq!(a.get("p", "m").map(RequestUsage::total), Some(6));
        assert_eq!(a.calls("p", "m"), 2);
        assert_eq!(a.get("p", "n").map(RequestUsage::total), Some(6));
    }

    #[test]
    fn test_usage_limits() {
        let mut run = RunUsage::new();
        run.add_request(RequestUsage::with_tokens(100, 50));

        assert!(UsageLimits::new().max_total_tokens(1000).check(&run).is_ok());

        let err = UsageLimits::new().max_total_tokens(100).check(&run).unwrap_err();
        assert_eq!(err.limit_type, UsageLimitType::TotalTokens);

        let err = UsageLimits::new().max_requests(0).check(&run).unwrap_err();
        assert_eq!(err.limit_type, UsageLimitType::Requests);
    }
}
