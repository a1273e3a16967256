//! Content validation seam.
//!
//! A validator judges generated content. `Fail` carries a report whose feedback is fed into
//! regeneration; call failures are reported through `Outcome` like generator failures.

use crate::provider::ChatClient;
use crate::retry::Outcome;
use crate::workflow::Workflow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod review;
pub mod rules;

pub use review::ReviewValidator;
pub use rules::{RuleConfig, RuleValidator};

/// Problems found in one piece of content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    /// Noted but not disqualifying.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Text handed to the generator when asking for a replacement.
    pub fn feedback(&self) -> String {
        self.errors.join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(ValidationReport),
}

impl Verdict {
    pub fn from_report(report: ValidationReport) -> Self {
        if report.is_clean() {
            Verdict::Pass
        } else {
            Verdict::Fail(report)
        }
    }
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, content: &str) -> Outcome<Verdict>;
}

/// Runs validators in order and stops at the first one that does not pass.
pub struct ChainValidator {
    validators: Vec<Arc<dyn Validator>>,
}

impl ChainValidator {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl Validator for ChainValidator {
    async fn validate(&self, content: &str) -> Outcome<Verdict> {
        for validator in &self.validators {
            match validator.validate(content).await {
                Outcome::Success(Verdict::Pass) => continue,
                other => return other,
            }
        }
        Outcome::Success(Verdict::Pass)
    }
}

/// Which validators run on generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Off,
    #[default]
    Rules,
    RulesAndReview,
}

/// Assemble the validator for `mode`; `None` when validation is off.
pub fn build_validator(
    mode: ValidationMode,
    rules: &RuleConfig,
    client: Arc<dyn ChatClient>,
    workflow: Arc<Workflow>,
) -> Option<Arc<dyn Validator>> {
    match mode {
        ValidationMode::Off => None,
        ValidationMode::Rules => Some(Arc::new(RuleValidator::new(rules.clone()))),
        ValidationMode::RulesAndReview => Some(Arc::new(ChainValidator::new(vec![
            Arc::new(RuleValidator::new(rules.clone())),
            Arc::new(ReviewValidator::new(client, workflow)),
        ]))),
    }
}
