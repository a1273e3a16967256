//! Rule-based HTML checks: size, document structure, embedded objects and dangerous script
//! calls.

use crate::retry::Outcome;
use crate::validator::{ValidationReport, Validator, Verdict};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DANGEROUS_SCRIPT_PATTERNS: &[&str] = &[
    r"eval\s*\(",
    r"document\.write",
    r"window\.open",
    r"fetch\s*\(",
    r"XMLHttpRequest",
    r"localStorage",
    r"sessionStorage",
    r"indexedDB",
    r"postMessage",
    r"importScripts",
    r"Function\s*\(",
    r"constructor\s*\(",
    r"__proto__",
    r"prototype",
];

/// Document elements whose absence is reported as a warning.
const STRUCTURE_TAGS: &[&str] = &["html", "head", "body"];

const TRUSTED_SCRIPT_HOSTS: &[&str] = &[
    "cdn.jsdelivr.net",
    "unpkg.com",
    "cdnjs.cloudflare.com",
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "code.jquery.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Maximum content length in characters.
    pub max_content_length: usize,
    pub forbidden_tags: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_content_length: 50_000,
            forbidden_tags: vec![
                "iframe".to_string(),
                "object".to_string(),
                "embed".to_string(),
            ],
        }
    }
}

pub struct RuleValidator {
    config: RuleConfig,
    forbidden_tag: Option<Regex>,
    script_block: Regex,
    script_src: Regex,
    structure: Vec<(&'static str, Regex)>,
    dangerous: Vec<(&'static str, Regex)>,
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("static validation pattern")
}

impl RuleValidator {
    pub fn new(config: RuleConfig) -> Self {
        let tags: Vec<String> = config
            .forbidden_tags
            .iter()
            .map(|t| regex::escape(t.trim()))
            .filter(|t| !t.is_empty())
            .collect();
        let forbidden_tag = if tags.is_empty() {
            None
        } else {
            Some(case_insensitive(&format!(r"<\s*({})\b", tags.join("|"))))
        };

        Self {
            config,
            forbidden_tag,
            script_block: case_insensitive(r"<script\b([^>]*)>(.*?)</script\s*>"),
            script_src: case_insensitive(r#"\bsrc\s*=\s*["']?([^"'\s>]+)"#),
            structure: STRUCTURE_TAGS
                .iter()
                .map(|tag| (*tag, case_insensitive(&format!(r"<\s*{}\b", tag))))
                .collect(),
            dangerous: DANGEROUS_SCRIPT_PATTERNS
                .iter()
                .map(|p| (*p, case_insensitive(p)))
                .collect(),
        }
    }

    /// Synchronous check used by the async trait method.
    pub fn check(&self, content: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        if content.trim().is_empty() {
            report.errors.push("Content is empty".to_string());
            return report;
        }

        if content.chars().count() > self.config.max_content_length {
            report.errors.push(format!(
                "Content exceeds maximum length of {} characters",
                self.config.max_content_length
            ));
        }

        for (tag, pattern) in &self.structure {
            if !pattern.is_match(content) {
                report.warnings.push(format!("Missing <{}> tag", tag));
            }
        }

        if let Some(pattern) = &self.forbidden_tag {
            let mut found: Vec<String> = Vec::new();
            for tag in pattern
                .captures_iter(content)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_lowercase()))
            {
                if !found.contains(&tag) {
                    found.push(tag);
                }
            }
            if !found.is_empty() {
                report
                    .errors
                    .push(format!("Dangerous tags found: {}", found.join(", ")));
            }
        }

        for script in self.script_block.captures_iter(content) {
            let attrs = script.get(1).map(|m| m.as_str()).unwrap_or_default();
            let body = script.get(2).map(|m| m.as_str()).unwrap_or_default();

            for (source, pattern) in &self.dangerous {
                if pattern.is_match(body) {
                    report
                        .errors
                        .push(format!("Dangerous JavaScript pattern detected: {}", source));
                }
            }

            if let Some(src) = self.script_src.captures(attrs).and_then(|c| c.get(1)) {
                if !is_trusted_resource(src.as_str()) {
                    report.warnings.push(format!(
                        "External script from untrusted source: {}",
                        src.as_str()
                    ));
                }
            }
        }

        report
    }
}

/// Relative and protocol-relative (`//host/..`) sources count as trusted.
fn is_trusted_resource(url: &str) -> bool {
    url.is_empty()
        || url.starts_with('/')
        || url.starts_with("./")
        || url.starts_with("../")
        || TRUSTED_SCRIPT_HOSTS.iter().any(|host| url.contains(host))
}

#[async_trait]
impl Validator for RuleValidator {
    async fn validate(&self, content: &str) -> Outcome<Verdict> {
        let report = self.check(content);
        if !report.warnings.is_empty() {
            debug!(warnings = ?report.warnings, "Content validation warnings");
        }
        Outcome::Success(Verdict::from_report(report))
    }
}
