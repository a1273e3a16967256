//! Structural validation of a course spec.
//!
//! Every issue is collected so a caller sees the whole list in one response.

use super::{ConceptSpec, CourseSpec, ModuleSpec, PublishRequest};
use crate::error::{PublishError, SpecIssue};
use std::ops::RangeInclusive;

pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_LIST_ITEMS: usize = 10;
pub const MAX_LIST_ITEM_CHARS: usize = 100;
/// Allowed `num_modules` and `concepts_per_module` in a publish request.
pub const PLAN_COUNT_RANGE: RangeInclusive<u32> = 1..=10;

/// Check a spec before any job is created for it.
pub fn validate_spec(spec: &CourseSpec) -> Result<(), PublishError> {
    let issues = collect_issues(spec);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(PublishError::SpecValidation(issues))
    }
}

pub fn collect_issues(spec: &CourseSpec) -> Vec<SpecIssue> {
    let mut issues = Vec::new();

    check_title(&mut issues, "title", &spec.title);
    check_description(&mut issues, "description", spec.description.as_deref());

    if spec.modules.is_empty() {
        issues.push(SpecIssue::new("modules", "at least one module is required"));
    }

    for (position, module) in spec.positioned_modules() {
        check_module(&mut issues, position, module);
    }

    issues
}

/// Check a publish request before any planning happens.
pub fn validate_request(request: &PublishRequest) -> Result<(), PublishError> {
    let mut issues = Vec::new();

    for (path, count) in [
        ("num_modules", request.num_modules),
        ("concepts_per_module", request.concepts_per_module),
    ] {
        if !PLAN_COUNT_RANGE.contains(&count) {
            issues.push(SpecIssue::new(
                path,
                format!(
                    "must be between {} and {}",
                    PLAN_COUNT_RANGE.start(),
                    PLAN_COUNT_RANGE.end()
                ),
            ));
        }
    }
    if let Some(title) = &request.course_title {
        check_title(&mut issues, "course_title", title);
    }
    check_description(
        &mut issues,
        "course_description",
        request.course_description.as_deref(),
    );

    if let Some(modules) = &request.modules {
        if modules.is_empty() {
            issues.push(SpecIssue::new("modules", "must not be empty when given"));
        }
        for (i, module) in modules.iter().enumerate() {
            let base = format!("modules[{i}]");
            check_title(&mut issues, &format!("{base}.title"), &module.title);
            check_description(&mut issues, &format!("{base}.description"), module.description.as_deref());
            for (j, concept) in module.concepts.iter().enumerate() {
                let position = u32::try_from(j + 1).unwrap_or(u32::MAX);
                check_concept(&mut issues, &format!("{base}.concepts[{j}]"), position, concept);
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PublishError::SpecValidation(issues))
    }
}

fn check_module(issues: &mut Vec<SpecIssue>, position: u32, module: &ModuleSpec) {
    let base = format!("modules[{}]", position - 1);
    check_title(issues, &format!("{base}.title"), &module.title);
    check_description(issues, &format!("{base}.description"), module.description.as_deref());
    check_order(issues, &format!("{base}.order_index"), module.order_index, position);

    for (order_index, concept) in module.positioned_concepts() {
        let path = format!("{base}.concepts[{}]", order_index - 1);
        check_concept(issues, &path, order_index, concept);
    }
}

fn check_concept(issues: &mut Vec<SpecIssue>, base: &str, position: u32, concept: &ConceptSpec) {
    check_title(issues, &format!("{base}.title"), &concept.title);
    check_description(issues, &format!("{base}.description"), concept.description.as_deref());
    check_order(issues, &format!("{base}.order_index"), concept.order_index, position);
    check_list(
        issues,
        &format!("{base}.learning_objectives"),
        &concept.learning_objectives,
    );
    check_list(issues, &format!("{base}.prerequisites"), &concept.prerequisites);
}

fn check_title(issues: &mut Vec<SpecIssue>, path: &str, title: &str) {
    if title.trim().is_empty() {
        issues.push(SpecIssue::new(path, "must not be empty"));
    } else if title.chars().count() > MAX_TITLE_CHARS {
        issues.push(SpecIssue::new(
            path,
            format!("must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }
}

fn check_description(issues: &mut Vec<SpecIssue>, path: &str, description: Option<&str>) {
    if let Some(text) = description {
        if text.chars().count() > MAX_DESCRIPTION_CHARS {
            issues.push(SpecIssue::new(
                path,
                format!("must be at most {MAX_DESCRIPTION_CHARS} characters"),
            ));
        }
    }
}

fn check_order(issues: &mut Vec<SpecIssue>, path: &str, declared: Option<u32>, position: u32) {
    match declared {
        None => {}
        Some(0) => issues.push(SpecIssue::new(path, "must be a positive integer")),
        Some(value) if value != position => issues.push(SpecIssue::new(
            path,
            format!("declares {value} but the entry sits at position {position}"),
        )),
        Some(_) => {}
    }
}

fn check_list(issues: &mut Vec<SpecIssue>, path: &str, items: &[String]) {
    if items.len() > MAX_LIST_ITEMS {
        issues.push(SpecIssue::new(
            path,
            format!("must contain at most {MAX_LIST_ITEMS} items"),
        ));
    }
    for (i, item) in items.iter().enumerate() {
        if item.trim().is_empty() {
            issues.push(SpecIssue::new(format!("{path}[{i}]"), "must not be empty"));
        } else if item.chars().count() > MAX_LIST_ITEM_CHARS {
            issues.push(SpecIssue::new(
                format!("{path}[{i}]"),
                format!("must be at most {MAX_LIST_ITEM_CHARS} characters"),
            ));
        }
    }
}
