//! Workflow steps and their prompt templates.
//!
//! Each step is bound to exactly one prompt id, and each prompt id to one template. The
//! binding is resolved once at startup; a missing step, dangling prompt id or unknown
//! placeholder is a configuration error rather than a runtime fallback.

use crate::course::{ConceptSpec, CourseLevel, CourseSpec, CourseTopic, ModuleSpec};
use crate::error::{ConfigIssue, ProviderError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

const CURRENT_CONTENT_LIMIT: usize = 1000;
const VALIDATION_CONTENT_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    ConceptGeneration,
    ConceptRegeneration,
    ContentValidation,
    CoursePlanning,
    ConceptPlanning,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 5] = [
        WorkflowStep::ConceptGeneration,
        WorkflowStep::ConceptRegeneration,
        WorkflowStep::ContentValidation,
        WorkflowStep::CoursePlanning,
        WorkflowStep::ConceptPlanning,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::ConceptGeneration => "concept_generation",
            WorkflowStep::ConceptRegeneration => "concept_regeneration",
            WorkflowStep::ContentValidation => "content_validation",
            WorkflowStep::CoursePlanning => "course_planning",
            WorkflowStep::ConceptPlanning => "concept_planning",
        }
    }

    /// Placeholders a template bound to this step may reference.
    pub fn variables(self) -> &'static [&'static str] {
        match self {
            WorkflowStep::ConceptGeneration => CONCEPT_VARIABLES,
            WorkflowStep::ConceptRegeneration => REGENERATION_VARIABLES,
            WorkflowStep::ContentValidation => &["content"],
            WorkflowStep::CoursePlanning => &["topic", "level", "num_modules"],
            WorkflowStep::ConceptPlanning => CONCEPT_PLANNING_VARIABLES,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CONCEPT_VARIABLES: &[&str] = &[
    "title",
    "description",
    "objectives",
    "prerequisites",
    "module_context",
    "level",
    "topic",
    "course_title",
];

const REGENERATION_VARIABLES: &[&str] = &[
    "title",
    "description",
    "objectives",
    "prerequisites",
    "module_context",
    "level",
    "topic",
    "course_title",
    "concept_title",
    "current_content",
    "feedback",
];

const CONCEPT_PLANNING_VARIABLES: &[&str] = &[
    "topic",
    "level",
    "course_title",
    "module_title",
    "module_description",
    "num_concepts",
];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("placeholder pattern"))
}

/// Named values substituted into a prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVariables {
    values: BTreeMap<String, String>,
}

impl PromptVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Variables for generating one concept in the context of its module and course.
    pub fn for_concept(course: &CourseSpec, module: &ModuleSpec, concept: &ConceptSpec) -> Self {
        let mut vars = Self::new();
        vars.insert("title", concept.title.clone())
            .insert(
                "description",
                non_blank(concept.description.as_deref()).unwrap_or("No description provided"),
            )
            .insert("objectives", bullet_list(&concept.learning_objectives))
            .insert("prerequisites", bullet_list(&concept.prerequisites))
            .insert(
                "module_context",
                format!(
                    "{} - {}",
                    module.title,
                    module.description.as_deref().unwrap_or_default()
                ),
            )
            .insert("level", course.level.as_str())
            .insert("topic", course.topic.as_str())
            .insert("course_title", course.title.clone());
        vars
    }

    /// Extend concept variables with the rejected draft and the reviewer feedback.
    pub fn with_regeneration(&self, current_content: &str, feedback: &str) -> Self {
        let mut vars = self.clone();
        let title = self.get("title").unwrap_or_default().to_string();
        vars.insert("concept_title", title)
            .insert(
                "current_content",
                truncate_with_ellipsis(current_content, CURRENT_CONTENT_LIMIT),
            )
            .insert(
                "feedback",
                non_blank(Some(feedback)).unwrap_or("No specific feedback provided"),
            );
        vars
    }

    /// Variables for proposing a course title and `num_modules` module outlines.
    pub fn for_course_plan(topic: CourseTopic, level: CourseLevel, num_modules: usize) -> Self {
        let mut vars = Self::new();
        vars.insert("topic", topic.as_str())
            .insert("level", level.as_str())
            .insert("num_modules", num_modules.to_string());
        vars
    }

    /// Variables for proposing `num_concepts` concepts of one module.
    pub fn for_concept_plan(
        topic: CourseTopic,
        level: CourseLevel,
        course_title: &str,
        module_title: &str,
        module_description: Option<&str>,
        num_concepts: u32,
    ) -> Self {
        let mut vars = Self::new();
        vars.insert("topic", topic.as_str())
            .insert("level", level.as_str())
            .insert("course_title", course_title)
            .insert("module_title", module_title)
            .insert(
                "module_description",
                non_blank(module_description).unwrap_or("No description provided"),
            )
            .insert("num_concepts", num_concepts.to_string());
        vars
    }

    pub fn for_validation(content: &str) -> Self {
        let mut vars = Self::new();
        vars.insert(
            "content",
            truncate_with_ellipsis(content, VALIDATION_CONTENT_LIMIT),
        );
        vars
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "None specified".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A prompt template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub id: String,
    pub template: String,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
        }
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        placeholder_pattern()
            .captures_iter(&self.template)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Substitute every placeholder. Any placeholder without a value is an error.
    pub fn render(&self, vars: &PromptVariables) -> Result<String, ProviderError> {
        let mut missing = None;
        let rendered = placeholder_pattern().replace_all(&self.template, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => value.to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(ProviderError::Template(format!(
                "prompt '{}' references missing variable '{}'",
                self.id, name
            ))),
            None => Ok(rendered.into_owned()),
        }
    }
}

/// Step to template binding, fully resolved.
#[derive(Debug, Clone)]
pub struct Workflow {
    templates: HashMap<WorkflowStep, PromptTemplate>,
}

impl Workflow {
    /// Bind every step to its template, reporting every gap at once.
    pub fn resolve(
        steps: &BTreeMap<WorkflowStep, String>,
        prompts: &BTreeMap<String, String>,
    ) -> Result<Self, Vec<ConfigIssue>> {
        let mut issues = Vec::new();
        let mut templates = HashMap::new();

        for step in WorkflowStep::ALL {
            let key = format!("workflow.steps.{}", step);
            let Some(prompt_id) = steps.get(&step) else {
                issues.push(ConfigIssue::new(key, "no prompt is bound to this step"));
                continue;
            };
            let Some(body) = prompts.get(prompt_id) else {
                issues.push(ConfigIssue::new(
                    key,
                    format!("prompt '{}' is not defined under workflow.prompts", prompt_id),
                ));
                continue;
            };
            let template = PromptTemplate::new(prompt_id.clone(), body.clone());
            for name in template.placeholders() {
                if !step.variables().contains(&name) {
                    issues.push(ConfigIssue::new(
                        format!("workflow.prompts.{}", prompt_id),
                        format!("placeholder '{{{}}}' is not available to step {}", name, step),
                    ));
                }
            }
            templates.insert(step, template);
        }

        if issues.is_empty() {
            Ok(Self { templates })
        } else {
            Err(issues)
        }
    }

    pub fn builtin() -> Self {
        let templates = WorkflowStep::ALL
            .into_iter()
            .map(|step| (step, PromptTemplate::new(step.as_str(), builtin_template(step))))
            .collect();
        Self { templates }
    }

    pub fn template(&self, step: WorkflowStep) -> Option<&PromptTemplate> {
        self.templates.get(&step)
    }

    pub fn render(&self, step: WorkflowStep, vars: &PromptVariables) -> Result<String, ProviderError> {
        self.template(step)
            .ok_or_else(|| ProviderError::Template(format!("no prompt bound to step {}", step)))?
            .render(vars)
    }
}

/// Default step bindings: each step uses the prompt id of the same name.
pub fn default_steps() -> BTreeMap<WorkflowStep, String> {
    WorkflowStep::ALL
        .into_iter()
        .map(|step| (step, step.as_str().to_string()))
        .collect()
}

pub fn default_prompts() -> BTreeMap<String, String> {
    WorkflowStep::ALL
        .into_iter()
        .map(|step| (step.as_str().to_string(), builtin_template(step).to_string()))
        .collect()
}

fn builtin_template(step: WorkflowStep) -> &'static str {
    match step {
        WorkflowStep::ConceptGeneration => CONCEPT_GENERATION_PROMPT,
        WorkflowStep::ConceptRegeneration => CONCEPT_REGENERATION_PROMPT,
        WorkflowStep::ContentValidation => CONTENT_VALIDATION_PROMPT,
        WorkflowStep::CoursePlanning => COURSE_PLANNING_PROMPT,
        WorkflowStep::ConceptPlanning => CONCEPT_PLANNING_PROMPT,
    }
}

const CONCEPT_GENERATION_PROMPT: &str = "\
You are an expert educator writing one lesson of the course \"{course_title}\" ({topic}, {level} level).

Module: {module_context}

Concept: {title}
Description: {description}

Learning objectives:
{objectives}

Prerequisites:
{prerequisites}

Write the lesson as self-contained HTML using headings, paragraphs, lists and examples. \
Do not include scripts, iframes or embedded objects. Return only the HTML.";

const CONCEPT_REGENERATION_PROMPT: &str = "\
You are revising a lesson on \"{concept_title}\" for the course \"{course_title}\" ({level} level).

Module: {module_context}

Learning objectives:
{objectives}

The previous draft was rejected. Draft excerpt:
{current_content}

Reviewer feedback:
{feedback}

Rewrite the lesson as self-contained HTML that addresses every point of feedback. \
Do not include scripts, iframes or embedded objects. Return only the HTML.";

const CONTENT_VALIDATION_PROMPT: &str = "\
Review the following lesson content for factual accuracy, clarity and safety for learners.

Content:
{content}

Answer with a single JSON object of the form \
{\"is_valid\": true or false, \"feedback\": \"short explanation\"} and nothing else.";

const COURSE_PLANNING_PROMPT: &str = "\
You are an instructional designer planning a {level} level course on {topic}.

Propose a course title, a short course description and exactly {num_modules} modules, \
each with a title and a one sentence description, ordered from first to last.

Answer with a single JSON object of the form \
{\"course_title\": \"...\", \"course_description\": \"...\", \
\"module_plans\": [{\"module_title\": \"...\", \"module_description\": \"...\"}]} and nothing else.";

const CONCEPT_PLANNING_PROMPT: &str = "\
You are an instructional designer planning the module \"{module_title}\" of the course \
\"{course_title}\" ({topic}, {level} level).

Module description: {module_description}

Propose exactly {num_concepts} key concepts in teaching order. For each give a title, a short \
description, two or three learning objectives and one or two prerequisites.

Answer with a single JSON object of the form \
{\"concepts\": [{\"concept_title\": \"...\", \"concept_description\": \"...\", \
\"learning_objectives\": [\"...\"], \"prerequisites\": [\"...\"]}]} and nothing else.";
