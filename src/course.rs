//! Course Spec Tree
//!
//! The caller-supplied outline of one course: an ordered list of modules, each holding an
//! ordered list of concepts. Position inside a parent sequence is the authoritative order
//! index (1-based); it is fixed when the spec is read and never renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod request;
pub mod validation;

pub use request::{ModulePlan, PublishRequest};
pub use validation::{validate_request, validate_spec};

/// Available course topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseTopic {
    ComputerScience,
    Mathematics,
    Physics,
    Chemistry,
    Biology,
    Programming,
    DataScience,
    MachineLearning,
    IntradayTrading,
    Calculus,
    Metallurgy,
}

impl CourseTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            CourseTopic::ComputerScience => "computer-science",
            CourseTopic::Mathematics => "mathematics",
            CourseTopic::Physics => "physics",
            CourseTopic::Chemistry => "chemistry",
            CourseTopic::Biology => "biology",
            CourseTopic::Programming => "programming",
            CourseTopic::DataScience => "data-science",
            CourseTopic::MachineLearning => "machine-learning",
            CourseTopic::IntradayTrading => "intraday-trading",
            CourseTopic::Calculus => "calculus",
            CourseTopic::Metallurgy => "metallurgy",
        }
    }
}

impl fmt::Display for CourseTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Course difficulty levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CourseSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub topic: CourseTopic,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Optional explicit position; when given it must match the sequence position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u32>,
    #[serde(default)]
    pub concepts: Vec<ConceptSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u32>,
}

/// Identifies one concept inside a spec by its module position and order index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptRef {
    pub module_position: u32,
    pub order_index: u32,
    pub title: String,
}

impl fmt::Display for ConceptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} concept {} ('{}')",
            self.module_position, self.order_index, self.title
        )
    }
}

impl CourseSpec {
    pub fn concept_count(&self) -> usize {
        self.modules.iter().map(|m| m.concepts.len()).sum()
    }

    /// Modules paired with their 1-based order index.
    pub fn positioned_modules(&self) -> impl Iterator<Item = (u32, &ModuleSpec)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, module)| (position(i), module))
    }
}

impl ModuleSpec {
    /// Concepts paired with their 1-based order index.
    pub fn positioned_concepts(&self) -> impl Iterator<Item = (u32, &ConceptSpec)> {
        self.concepts
            .iter()
            .enumerate()
            .map(|(i, concept)| (position(i), concept))
    }
}

fn position(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}
