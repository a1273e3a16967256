//! Course Store
//!
//! Durable home of published courses, modules and concepts. Every adapter enforces
//! `unique(parent, order_index)` atomically and deletes a course together with its modules
//! and concepts.

pub mod memory;
pub mod persistence;

pub use memory::MemoryStore;
pub use persistence::SledStore;

use crate::course::{ConceptSpec, CourseLevel, CourseSpec, CourseTopic, ModuleSpec};
use crate::error::StoreError;
use crate::types::{ConceptId, CourseId, ModuleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDraft {
    pub title: String,
    pub description: Option<String>,
    pub topic: CourseTopic,
    pub level: CourseLevel,
}

impl From<&CourseSpec> for CourseDraft {
    fn from(spec: &CourseSpec) -> Self {
        Self {
            title: spec.title.clone(),
            description: spec.description.clone(),
            topic: spec.topic,
            level: spec.level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub title: String,
    pub description: Option<String>,
}

impl From<&ModuleSpec> for ModuleDraft {
    fn from(spec: &ModuleSpec) -> Self {
        Self {
            title: spec.title.clone(),
            description: spec.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDraft {
    pub title: String,
    pub description: Option<String>,
    pub learning_objectives: Vec<String>,
    pub prerequisites: Vec<String>,
    pub content: String,
}

impl ConceptDraft {
    pub fn from_spec(spec: &ConceptSpec, content: String) -> Self {
        Self {
            title: spec.title.clone(),
            description: spec.description.clone(),
            learning_objectives: spec.learning_objectives.clone(),
            prerequisites: spec.prerequisites.clone(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub topic: CourseTopic,
    pub level: CourseLevel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub course_id: CourseId,
    pub order_index: u32,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: ConceptId,
    pub module_id: ModuleId,
    pub order_index: u32,
    pub title: String,
    pub description: Option<String>,
    pub learning_objectives: Vec<String>,
    pub prerequisites: Vec<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A course read back with its modules and concepts in order-index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseOutline {
    pub course: CourseRecord,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutline {
    pub module: ModuleRecord,
    pub concepts: Vec<ConceptRecord>,
}

impl CourseOutline {
    pub fn module_indices(&self) -> Vec<u32> {
        self.modules.iter().map(|m| m.module.order_index).collect()
    }

    pub fn concept_count(&self) -> usize {
        self.modules.iter().map(|m| m.concepts.len()).sum()
    }
}

impl ModuleOutline {
    pub fn concept_indices(&self) -> Vec<u32> {
        self.concepts.iter().map(|c| c.order_index).collect()
    }
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn create_course(&self, draft: CourseDraft) -> Result<CourseId, StoreError>;

    /// Fails with `StoreError::Constraint` when `order_index` is taken under the course.
    async fn create_module(
        &self,
        course_id: CourseId,
        order_index: u32,
        draft: ModuleDraft,
    ) -> Result<ModuleId, StoreError>;

    /// Fails with `StoreError::Constraint` when `order_index` is taken under the module.
    async fn create_concept(
        &self,
        module_id: ModuleId,
        order_index: u32,
        draft: ConceptDraft,
    ) -> Result<ConceptId, StoreError>;

    /// Remove a course with all of its modules and concepts.
    async fn delete_course(&self, course_id: CourseId) -> Result<(), StoreError>;

    async fn course_outline(&self, course_id: CourseId) -> Result<CourseOutline, StoreError>;
}

pub(crate) fn course_not_found(course_id: CourseId) -> StoreError {
    StoreError::NotFound {
        entity: "course",
        id: course_id.to_string(),
    }
}

pub(crate) fn module_not_found(module_id: ModuleId) -> StoreError {
    StoreError::NotFound {
        entity: "module",
        id: module_id.to_string(),
    }
}
