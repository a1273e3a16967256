//! In-process course store.

use super::{
    course_not_found, module_not_found, ConceptDraft, ConceptRecord, CourseDraft, CourseOutline,
    CourseRecord, CourseStore, ModuleDraft, ModuleOutline, ModuleRecord,
};
use crate::error::StoreError;
use crate::types::{ConceptId, CourseId, ModuleId};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct State {
    courses: HashMap<CourseId, CourseRecord>,
    /// Modules per course keyed by order index.
    modules: HashMap<CourseId, BTreeMap<u32, ModuleRecord>>,
    module_owner: HashMap<ModuleId, CourseId>,
    /// Concepts per module keyed by order index.
    concepts: HashMap<ModuleId, BTreeMap<u32, ConceptRecord>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course_count(&self) -> usize {
        self.state.lock().courses.len()
    }

    pub fn module_count(&self) -> usize {
        self.state.lock().module_owner.len()
    }

    pub fn concept_count(&self) -> usize {
        self.state.lock().concepts.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn create_course(&self, draft: CourseDraft) -> Result<CourseId, StoreError> {
        let id = CourseId::new();
        let record = CourseRecord {
            id,
            title: draft.title,
            description: draft.description,
            topic: draft.topic,
            level: draft.level,
            created_at: Utc::now(),
        };
        self.state.lock().courses.insert(id, record);
        Ok(id)
    }

    async fn create_module(
        &self,
        course_id: CourseId,
        order_index: u32,
        draft: ModuleDraft,
    ) -> Result<ModuleId, StoreError> {
        let mut state = self.state.lock();
        if !state.courses.contains_key(&course_id) {
            return Err(course_not_found(course_id));
        }
        let slots = state.modules.entry(course_id).or_default();
        if slots.contains_key(&order_index) {
            return Err(StoreError::Constraint {
                parent: format!("course {}", course_id),
                order_index,
            });
        }
        let id = ModuleId::new();
        slots.insert(
            order_index,
            ModuleRecord {
                id,
                course_id,
                order_index,
                title: draft.title,
                description: draft.description,
                created_at: Utc::now(),
            },
        );
        state.module_owner.insert(id, course_id);
        Ok(id)
    }

    async fn create_concept(
        &self,
        module_id: ModuleId,
        order_index: u32,
        draft: ConceptDraft,
    ) -> Result<ConceptId, StoreError> {
        let mut state = self.state.lock();
        if !state.module_owner.contains_key(&module_id) {
            return Err(module_not_found(module_id));
        }
        let slots = state.concepts.entry(module_id).or_default();
        if slots.contains_key(&order_index) {
            return Err(StoreError::Constraint {
                parent: format!("module {}", module_id),
                order_index,
            });
        }
        let id = ConceptId::new();
        slots.insert(
            order_index,
            ConceptRecord {
                id,
                module_id,
                order_index,
                title: draft.title,
                description: draft.description,
                learning_objectives: draft.learning_objectives,
                prerequisites: draft.prerequisites,
                content: draft.content,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn delete_course(&self, course_id: CourseId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.courses.remove(&course_id).is_none() {
            return Err(course_not_found(course_id));
        }
        let modules = state.modules.remove(&course_id).unwrap_or_default();
        for module in modules.values() {
            state.module_owner.remove(&module.id);
            state.concepts.remove(&module.id);
        }
        Ok(())
    }

    async fn course_outline(&self, course_id: CourseId) -> Result<CourseOutline, StoreError> {
        let state = self.state.lock();
        let course = state
            .courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| course_not_found(course_id))?;
        let modules = state
            .modules
            .get(&course_id)
            .map(|slots| {
                slots
                    .values()
                    .map(|module| ModuleOutline {
                        module: module.clone(),
                        concepts: state
                            .concepts
                            .get(&module.id)
                            .map(|c| c.values().cloned().collect())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(CourseOutline { course, modules })
    }
}
