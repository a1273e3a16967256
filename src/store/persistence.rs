//! Sled-backed course store.
//!
//! Records are stored as JSON. Order-index uniqueness is enforced by reserving a slot key
//! `{parent}/{order_index}` with compare-and-swap before the record is written.

use super::{
    course_not_found, module_not_found, ConceptDraft, ConceptRecord, CourseDraft, CourseOutline,
    CourseRecord, CourseStore, ModuleDraft, ModuleOutline, ModuleRecord,
};
use crate::error::StoreError;
use crate::types::{ConceptId, CourseId, ModuleId};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

const TREE_COURSES: &str = "courses";
const TREE_MODULES: &str = "modules";
const TREE_CONCEPTS: &str = "concepts";
const TREE_MODULE_SLOTS: &str = "module_slots";
const TREE_CONCEPT_SLOTS: &str = "concept_slots";
const ORDER_KEY_PAD: usize = 10;

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    courses: Tree,
    modules: Tree,
    concepts: Tree,
    module_slots: Tree,
    concept_slots: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Backend(format!("Failed to open sled database: {}", e)))?;
        Self::new(db)
    }

    pub fn new(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            courses: db.open_tree(TREE_COURSES).map_err(to_backend)?,
            modules: db.open_tree(TREE_MODULES).map_err(to_backend)?,
            concepts: db.open_tree(TREE_CONCEPTS).map_err(to_backend)?,
            module_slots: db.open_tree(TREE_MODULE_SLOTS).map_err(to_backend)?,
            concept_slots: db.open_tree(TREE_CONCEPT_SLOTS).map_err(to_backend)?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(to_backend)?;
        Ok(())
    }

    /// Claim `{parent}/{order_index}` for `child`; fails if the slot is already held.
    fn reserve_slot(
        tree: &Tree,
        parent: &str,
        order_index: u32,
        child: &str,
    ) -> Result<(), StoreError> {
        let key = slot_key(parent, order_index);
        let swapped = tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(child.as_bytes()))
            .map_err(to_backend)?;
        swapped.map_err(|_| StoreError::Constraint {
            parent: parent.to_string(),
            order_index,
        })
    }

    fn slot_children(tree: &Tree, parent: &str) -> Result<Vec<(Vec<u8>, String)>, StoreError> {
        let prefix = format!("{parent}/");
        tree.scan_prefix(prefix.as_bytes())
            .map(|item| {
                let (key, value) = item.map_err(to_backend)?;
                let child = String::from_utf8(value.to_vec())
                    .map_err(|e| StoreError::Backend(format!("Corrupt slot value: {}", e)))?;
                Ok((key.to_vec(), child))
            })
            .collect()
    }
}

fn slot_key(parent: &str, order_index: u32) -> String {
    format!("{parent}/{order_index:0ORDER_KEY_PAD$}")
}

fn put_json<T: Serialize>(tree: &Tree, key: &str, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(to_data)?;
    tree.insert(key.as_bytes(), bytes).map_err(to_backend)?;
    Ok(())
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StoreError> {
    match tree.get(key.as_bytes()).map_err(to_backend)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(to_data)?)),
        None => Ok(None),
    }
}

fn to_backend(err: sled::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn to_data(err: serde_json::Error) -> StoreError {
    StoreError::Backend(format!("Invalid record data: {}", err))
}

#[async_trait]
impl CourseStore for SledStore {
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
        put_json(&self.courses, &id.to_string(), &record)?;
        Ok(id)
    }

    async fn create_module(
        &self,
        course_id: CourseId,
        order_index: u32,
        draft: ModuleDraft,
    ) -> Result<ModuleId, StoreError> {
        let course_key = course_id.to_string();
        if !self
            .courses
            .contains_key(course_key.as_bytes())
            .map_err(to_backend)?
        {
            return Err(course_not_found(course_id));
        }

        let id = ModuleId::new();
        let module_key = id.to_string();
        Self::reserve_slot(&self.module_slots, &course_key, order_index, &module_key)?;
        let record = ModuleRecord {
            id,
            course_id,
            order_index,
            title: draft.title,
            description: draft.description,
            created_at: Utc::now(),
        };
        put_json(&self.modules, &module_key, &record)?;
        Ok(id)
    }

    async fn create_concept(
        &self,
        module_id: ModuleId,
        order_index: u32,
        draft: ConceptDraft,
    ) -> Result<ConceptId, StoreError> {
        let module_key = module_id.to_string();
        if !self
            .modules
            .contains_key(module_key.as_bytes())
            .map_err(to_backend)?
        {
            return Err(module_not_found(module_id));
        }

        let id = ConceptId::new();
        let concept_key = id.to_string();
        Self::reserve_slot(&self.concept_slots, &module_key, order_index, &concept_key)?;
        let record = ConceptRecord {
            id,
            module_id,
            order_index,
            title: draft.title,
            description: draft.description,
            learning_objectives: draft.learning_objectives,
            prerequisites: draft.prerequisites,
            content: draft.content,
            created_at: Utc::now(),
        };
        put_json(&self.concepts, &concept_key, &record)?;
        Ok(id)
    }

    async fn delete_course(&self, course_id: CourseId) -> Result<(), StoreError> {
        let course_key = course_id.to_string();
        if self
            .courses
            .remove(course_key.as_bytes())
            .map_err(to_backend)?
            .is_none()
        {
            return Err(course_not_found(course_id));
        }

        for (module_slot, module_key) in Self::slot_children(&self.module_slots, &course_key)? {
            for (concept_slot, concept_key) in
                Self::slot_children(&self.concept_slots, &module_key)?
            {
                self.concepts
                    .remove(concept_key.as_bytes())
                    .map_err(to_backend)?;
                self.concept_slots.remove(concept_slot).map_err(to_backend)?;
            }
            self.modules
                .remove(module_key.as_bytes())
                .map_err(to_backend)?;
            self.module_slots.remove(module_slot).map_err(to_backend)?;
        }
        Ok(())
    }

    async fn course_outline(&self, course_id: CourseId) -> Result<CourseOutline, StoreError> {
        let course_key = course_id.to_string();
        let course: CourseRecord =
            get_json(&self.courses, &course_key)?.ok_or_else(|| course_not_found(course_id))?;

        let mut modules = Vec::new();
        for (_, module_key) in Self::slot_children(&self.module_slots, &course_key)? {
            // A reserved slot whose record write never landed is skipped.
            let Some(module) = get_json::<ModuleRecord>(&self.modules, &module_key)? else {
                continue;
            };
            let mut concepts = Vec::new();
            for (_, concept_key) in Self::slot_children(&self.concept_slots, &module_key)? {
                if let Some(concept) = get_json::<ConceptRecord>(&self.concepts, &concept_key)? {
                    concepts.push(concept);
                }
            }
            modules.push(ModuleOutline { module, concepts });
        }
        Ok(CourseOutline { course, modules })
    }
}
