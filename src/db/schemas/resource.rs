//! Content resource document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::plan::{Category, PlanResource};

/// Collection name for resources
pub const RESOURCE_COLLECTION: &str = "resources";

/// Content resource stored in MongoDB.
///
/// `category` is stored as its Spanish display label, matching what the
/// plan allocator queries for.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ResourceDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    pub title: String,

    pub author: String,

    pub duration_minutes: i64,

    #[serde(default)]
    pub description: String,

    /// Opaque media reference (URL or blob id)
    pub content: String,
}

impl ResourceDoc {
    pub fn new(
        category: Category,
        title: String,
        author: String,
        duration_minutes: i64,
        description: String,
        content: String,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            category: Some(category),
            title,
            author,
            duration_minutes,
            description,
            content,
        }
    }

    /// Snapshot for embedding in a daily plan. None if the document has no
    /// id or category (can only happen for malformed documents).
    pub fn into_plan_resource(self) -> Option<PlanResource> {
        Some(PlanResource {
            id: self._id?.to_hex(),
            category: self.category?,
            title: self.title,
            author: self.author,
            duration_minutes: self.duration_minutes,
            description: self.description,
            content: self.content,
        })
    }
}

impl IntoIndexes for ResourceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "category": 1 },
            Some(
                IndexOptions::builder()
                    .name("category_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ResourceDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_plan_resource() {
        let mut doc = ResourceDoc::new(
            Category::Podcast,
            "Calma diaria".into(),
            "Equipo Calma".into(),
            25,
            "Episodio semanal".into(),
            "https://media.example/ep1".into(),
        );
        doc._id = Some(ObjectId::new());

        let resource = doc.clone().into_plan_resource().unwrap();
        assert_eq!(resource.category, Category::Podcast);
        assert_eq!(resource.title, "Calma diaria");
        assert_eq!(resource.id, doc._id.unwrap().to_hex());
    }

    #[test]
    fn test_into_plan_resource_requires_id() {
        let doc = ResourceDoc::new(
            Category::Learning,
            "t".into(),
            "a".into(),
            5,
            String::new(),
            "c".into(),
        );
        assert!(doc.into_plan_resource().is_none());
    }

    #[test]
    fn test_category_serializes_as_label() {
        let mut doc = ResourceDoc::new(
            Category::Breathing,
            "4-7-8".into(),
            "a".into(),
            5,
            String::new(),
            "c".into(),
        );
        doc._id = Some(ObjectId::new());

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["category"], "Ejercicios de Respiración");
    }
}
