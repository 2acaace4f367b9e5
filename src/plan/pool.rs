//! Resource pool abstraction for the plan allocator
//!
//! The allocator never touches MongoDB directly; it queries through this
//! trait so tests can run against an in-memory pool.

use std::collections::HashSet;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId};

use super::{Category, PlanResource};
use crate::db::mongo::MongoCollection;
use crate::db::schemas::ResourceDoc;
use crate::types::Result;

/// Query seam between the allocator and resource storage
#[async_trait]
pub trait ResourcePool: Send + Sync {
    /// All resources whose category is in `categories` and whose id is not
    /// in `exclude`, fully materialized.
    async fn candidates(
        &self,
        categories: &[Category],
        exclude: &HashSet<String>,
    ) -> Result<Vec<PlanResource>>;
}

/// Production pool backed by the resources collection
pub struct MongoResourcePool {
    collection: MongoCollection<ResourceDoc>,
}

impl MongoResourcePool {
    pub fn new(collection: MongoCollection<ResourceDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl ResourcePool for MongoResourcePool {
    async fn candidates(
        &self,
        categories: &[Category],
        exclude: &HashSet<String>,
    ) -> Result<Vec<PlanResource>> {
        let labels: Vec<&str> = categories.iter().map(|c| c.label()).collect();
        let excluded_ids: Vec<ObjectId> = exclude
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();

        let filter = doc! {
            "category": { "$in": labels },
            "_id": { "$nin": excluded_ids },
        };

        let docs = self.collection.find_many(filter).await?;
        Ok(docs.into_iter().filter_map(|d| d.into_plan_resource()).collect())
    }
}
