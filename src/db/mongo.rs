//! MongoDB client and collection wrapper
//!
//! Every document in Calma carries a `Metadata` subdocument, so reads
//! filter out soft-deleted rows and writes keep the timestamps current
//! without each route handler repeating that bookkeeping. Most lookups
//! address a single document by its ObjectId (a user, a resource), so
//! the wrapper exposes by-id forms directly.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::CalmaError;

/// Index definitions declared by a schema
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Access to a schema's metadata subdocument
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, CalmaError> {
        info!("Connecting to MongoDB at {}", uri);

        // Bounded server selection so startup fails fast when MongoDB
        // is unreachable instead of hanging
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| CalmaError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CalmaError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Open a typed collection, creating its declared indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, CalmaError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed collection handle with soft-delete and metadata handling built in
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, CalmaError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.ensure_indexes().await?;

        Ok(mongo_collection)
    }

    /// Create the schema's indexes; unique and TTL constraints live here
    async fn ensure_indexes(&self) -> Result<(), CalmaError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| CalmaError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping its metadata
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, CalmaError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| CalmaError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| CalmaError::Database("Failed to get inserted ID".into()))
    }

    /// Fetch one live document by its ObjectId
    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>, CalmaError> {
        self.find_one(doc! { "_id": id }).await
    }

    /// Find one live document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, CalmaError> {
        self.inner
            .find_one(with_live_filter(filter))
            .await
            .map_err(|e| CalmaError::Database(format!("Find failed: {}", e)))
    }

    /// Find all live documents matching the filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, CalmaError> {
        let cursor = self
            .inner
            .find(with_live_filter(filter))
            .await
            .map_err(|e| CalmaError::Database(format!("Find failed: {}", e)))?;

        collect_cursor(cursor).await
    }

    /// Find live documents matching the filter, sorted server-side
    pub async fn find_many_sorted(
        &self,
        filter: Document,
        sort: Document,
    ) -> Result<Vec<T>, CalmaError> {
        let cursor = self
            .inner
            .find(with_live_filter(filter))
            .sort(sort)
            .await
            .map_err(|e| CalmaError::Database(format!("Find failed: {}", e)))?;

        collect_cursor(cursor).await
    }

    /// Apply an update to the document with the given ObjectId
    pub async fn update_by_id(
        &self,
        id: ObjectId,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, CalmaError> {
        self.update_one(doc! { "_id": id }, update).await
    }

    /// Apply an update to the first document matching the filter
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, CalmaError> {
        let modifications = update.into();

        self.inner
            .update_one(filter, modifications)
            .await
            .map_err(|e| CalmaError::Database(format!("Update failed: {}", e)))
    }

    /// Mark the document with the given ObjectId as deleted.
    /// The row stays in the collection but no read returns it.
    pub async fn soft_delete(&self, id: ObjectId) -> Result<UpdateResult, CalmaError> {
        let update = doc! {
            "$set": {
                "metadata.is_deleted": true,
                "metadata.deleted_at": DateTime::now(),
                "metadata.updated_at": DateTime::now(),
            }
        };

        self.update_by_id(id, update).await
    }

    /// The underlying collection, for operations the wrapper doesn't cover
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

/// Extend a filter so soft-deleted documents never match
fn with_live_filter(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

async fn collect_cursor<T>(cursor: mongodb::Cursor<T>) -> Result<Vec<T>, CalmaError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    use futures_util::StreamExt;

    let results: Vec<T> = cursor
        .filter_map(|doc| async {
            match doc {
                Ok(d) => Some(d),
                Err(e) => {
                    error!("Error reading document: {}", e);
                    None
                }
            }
        })
        .collect()
        .await;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_filter_excludes_deleted() {
        let filter = with_live_filter(doc! { "username": "ana" });
        assert_eq!(filter.get_str("username").unwrap(), "ana");
        assert_eq!(
            filter.get_document("metadata.is_deleted").unwrap(),
            &doc! { "$ne": true }
        );
    }

    #[test]
    fn test_live_filter_on_empty_filter() {
        let filter = with_live_filter(doc! {});
        assert_eq!(filter.len(), 1);
    }
}
