//! Document repository.
//!
//! Entities are stored as JSON documents grouped into collections. A
//! [`DocumentStore`] backend handles untyped documents; [`Repository`] is
//! the typed facade handlers use.
//!
//! Every write goes through a [`WriteBatch`] that the backend applies
//! atomically: either every operation takes effect or none does. Counter
//! adjustments ride in the same batch as the mutation that causes them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::batch::WriteBatch;
use super::query::{Filter, Query};
use crate::domain::{
    Checklist, ChecklistItem, Comment, Invitation, Notification, Project, SubTask, Tag, Task,
    User, Verification,
};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Entity was not found.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Optimistic locking conflict.
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// An insert collided with an existing document.
    #[error("Duplicate entity: {0}")]
    Conflict(String),

    /// A guard registered in the batch no longer holds.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Database connection error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Pagination
// =============================================================================

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (0-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl Pagination {
    /// Creates new pagination parameters.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is 0.
    #[must_use]
    pub const fn new(page: u32, page_size: u32) -> Self {
        assert!(page_size > 0, "page_size must be greater than 0");
        Self { page, page_size }
    }

    /// Creates pagination that fetches all records.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            page: 0,
            page_size: u32::MAX,
        }
    }

    /// Returns the offset for database queries.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64).saturating_mul(self.page_size as u64)
    }

    /// Returns the limit for database queries.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 10,
        }
    }
}

/// Paginated result containing items and total count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedResult<T> {
    /// The items in the current page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// Current page (0-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl<T> PaginatedResult<T> {
    /// Creates a new paginated result.
    #[must_use]
    pub const fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
        }
    }

    /// Returns the total number of pages.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }

    /// Converts every item, keeping the paging metadata.
    ///
    /// # Errors
    ///
    /// Returns the first conversion error.
    pub fn try_map<U, E>(self, convert: impl FnMut(T) -> Result<U, E>) -> Result<PaginatedResult<U>, E> {
        let items = self.items.into_iter().map(convert).collect::<Result<_, _>>()?;
        Ok(PaginatedResult::new(items, self.total, self.page, self.page_size))
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Named group of documents of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Projects,
    Tasks,
    SubTasks,
    Checklists,
    ChecklistItems,
    Tags,
    Comments,
    Invitations,
    Notifications,
    Verifications,
}

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Self; 11] = [
        Self::Users,
        Self::Projects,
        Self::Tasks,
        Self::SubTasks,
        Self::Checklists,
        Self::ChecklistItems,
        Self::Tags,
        Self::Comments,
        Self::Invitations,
        Self::Notifications,
        Self::Verifications,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
            Self::Tasks => "tasks",
            Self::SubTasks => "sub_tasks",
            Self::Checklists => "checklists",
            Self::ChecklistItems => "checklist_items",
            Self::Tags => "tags",
            Self::Comments => "comments",
            Self::Invitations => "invitations",
            Self::Notifications => "notifications",
            Self::Verifications => "verifications",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// An untyped stored document.
///
/// `data` always carries a `version` key equal to `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub collection: Collection,
    pub id: Uuid,
    pub version: u64,
    pub data: Value,
}

impl StoredDocument {
    /// Serializes `entity` and stamps it with `version`.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity does not serialize to a
    /// JSON object.
    pub fn from_entity<T: Document>(entity: &T, version: u64) -> Result<Self, RepositoryError> {
        let data = serde_json::to_value(entity)
            .map_err(|error| RepositoryError::SerializationError(error.to_string()))?;
        if !data.is_object() {
            return Err(RepositoryError::SerializationError(format!(
                "{} document is not a JSON object",
                T::COLLECTION
            )));
        }
        let mut document = Self {
            collection: T::COLLECTION,
            id: entity.key(),
            version,
            data,
        };
        document.stamp_version();
        Ok(document)
    }

    /// Deserializes the document into its entity type.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the stored data no longer matches `T`.
    pub fn into_entity<T: Document>(self) -> Result<T, RepositoryError> {
        serde_json::from_value(self.data)
            .map_err(|error| RepositoryError::SerializationError(error.to_string()))
    }

    /// Increments the version and mirrors it into `data`.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.stamp_version();
    }

    /// Writes `field` at the top level of `data`.
    pub fn set_field(&mut self, field: &str, value: Value) {
        if let Value::Object(map) = &mut self.data {
            map.insert(field.to_string(), value);
        }
    }

    fn stamp_version(&mut self) {
        self.set_field("version", Value::from(self.version));
    }
}

/// An entity that can be stored in a collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection holding documents of this type.
    const COLLECTION: Collection;

    /// Primary key.
    fn key(&self) -> Uuid;

    /// Version as last read from the store.
    fn version(&self) -> u64;
}

macro_rules! document {
    ($entity:ty, $collection:expr) => {
        impl Document for $entity {
            const COLLECTION: Collection = $collection;

            fn key(&self) -> Uuid {
                *self.id.as_uuid()
            }

            fn version(&self) -> u64 {
                self.version
            }
        }
    };
}

document!(User, Collection::Users);
document!(Project, Collection::Projects);
document!(Task, Collection::Tasks);
document!(SubTask, Collection::SubTasks);
document!(Checklist, Collection::Checklists);
document!(ChecklistItem, Collection::ChecklistItems);
document!(Tag, Collection::Tags);
document!(Comment, Collection::Comments);
document!(Invitation, Collection::Invitations);
document!(Notification, Collection::Notifications);
document!(Verification, Collection::Verifications);

// =============================================================================
// Document Store
// =============================================================================

/// Counts reported by a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Documents removed by `Delete` and `DeleteWhere`.
    pub deleted: u64,
    /// Documents changed in place by `Increment` and `Pull`.
    pub modified: u64,
}

/// Storage backend for untyped documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads one document.
    async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, RepositoryError>;

    /// Loads the requested page of documents matching the query.
    async fn find(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<PaginatedResult<StoredDocument>, RepositoryError>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: Collection, filter: &Filter)
    -> Result<u64, RepositoryError>;

    /// Applies every operation of `batch`, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, RepositoryError>;
}

// =============================================================================
// Typed Repository
// =============================================================================

/// Typed access to a [`DocumentStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Repository")
            .field("store", &"Arc<dyn DocumentStore>")
            .finish()
    }
}

impl Repository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Loads an entity by id.
    ///
    /// # Errors
    ///
    /// Propagates backend and deserialization errors.
    pub async fn get<T: Document>(&self, id: impl Into<Uuid> + Send) -> Result<Option<T>, RepositoryError> {
        self.store
            .get(T::COLLECTION, id.into())
            .await?
            .map(StoredDocument::into_entity)
            .transpose()
    }

    /// Loads one page of entities.
    ///
    /// # Errors
    ///
    /// Propagates backend and deserialization errors.
    pub async fn find<T: Document>(&self, query: &Query) -> Result<PaginatedResult<T>, RepositoryError> {
        self.store
            .find(T::COLLECTION, query)
            .await?
            .try_map(StoredDocument::into_entity)
    }

    /// Loads every entity matching `filter`, in id order.
    ///
    /// # Errors
    ///
    /// Propagates backend and deserialization errors.
    pub async fn find_all<T: Document>(&self, filter: Filter) -> Result<Vec<T>, RepositoryError> {
        Ok(self.find(&Query::new(filter)).await?.items)
    }

    /// Loads the first entity matching `filter`.
    ///
    /// # Errors
    ///
    /// Propagates backend and deserialization errors.
    pub async fn find_one<T: Document>(&self, filter: Filter) -> Result<Option<T>, RepositoryError> {
        let query = Query::new(filter).paginate(Pagination::new(0, 1));
        Ok(self.find(&query).await?.items.into_iter().next())
    }

    /// Counts entities matching `filter`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn count<T: Document>(&self, filter: &Filter) -> Result<u64, RepositoryError> {
        self.store.count(T::COLLECTION, filter).await
    }

    /// Commits a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing operation; nothing is applied.
    pub async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, RepositoryError> {
        if batch.is_empty() {
            return Ok(CommitOutcome::default());
        }
        self.store.commit(batch).await
    }
}

// =============================================================================
// Tests
// =============================================================================
