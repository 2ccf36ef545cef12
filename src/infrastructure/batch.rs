//! Atomic write batches.
//!
//! A batch is an ordered list of [`WriteOperation`]s. Backends apply them in
//! order against a consistent view: later operations see the effects of
//! earlier ones, and a failing operation discards the whole batch.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::query::Filter;
use super::repository::{Collection, Document, RepositoryError, StoredDocument};

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Stores a new document. Fails with `Conflict` if the id exists.
    Insert(StoredDocument),
    /// Overwrites a document whose stored version is `document.version - 1`.
    Replace(StoredDocument),
    /// Removes one document. Fails with `NotFound` if it is already gone.
    Delete { collection: Collection, id: Uuid },
    /// Removes every document matching the filter.
    DeleteWhere {
        collection: Collection,
        filter: Filter,
    },
    /// Adds `delta` to an integer field, never going below zero.
    Increment {
        collection: Collection,
        id: Uuid,
        field: &'static str,
        delta: i64,
    },
    /// Fails the batch unless the document exists and matches the filter.
    Require {
        collection: Collection,
        id: Uuid,
        filter: Filter,
    },
    /// Fails the batch with `Conflict(message)` if any document matches.
    ///
    /// Checks run one at a time per collection, so two batches guarding the
    /// same filter cannot both pass.
    RequireAbsent {
        collection: Collection,
        filter: Filter,
        message: String,
    },
    /// Removes `value` from the array `field` of every matching document.
    Pull {
        collection: Collection,
        filter: Filter,
        field: &'static str,
        value: Value,
    },
}

/// Ordered set of writes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    operations: Vec<WriteOperation>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new entity at its current version.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity cannot be encoded.
    pub fn insert<T: Document>(&mut self, entity: &T) -> Result<(), RepositoryError> {
        let document = StoredDocument::from_entity(entity, entity.version())?;
        self.operations.push(WriteOperation::Insert(document));
        Ok(())
    }

    /// Overwrites an entity previously read at `entity.version()`.
    ///
    /// The commit fails with `VersionConflict` if someone else wrote the
    /// document in between.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity cannot be encoded.
    pub fn replace<T: Document>(&mut self, entity: &T) -> Result<(), RepositoryError> {
        let document = StoredDocument::from_entity(entity, entity.version() + 1)?;
        self.operations.push(WriteOperation::Replace(document));
        Ok(())
    }

    pub fn delete<T: Document>(&mut self, id: impl Into<Uuid>) {
        self.operations.push(WriteOperation::Delete {
            collection: T::COLLECTION,
            id: id.into(),
        });
    }

    pub fn delete_where<T: Document>(&mut self, filter: Filter) {
        self.operations.push(WriteOperation::DeleteWhere {
            collection: T::COLLECTION,
            filter,
        });
    }

    pub fn increment<T: Document>(&mut self, id: impl Into<Uuid>, field: &'static str, delta: i64) {
        if delta == 0 {
            return;
        }
        self.operations.push(WriteOperation::Increment {
            collection: T::COLLECTION,
            id: id.into(),
            field,
            delta,
        });
    }

    pub fn require<T: Document>(&mut self, id: impl Into<Uuid>, filter: Filter) {
        self.operations.push(WriteOperation::Require {
            collection: T::COLLECTION,
            id: id.into(),
            filter,
        });
    }

    /// Guards a uniqueness rule: the batch commits only while nothing in
    /// `T`'s collection matches `filter`. Queue it before the write it
    /// protects.
    pub fn require_absent<T: Document>(&mut self, filter: Filter, message: impl Into<String>) {
        self.operations.push(WriteOperation::RequireAbsent {
            collection: T::COLLECTION,
            filter,
            message: message.into(),
        });
    }

    pub fn pull<T: Document>(&mut self, filter: Filter, field: &'static str, value: impl Serialize) {
        self.operations.push(WriteOperation::Pull {
            collection: T::COLLECTION,
            filter,
            field,
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn operations(&self) -> &[WriteOperation] {
        &self.operations
    }

    #[must_use]
    pub fn into_operations(self) -> Vec<WriteOperation> {
        self.operations
    }
}
