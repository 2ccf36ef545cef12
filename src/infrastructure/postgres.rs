//! `PostgreSQL` document store.
//!
//! Every collection shares one JSONB table. Filters are translated to JSONB
//! predicates with bound parameters; a batch runs inside a single
//! transaction, so a failing operation rolls back the whole batch.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     id UUID NOT NULL,
//!     version BIGINT NOT NULL,
//!     data JSONB NOT NULL,
//!     PRIMARY KEY (collection, id)
//! );
//! CREATE INDEX documents_data_idx ON documents USING GIN (data jsonb_path_ops);
//! ```
//!
//! `data` always carries a `version` key mirroring the column.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::batch::{WriteBatch, WriteOperation};
use super::query::{Filter, Query, SortDirection, SortKind};
use super::repository::{
    Collection, CommitOutcome, DocumentStore, PaginatedResult, RepositoryError, StoredDocument,
};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id UUID NOT NULL,
    version BIGINT NOT NULL,
    data JSONB NOT NULL,
    PRIMARY KEY (collection, id)
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS documents_data_idx ON documents USING GIN (data jsonb_path_ops)";

#[allow(clippy::needless_pass_by_value)]
fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(error.to_string())
}

fn to_database_integer(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_database_integer(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Escapes `LIKE` wildcards so the term matches literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for character in term.chars() {
        if matches!(character, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(character);
    }
    pattern.push('%');
    pattern
}

// =============================================================================
// Filter Translation
// =============================================================================

/// Appends the SQL predicate for `filter`. The predicate never yields NULL.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::Eq(field, value) => {
            push_field_or_null(builder, field);
            builder.push(" = ");
            builder.push_bind(value.clone());
        }
        Filter::Ne(field, value) => {
            push_field_or_null(builder, field);
            builder.push(" <> ");
            builder.push_bind(value.clone());
        }
        Filter::EqIgnoreCase(field, value) => {
            builder.push("COALESCE(lower(data ->> ");
            builder.push_bind(field.clone());
            builder.push(") = lower(");
            builder.push_bind(value.clone());
            builder.push("), FALSE)");
        }
        Filter::In(field, values) => {
            if values.is_empty() {
                builder.push("FALSE");
                return;
            }
            push_field_or_null(builder, field);
            builder.push(" IN (");
            let mut separated = builder.separated(", ");
            for value in values {
                separated.push_bind(value.clone());
            }
            separated.push_unseparated(")");
        }
        Filter::Contains(field, value) => {
            builder.push("(jsonb_typeof(data -> ");
            builder.push_bind(field.clone());
            builder.push(") = 'array' AND data -> ");
            builder.push_bind(field.clone());
            builder.push(" @> jsonb_build_array(");
            builder.push_bind(value.clone());
            builder.push("))");
        }
        Filter::Search(fields, term) => {
            if fields.is_empty() {
                builder.push("FALSE");
                return;
            }
            let pattern = like_pattern(term);
            builder.push("(");
            for (index, field) in fields.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                builder.push("COALESCE(data ->> ");
                builder.push_bind(field.clone());
                builder.push(", '') ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" ESCAPE '\\'");
            }
            builder.push(")");
        }
        Filter::After(field, instant) => {
            builder.push("COALESCE((data ->> ");
            builder.push_bind(field.clone());
            builder.push(")::timestamptz >= ");
            builder.push_bind(*instant);
            builder.push(", FALSE)");
        }
        Filter::Before(field, instant) => {
            builder.push("COALESCE((data ->> ");
            builder.push_bind(field.clone());
            builder.push(")::timestamptz <= ");
            builder.push_bind(*instant);
            builder.push(", FALSE)");
        }
        Filter::And(filters) => push_junction(builder, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_junction(builder, filters, " OR ", "FALSE"),
        Filter::Not(inner) => {
            builder.push("NOT (");
            push_filter(builder, inner);
            builder.push(")");
        }
    }
}

fn push_field_or_null(builder: &mut QueryBuilder<'_, Postgres>, field: &str) {
    builder.push("COALESCE(data -> ");
    builder.push_bind(field.to_string());
    builder.push(", 'null'::jsonb)");
}

fn push_junction(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter],
    junction: &str,
    empty: &str,
) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            builder.push(junction);
        }
        push_filter(builder, filter);
    }
    builder.push(")");
}

fn push_order(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    builder.push(" ORDER BY ");
    for sort in &query.sort {
        match sort.kind {
            SortKind::Text => {
                builder.push("lower(data ->> ");
                builder.push_bind(sort.field.clone());
                builder.push(")");
            }
            SortKind::Timestamp => {
                builder.push("(data ->> ");
                builder.push_bind(sort.field.clone());
                builder.push(")::timestamptz");
            }
        }
        builder.push(match sort.direction {
            SortDirection::Ascending => " ASC NULLS LAST, ",
            SortDirection::Descending => " DESC NULLS FIRST, ",
        });
    }
    builder.push("id ASC");
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, collection: Collection, filter: &Filter) {
    builder.push(" WHERE collection = ");
    builder.push_bind(collection.as_str());
    builder.push(" AND ");
    push_filter(builder, filter);
}

// =============================================================================
// PostgreSQL Document Store
// =============================================================================

/// [`DocumentStore`] backed by a `PostgreSQL` JSONB table.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new store using the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the documents table and its index if they are missing.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a statement fails.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        sqlx::query(CREATE_INDEX)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }
}

fn stored_document(
    collection: Collection,
    (id, version, data): (Uuid, i64, Value),
) -> StoredDocument {
    StoredDocument {
        collection,
        id,
        version: from_database_integer(version),
        data,
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, RepositoryError> {
        let row: Option<(Uuid, i64, Value)> = sqlx::query_as(
            "SELECT id, version, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(row.map(|row| stored_document(collection, row)))
    }

    async fn find(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<PaginatedResult<StoredDocument>, RepositoryError> {
        let total = self.count(collection, &query.filter).await?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT id, version, data FROM documents");
        push_scope(&mut builder, collection, &query.filter);
        push_order(&mut builder, query);
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(query.pagination.limit()));
        builder.push(" OFFSET ");
        builder.push_bind(to_database_integer(query.pagination.offset()));

        let rows: Vec<(Uuid, i64, Value)> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(PaginatedResult::new(
            rows.into_iter()
                .map(|row| stored_document(collection, row))
                .collect(),
            total,
            query.pagination.page,
            query.pagination.page_size,
        ))
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_scope(&mut builder, collection, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(from_database_integer(count))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, RepositoryError> {
        let mut transaction = self.pool.begin().await.map_err(database_error)?;
        let mut outcome = CommitOutcome::default();

        for operation in batch.into_operations() {
            execute(&mut transaction, operation, &mut outcome).await?;
        }

        transaction.commit().await.map_err(database_error)?;
        Ok(outcome)
    }
}

#[allow(clippy::too_many_lines)]
async fn execute(
    transaction: &mut Transaction<'_, Postgres>,
    operation: WriteOperation,
    outcome: &mut CommitOutcome,
) -> Result<(), RepositoryError> {
    match operation {
        WriteOperation::Insert(document) => {
            if document.version != 1 {
                return Err(RepositoryError::VersionConflict {
                    expected: 1,
                    found: document.version,
                });
            }
            let result = sqlx::query(
                "INSERT INTO documents (collection, id, version, data) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (collection, id) DO NOTHING",
            )
            .bind(document.collection.as_str())
            .bind(document.id)
            .bind(to_database_integer(document.version))
            .bind(&document.data)
            .execute(&mut **transaction)
            .await
            .map_err(database_error)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "{} {}",
                    document.collection, document.id
                )));
            }
        }
        WriteOperation::Replace(document) => {
            let current: Option<(i64,)> = sqlx::query_as(
                "SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
            )
            .bind(document.collection.as_str())
            .bind(document.id)
            .fetch_optional(&mut **transaction)
            .await
            .map_err(database_error)?;

            let Some((current,)) = current else {
                return Err(RepositoryError::NotFound(format!(
                    "{} {}",
                    document.collection, document.id
                )));
            };
            let expected = from_database_integer(current) + 1;
            if document.version != expected {
                return Err(RepositoryError::VersionConflict {
                    expected,
                    found: document.version,
                });
            }

            sqlx::query(
                "UPDATE documents SET version = $3, data = $4 WHERE collection = $1 AND id = $2",
            )
            .bind(document.collection.as_str())
            .bind(document.id)
            .bind(to_database_integer(document.version))
            .bind(&document.data)
            .execute(&mut **transaction)
            .await
            .map_err(database_error)?;
        }
        WriteOperation::Delete { collection, id } => {
            let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.as_str())
                .bind(id)
                .execute(&mut **transaction)
                .await
                .map_err(database_error)?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!("{collection} {id}")));
            }
            outcome.deleted += result.rows_affected();
        }
        WriteOperation::DeleteWhere { collection, filter } => {
            let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM documents");
            push_scope(&mut builder, collection, &filter);
            let result = builder
                .build()
                .execute(&mut **transaction)
                .await
                .map_err(database_error)?;
            outcome.deleted += result.rows_affected();
        }
        WriteOperation::Increment {
            collection,
            id,
            field,
            delta,
        } => {
            let result = sqlx::query(
                "UPDATE documents SET
                    version = version + 1,
                    data = jsonb_set(
                        jsonb_set(
                            data,
                            ARRAY[$3::text],
                            to_jsonb(GREATEST(COALESCE((data ->> $3)::bigint, 0) + $4, 0))
                        ),
                        '{version}',
                        to_jsonb(version + 1)
                    )
                 WHERE collection = $1 AND id = $2",
            )
            .bind(collection.as_str())
            .bind(id)
            .bind(field)
            .bind(delta)
            .execute(&mut **transaction)
            .await
            .map_err(database_error)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!("{collection} {id}")));
            }
            outcome.modified += 1;
        }
        WriteOperation::Require {
            collection,
            id,
            filter,
        } => {
            let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM documents");
            push_scope(&mut builder, collection, &filter);
            builder.push(" AND id = ");
            builder.push_bind(id);
            builder.push(" FOR SHARE");

            let found: Option<i32> = builder
                .build_query_scalar()
                .fetch_optional(&mut **transaction)
                .await
                .map_err(database_error)?;
            if found.is_none() {
                return Err(RepositoryError::PreconditionFailed(format!(
                    "{collection} {id}"
                )));
            }
        }
        WriteOperation::RequireAbsent {
            collection,
            filter,
            message,
        } => {
            // Held until the transaction ends; the check below then sees every
            // batch that passed the same guard before us.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(format!("require_absent:{collection}"))
                .execute(&mut **transaction)
                .await
                .map_err(database_error)?;

            let mut builder = QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM documents");
            push_scope(&mut builder, collection, &filter);
            builder.push(")");
            let exists: bool = builder
                .build_query_scalar()
                .fetch_one(&mut **transaction)
                .await
                .map_err(database_error)?;
            if exists {
                return Err(RepositoryError::Conflict(message));
            }
        }
        WriteOperation::Pull {
            collection,
            filter,
            field,
            value,
        } => {
            let mut builder = QueryBuilder::<Postgres>::new(
                "UPDATE documents SET version = version + 1, data = jsonb_set(jsonb_set(data, ARRAY[",
            );
            builder.push_bind(field);
            builder.push(
                "::text], COALESCE((SELECT jsonb_agg(elements.item) FROM jsonb_array_elements(data -> ",
            );
            builder.push_bind(field);
            builder.push(") AS elements(item) WHERE elements.item <> ");
            builder.push_bind(value.clone());
            builder.push("), '[]'::jsonb)), '{version}', to_jsonb(version + 1))");
            let guarded = Filter::Contains(field.to_string(), value).and(filter);
            push_scope(&mut builder, collection, &guarded);

            let result = builder
                .build()
                .execute(&mut **transaction)
                .await
                .map_err(database_error)?;
            outcome.modified += result.rows_affected();
        }
    }
    Ok(())
}
