//! In-memory document store.
//!
//! Suitable for tests and single-process deployments. Collections live in
//! ordered maps behind a `tokio` `RwLock`; a commit holds the write lock for
//! the whole batch and stages changes in an overlay that is merged only
//! after every operation succeeded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::batch::{WriteBatch, WriteOperation};
use super::query::{Filter, Query};
use super::repository::{
    Collection, CommitOutcome, DocumentStore, PaginatedResult, RepositoryError, StoredDocument,
};

type Collections = HashMap<Collection, BTreeMap<Uuid, StoredDocument>>;
type Overlay = HashMap<(Collection, Uuid), Option<StoredDocument>>;

// =============================================================================
// Staging
// =============================================================================

/// Pending changes of one commit layered over the committed state.
///
/// `None` in the overlay marks a deletion.
struct Staging<'a> {
    base: &'a Collections,
    overlay: Overlay,
}

impl<'a> Staging<'a> {
    fn new(base: &'a Collections) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
        }
    }

    fn get(&self, collection: Collection, id: Uuid) -> Option<StoredDocument> {
        match self.overlay.get(&(collection, id)) {
            Some(staged) => staged.clone(),
            None => self
                .base
                .get(&collection)
                .and_then(|documents| documents.get(&id))
                .cloned(),
        }
    }

    fn put(&mut self, document: StoredDocument) {
        self.overlay
            .insert((document.collection, document.id), Some(document));
    }

    fn remove(&mut self, collection: Collection, id: Uuid) -> bool {
        let existed = self.get(collection, id).is_some();
        if existed {
            self.overlay.insert((collection, id), None);
        }
        existed
    }

    fn matching(&self, collection: Collection, filter: &Filter) -> Vec<StoredDocument> {
        let mut ids: Vec<Uuid> = self
            .base
            .get(&collection)
            .map(|documents| documents.keys().copied().collect())
            .unwrap_or_default();
        ids.extend(
            self.overlay
                .keys()
                .filter(|(staged, _)| *staged == collection)
                .map(|(_, id)| *id),
        );
        ids.sort_unstable();
        ids.dedup();

        ids.into_iter()
            .filter_map(|id| self.get(collection, id))
            .filter(|document| filter.matches(&document.data))
            .collect()
    }

    fn execute(
        &mut self,
        operation: WriteOperation,
        outcome: &mut CommitOutcome,
    ) -> Result<(), RepositoryError> {
        match operation {
            WriteOperation::Insert(document) => {
                if self.get(document.collection, document.id).is_some() {
                    return Err(RepositoryError::Conflict(format!(
                        "{} {}",
                        document.collection, document.id
                    )));
                }
                if document.version != 1 {
                    return Err(RepositoryError::VersionConflict {
                        expected: 1,
                        found: document.version,
                    });
                }
                self.put(document);
            }
            WriteOperation::Replace(document) => {
                let current = self
                    .get(document.collection, document.id)
                    .ok_or_else(|| {
                        RepositoryError::NotFound(format!("{} {}", document.collection, document.id))
                    })?;
                if document.version != current.version + 1 {
                    return Err(RepositoryError::VersionConflict {
                        expected: current.version + 1,
                        found: document.version,
                    });
                }
                self.put(document);
            }
            WriteOperation::Delete { collection, id } => {
                if !self.remove(collection, id) {
                    return Err(RepositoryError::NotFound(format!("{collection} {id}")));
                }
                outcome.deleted += 1;
            }
            WriteOperation::DeleteWhere { collection, filter } => {
                for document in self.matching(collection, &filter) {
                    self.remove(collection, document.id);
                    outcome.deleted += 1;
                }
            }
            WriteOperation::Increment {
                collection,
                id,
                field,
                delta,
            } => {
                let mut document = self
                    .get(collection, id)
                    .ok_or_else(|| RepositoryError::NotFound(format!("{collection} {id}")))?;
                let current = document.data.get(field).and_then(serde_json::Value::as_i64);
                let updated = current.unwrap_or(0).saturating_add(delta).max(0);
                document.set_field(field, updated.into());
                document.bump_version();
                self.put(document);
                outcome.modified += 1;
            }
            WriteOperation::Require {
                collection,
                id,
                filter,
            } => {
                let satisfied = self
                    .get(collection, id)
                    .is_some_and(|document| filter.matches(&document.data));
                if !satisfied {
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
                if !self.matching(collection, &filter).is_empty() {
                    return Err(RepositoryError::Conflict(message));
                }
            }
            WriteOperation::Pull {
                collection,
                filter,
                field,
                value,
            } => {
                for mut document in self.matching(collection, &filter) {
                    let Some(items) = document.data.get(field).and_then(|items| items.as_array())
                    else {
                        continue;
                    };
                    if !items.contains(&value) {
                        continue;
                    }
                    let remaining: Vec<_> =
                        items.iter().filter(|item| **item != value).cloned().collect();
                    document.set_field(field, remaining.into());
                    document.bump_version();
                    self.put(document);
                    outcome.modified += 1;
                }
            }
        }
        Ok(())
    }
}

fn apply(overlay: Overlay, target: &mut Collections) {
    for ((collection, id), staged) in overlay {
        let documents = target.entry(collection).or_default();
        match staged {
            Some(document) => {
                documents.insert(id, document);
            }
            None => {
                documents.remove(&id);
            }
        }
    }
}

// =============================================================================
// In-Memory Document Store
// =============================================================================

/// [`DocumentStore`] holding every collection in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, RepositoryError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(&collection)
            .and_then(|documents| documents.get(&id))
            .cloned())
    }

    async fn find(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<PaginatedResult<StoredDocument>, RepositoryError> {
        let guard = self.collections.read().await;
        let mut matched: Vec<&StoredDocument> = guard
            .get(&collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|document| query.filter.matches(&document.data))
                    .collect()
            })
            .unwrap_or_default();

        // Documents come out of the map in id order; a stable sort keeps it as
        // the final tiebreak.
        if !query.sort.is_empty() {
            matched.sort_by(|left, right| {
                query
                    .sort
                    .iter()
                    .map(|sort| sort.compare(&left.data, &right.data))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let total = matched.len() as u64;
        let offset = usize::try_from(query.pagination.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.pagination.limit()).unwrap_or(usize::MAX);
        let items = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(PaginatedResult::new(
            items,
            total,
            query.pagination.page,
            query.pagination.page_size,
        ))
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, RepositoryError> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).map_or(0, |documents| {
            documents
                .values()
                .filter(|document| filter.matches(&document.data))
                .count() as u64
        }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, RepositoryError> {
        let mut guard = self.collections.write().await;
        let mut outcome = CommitOutcome::default();

        let overlay = {
            let mut staging = Staging::new(&guard);
            for operation in batch.into_operations() {
                staging.execute(operation, &mut outcome)?;
            }
            staging.overlay
        };
        apply(overlay, &mut guard);
        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Comment, CommentId, Project, ProjectId, TargetType, Task, TaskId, User, UserId,
    };
    use crate::infrastructure::Repository;
    use crate::infrastructure::query::Sort;
    use crate::infrastructure::repository::Pagination;
    use chrono::Utc;
    use rstest::rstest;

    fn repository() -> Repository {
        Repository::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn project(title: &str) -> Project {
        Project::new(ProjectId::generate(), UserId::generate(), title, "", Utc::now())
    }

    async fn insert<T: crate::infrastructure::Document>(repository: &Repository, entity: &T) {
        let mut batch = WriteBatch::new();
        batch.insert(entity).unwrap();
        repository.commit(batch).await.unwrap();
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_then_get() {
        let repository = repository();
        let project = project("Alpha");
        insert(&repository, &project).await;

        let found: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(found, project);
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let repository = repository();
        let project = project("Alpha");
        insert(&repository, &project).await;

        let mut batch = WriteBatch::new();
        batch.insert(&project).unwrap();
        let result = repository.commit(batch).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_stale_replace_is_rejected() {
        let repository = repository();
        let project = project("Alpha");
        insert(&repository, &project).await;

        let mut first = project.clone();
        first.title = "Beta".to_string();
        let mut batch = WriteBatch::new();
        batch.replace(&first).unwrap();
        repository.commit(batch).await.unwrap();

        let mut stale = project.clone();
        stale.title = "Gamma".to_string();
        let mut batch = WriteBatch::new();
        batch.replace(&stale).unwrap();
        let result = repository.commit(batch).await;
        assert_eq!(
            result,
            Err(RepositoryError::VersionConflict {
                expected: 3,
                found: 2
            })
        );

        let stored: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Beta");
        assert_eq!(stored.version, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let repository = repository();
        let project = project("Alpha");
        insert(&repository, &project).await;

        let mut batch = WriteBatch::new();
        batch.increment::<Project>(project.id, Project::TASK_COUNT, 1);
        batch.require::<Project>(project.id, Filter::eq("is_deleted", true));
        assert!(matches!(
            repository.commit(batch).await,
            Err(RepositoryError::PreconditionFailed(_))
        ));

        let stored: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(stored.task_count, 0);
        assert_eq!(stored.version, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_increment_floors_at_zero() {
        let repository = repository();
        let project = project("Alpha");
        insert(&repository, &project).await;

        let mut batch = WriteBatch::new();
        batch.increment::<Project>(project.id, Project::TASK_COUNT, 2);
        batch.increment::<Project>(project.id, Project::TASK_COUNT, -5);
        repository.commit(batch).await.unwrap();

        let stored: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(stored.task_count, 0);
        assert_eq!(stored.version, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_increment_of_missing_document_fails() {
        let repository = repository();
        let mut batch = WriteBatch::new();
        batch.increment::<Task>(TaskId::generate(), Task::COMMENT_COUNT, 1);
        assert!(matches!(
            repository.commit(batch).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_later_operations_see_earlier_ones() {
        let repository = repository();
        let project = project("Alpha");

        let mut batch = WriteBatch::new();
        batch.insert(&project).unwrap();
        batch.increment::<Project>(project.id, Project::COMMENT_COUNT, 1);
        batch.require::<Project>(project.id, Filter::eq(Project::COMMENT_COUNT, 1));
        repository.commit(batch).await.unwrap();

        let stored: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_repeated_delete_leaves_counter_intact() {
        let repository = repository();
        let now = Utc::now();
        let author = UserId::generate();
        let mut task = Task::new(TaskId::generate(), author, "Gears", now);
        task.comment_count = 2;
        let comments: Vec<Comment> = (0..2)
            .map(|index| {
                Comment::new(
                    CommentId::generate(),
                    author,
                    format!("Note {index}"),
                    TargetType::Task,
                    *task.id.as_uuid(),
                    now,
                )
            })
            .collect();
        insert(&repository, &task).await;
        for comment in &comments {
            insert(&repository, comment).await;
        }

        let mut batch = WriteBatch::new();
        batch.delete::<Comment>(comments[0].id);
        batch.increment::<Task>(task.id, Task::COMMENT_COUNT, -1);

        let first = repository.commit(batch.clone()).await.unwrap();
        assert_eq!(first, CommitOutcome { deleted: 1, modified: 1 });
        assert!(matches!(
            repository.commit(batch).await,
            Err(RepositoryError::NotFound(_))
        ));

        let stored: Task = repository.get(task.id).await.unwrap().unwrap();
        let live = repository.count::<Comment>(&Filter::All).await.unwrap();
        assert_eq!(stored.comment_count, 1);
        assert_eq!(live, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_require_absent_rejects_second_writer() {
        let repository = repository();
        let taken = Filter::eq_ignore_case("email", "ada@x.io");

        let mut batch = WriteBatch::new();
        batch.require_absent::<User>(taken.clone(), "User already exists");
        batch.insert(&User::new(UserId::generate(), "Ada", "L", "ada@x.io", Utc::now())).unwrap();
        repository.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.require_absent::<User>(taken, "User already exists");
        batch.insert(&User::new(UserId::generate(), "Ada", "K", "ADA@x.io", Utc::now())).unwrap();
        assert_eq!(
            repository.commit(batch).await,
            Err(RepositoryError::Conflict("User already exists".to_string()))
        );
        assert_eq!(repository.count::<User>(&Filter::All).await.unwrap(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_require_absent_sees_staged_writes() {
        let repository = repository();
        let project = project("Alpha");

        let mut batch = WriteBatch::new();
        batch.insert(&project).unwrap();
        batch.require_absent::<Project>(Filter::eq("title", "Alpha"), "Title taken");
        assert!(matches!(
            repository.commit(batch).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(repository.get::<Project>(project.id).await.unwrap().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_where_and_pull_report_counts() {
        let repository = repository();
        let removed = project("Removed");
        let kept = project("Kept");
        insert(&repository, &removed).await;
        insert(&repository, &kept).await;

        let mut user = User::new(UserId::generate(), "A", "B", "a@b.c", Utc::now());
        user.add_favorite(removed.id);
        user.add_favorite(kept.id);
        insert(&repository, &user).await;

        let mut batch = WriteBatch::new();
        batch.delete_where::<Project>(Filter::eq("title", "Removed"));
        batch.pull::<User>(
            Filter::contains("favorite_projects", removed.id),
            "favorite_projects",
            removed.id,
        );
        let outcome = repository.commit(batch).await.unwrap();
        assert_eq!(outcome, CommitOutcome { deleted: 1, modified: 1 });

        let stored: User = repository.get(user.id).await.unwrap().unwrap();
        assert_eq!(stored.favorite_projects, vec![kept.id]);
        assert!(repository.get::<Project>(removed.id).await.unwrap().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_find_sorts_and_pages() {
        let repository = repository();
        for title in ["charlie", "Alpha", "bravo"] {
            insert(&repository, &project(title)).await;
        }

        let query = Query::new(Filter::All)
            .sorted_by(Sort::text("title"))
            .paginate(Pagination::new(0, 2));
        let page = repository.find::<Project>(&query).await.unwrap();

        let titles: Vec<_> = page.items.iter().map(|project| project.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "bravo"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages(), 2);

        let second = repository
            .find::<Project>(&query.clone().paginate(Pagination::new(1, 2)))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].title, "charlie");
    }

    #[rstest]
    #[tokio::test]
    async fn test_count_and_find_one() {
        let repository = repository();
        insert(&repository, &project("Alpha")).await;
        insert(&repository, &project("Beta")).await;

        assert_eq!(
            repository
                .count::<Project>(&Filter::search(&["title"], "a"))
                .await
                .unwrap(),
            2
        );
        let found: Option<Project> = repository
            .find_one(Filter::eq("title", "Beta"))
            .await
            .unwrap();
        assert_eq!(found.map(|project| project.title), Some("Beta".to_string()));
    }
}
