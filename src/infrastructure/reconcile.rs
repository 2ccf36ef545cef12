//! Counter reconciliation.
//!
//! Counters are kept current by increments committed with each mutation.
//! This pass recounts them from the collections and repairs any drift, for
//! example after a manual data fix. A document written concurrently is left
//! alone until the next round.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::batch::WriteBatch;
use super::query::Filter;
use super::repository::{Document, Repository, RepositoryError};
use crate::domain::{
    Checklist, ChecklistId, ChecklistItem, Comment, Project, ProjectId, SubTask, TargetType, Task,
    TaskId, User, UserId,
};

/// What one reconciliation round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Documents whose counters were checked.
    pub examined: u64,
    /// Documents rewritten with corrected counters.
    pub corrected: u64,
    /// Documents skipped because they changed during the round.
    pub skipped: u64,
}

fn tally<K: Eq + Hash>(keys: impl IntoIterator<Item = K>) -> HashMap<K, u64> {
    let mut counts = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn count<K: Eq + Hash>(counts: &HashMap<K, u64>, key: K) -> u64 {
    counts.get(&key).copied().unwrap_or(0)
}

fn live() -> Filter {
    Filter::eq("is_deleted", false)
}

/// Recounts every denormalized counter and rewrites the documents that drifted.
///
/// # Errors
///
/// Returns the first storage error other than a version conflict.
pub async fn reconcile_counters(repository: &Repository) -> Result<ReconcileReport, RepositoryError> {
    let mut report = ReconcileReport::default();

    // Every parent is read before the children tallied into it. A child
    // written after its parent was read bumps the parent's version, so the
    // repair below loses the version check instead of undoing the write.
    let users: Vec<User> = repository.find_all(Filter::All).await?;
    let projects: Vec<Project> = repository.find_all(live()).await?;
    let tasks: Vec<Task> = repository.find_all(live()).await?;
    let (comments, sub_tasks, checklists) = futures::try_join!(
        repository.find_all::<Comment>(Filter::All),
        repository.find_all::<SubTask>(Filter::All),
        repository.find_all::<Checklist>(Filter::All),
    )?;
    let items: Vec<ChecklistItem> = repository.find_all(Filter::All).await?;

    let owned: HashMap<UserId, u64> = tally(projects.iter().map(|project| project.owner));
    let joined: HashMap<UserId, u64> =
        tally(projects.iter().flat_map(|project| project.members.iter().copied()));
    let assigned: HashMap<UserId, u64> = tally(tasks.iter().filter_map(|task| task.assignee));
    let project_tasks: HashMap<ProjectId, u64> = tally(tasks.iter().filter_map(|task| task.project));
    let project_comments = tally(
        comments
            .iter()
            .filter(|comment| comment.target_type == TargetType::Project)
            .map(|comment| comment.target_id),
    );
    let task_comments = tally(
        comments
            .iter()
            .filter(|comment| comment.target_type == TargetType::Task)
            .map(|comment| comment.target_id),
    );
    let task_sub_tasks: HashMap<TaskId, u64> = tally(sub_tasks.iter().map(|sub_task| sub_task.task));
    let task_checklists: HashMap<TaskId, u64> =
        tally(checklists.iter().map(|checklist| checklist.task));
    let checklist_items: HashMap<ChecklistId, u64> = tally(items.iter().map(|item| item.checklist));

    for mut user in users {
        let expected = (
            count(&owned, user.id),
            count(&joined, user.id),
            count(&assigned, user.id),
        );
        let current = (user.project_own_count, user.project_in_count, user.task_count);
        report.examined += 1;
        if expected != current {
            (user.project_own_count, user.project_in_count, user.task_count) = expected;
            write(repository, &user, &mut report).await?;
        }
    }

    for mut project in projects {
        let expected = (
            count(&project_tasks, project.id),
            count(&project_comments, *project.id.as_uuid()),
        );
        report.examined += 1;
        if expected != (project.task_count, project.comment_count) {
            (project.task_count, project.comment_count) = expected;
            write(repository, &project, &mut report).await?;
        }
    }

    for mut task in tasks {
        let expected = (
            count(&task_sub_tasks, task.id),
            count(&task_checklists, task.id),
            count(&task_comments, *task.id.as_uuid()),
        );
        let current = (task.sub_task_count, task.checklist_count, task.comment_count);
        report.examined += 1;
        if expected != current {
            (task.sub_task_count, task.checklist_count, task.comment_count) = expected;
            write(repository, &task, &mut report).await?;
        }
    }

    for mut checklist in checklists {
        let expected = count(&checklist_items, checklist.id);
        report.examined += 1;
        if expected != checklist.item_count {
            checklist.item_count = expected;
            write(repository, &checklist, &mut report).await?;
        }
    }

    Ok(report)
}

async fn write<T: Document>(
    repository: &Repository,
    entity: &T,
    report: &mut ReconcileReport,
) -> Result<(), RepositoryError> {
    let mut batch = WriteBatch::new();
    batch.replace(entity)?;
    match repository.commit(batch).await {
        Ok(_) => {
            report.corrected += 1;
            Ok(())
        }
        Err(RepositoryError::VersionConflict { .. } | RepositoryError::NotFound(_)) => {
            tracing::debug!(collection = %T::COLLECTION, id = %entity.key(), "Counter repair skipped");
            report.skipped += 1;
            Ok(())
        }
        Err(error) => Err(error),
    }
}

/// Runs [`reconcile_counters`] every `interval` until the runtime shuts down.
pub fn spawn_reconciler(repository: Repository, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match reconcile_counters(&repository).await {
                Ok(report) if report.corrected > 0 || report.skipped > 0 => tracing::info!(
                    examined = report.examined,
                    corrected = report.corrected,
                    skipped = report.skipped,
                    "Counters reconciled"
                ),
                Ok(report) => tracing::debug!(examined = report.examined, "Counters consistent"),
                Err(error) => tracing::error!(%error, "Counter reconciliation failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommentId;
    use crate::infrastructure::in_memory::InMemoryDocumentStore;
    use crate::infrastructure::query::Query;
    use crate::infrastructure::repository::{
        Collection, CommitOutcome, DocumentStore, PaginatedResult, StoredDocument,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Commits `pending` just before the first read of `trigger`, standing in
    /// for a request that lands in the middle of a round.
    struct InterleavedStore {
        inner: InMemoryDocumentStore,
        trigger: Collection,
        pending: Mutex<Option<WriteBatch>>,
    }

    #[async_trait]
    impl DocumentStore for InterleavedStore {
        async fn get(
            &self,
            collection: Collection,
            id: Uuid,
        ) -> Result<Option<StoredDocument>, RepositoryError> {
            self.inner.get(collection, id).await
        }

        async fn find(
            &self,
            collection: Collection,
            query: &Query,
        ) -> Result<PaginatedResult<StoredDocument>, RepositoryError> {
            if collection == self.trigger {
                let pending = self.pending.lock().unwrap().take();
                if let Some(batch) = pending {
                    self.inner.commit(batch).await?;
                }
            }
            self.inner.find(collection, query).await
        }

        async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, RepositoryError> {
            self.inner.count(collection, filter).await
        }

        async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, RepositoryError> {
            self.inner.commit(batch).await
        }
    }

    #[rstest]
    #[case(Collection::Users)]
    #[case(Collection::Projects)]
    #[case(Collection::Tasks)]
    #[case(Collection::Comments)]
    #[case(Collection::ChecklistItems)]
    #[tokio::test]
    async fn test_writes_during_a_round_are_not_undone(#[case] trigger: Collection) {
        let now = Utc::now();
        let mut owner = User::new(UserId::generate(), "Ada", "Lovelace", "ada@x.io", now).activated();
        (owner.project_own_count, owner.project_in_count, owner.task_count) = (1, 1, 1);
        let mut project = Project::new(ProjectId::generate(), owner.id, "Engine", "", now);
        project.task_count = 1;
        let task = Task::new(TaskId::generate(), owner.id, "Gears", now)
            .in_project(project.id, Some(owner.id));

        let inner = InMemoryDocumentStore::new();
        let mut batch = WriteBatch::new();
        batch.insert(&owner).unwrap();
        batch.insert(&project).unwrap();
        batch.insert(&task).unwrap();
        inner.commit(batch).await.unwrap();

        let added = Task::new(TaskId::generate(), owner.id, "Levers", now)
            .in_project(project.id, Some(owner.id));
        let comment = Comment::new(
            CommentId::generate(),
            owner.id,
            "Started",
            TargetType::Task,
            *task.id.as_uuid(),
            now,
        );
        let mut concurrent = WriteBatch::new();
        concurrent.insert(&added).unwrap();
        concurrent.increment::<User>(owner.id, User::TASK_COUNT, 1);
        concurrent.increment::<Project>(project.id, Project::TASK_COUNT, 1);
        concurrent.insert(&comment).unwrap();
        concurrent.increment::<Task>(task.id, Task::COMMENT_COUNT, 1);

        let repository = Repository::new(Arc::new(InterleavedStore {
            inner,
            trigger,
            pending: Mutex::new(Some(concurrent)),
        }));
        reconcile_counters(&repository).await.unwrap();

        let owner: User = repository.get(owner.id).await.unwrap().unwrap();
        assert_eq!(owner.task_count, 2);
        let project: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(project.task_count, 2);
        let task: Task = repository.get(task.id).await.unwrap().unwrap();
        assert_eq!(task.comment_count, 1);

        let settled = reconcile_counters(&repository).await.unwrap();
        assert_eq!(settled.corrected, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_drifted_counters_are_repaired() {
        let repository = Repository::new(Arc::new(InMemoryDocumentStore::new()));
        let now = Utc::now();
        let owner = User::new(UserId::generate(), "Ada", "Lovelace", "ada@x.io", now).activated();
        let project = Project::new(ProjectId::generate(), owner.id, "Engine", "", now);
        let task = Task::new(TaskId::generate(), owner.id, "Gears", now)
            .in_project(project.id, Some(owner.id));
        let comment = Comment::new(
            CommentId::generate(),
            owner.id,
            "Looks good",
            TargetType::Task,
            *task.id.as_uuid(),
            now,
        );

        let mut batch = WriteBatch::new();
        batch.insert(&owner).unwrap();
        batch.insert(&project).unwrap();
        batch.insert(&task).unwrap();
        batch.insert(&comment).unwrap();
        repository.commit(batch).await.unwrap();

        let report = reconcile_counters(&repository).await.unwrap();
        assert_eq!(report.corrected, 3);
        assert_eq!(report.skipped, 0);

        let owner: User = repository.get(owner.id).await.unwrap().unwrap();
        assert_eq!(
            (owner.project_own_count, owner.project_in_count, owner.task_count),
            (1, 1, 1)
        );
        let project: Project = repository.get(project.id).await.unwrap().unwrap();
        assert_eq!(project.task_count, 1);
        let task: Task = repository.get(task.id).await.unwrap().unwrap();
        assert_eq!(task.comment_count, 1);

        let second = reconcile_counters(&repository).await.unwrap();
        assert_eq!(second.corrected, 0);
        assert_eq!(second.examined, 3);
    }
}
