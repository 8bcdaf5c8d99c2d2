//! Task repository. Every statement runs inside a tenant-scoped transaction
//! and also filters on `tenant_id` explicitly.

use crate::auth::models::{NewTask, Task, TaskUpdate};
use crate::domain::{TaskId, TenantId, UserId};
use crate::errors::{Error, Result};
use crate::storage::repository::TaskRepository;
use crate::storage::scope::TenantScope;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::instrument;

const TASK_COLUMNS: &str = "id, tenant_id, title, status, assigned_to, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct TaskRow {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub title: String,
    pub status: String,
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            tenant_id: row.tenant_id,
            title: row.title,
            status: row.status,
            assigned_to: row.assigned_to,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlxTaskRepository {
    pool: DbPool,
}

impl SqlxTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    #[instrument(skip(self, scope, task), fields(tenant_id = %scope.tenant_id(), task_id = %task.id), name = "db_create_task")]
    async fn create(&self, scope: &TenantScope, task: NewTask) -> Result<Task> {
        let mut tx = scope.begin(&self.pool).await?;

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks (id, tenant_id, title, status, assigned_to) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task.id)
        .bind(scope.tenant_id())
        .bind(&task.title)
        .bind(&task.status)
        .bind(task.assigned_to)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| Error::database(err, "Failed to create task"))?;

        tx.commit().await.map_err(|err| Error::database(err, "Failed to commit task"))?;
        Ok(row.into())
    }

    #[instrument(skip(self, scope), fields(tenant_id = %scope.tenant_id(), task_id = %id), name = "db_find_task")]
    async fn find(&self, scope: &TenantScope, id: &TaskId) -> Result<Option<Task>> {
        let mut tx = scope.begin(&self.pool).await?;

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE tenant_id = $1 AND id = $2",
            TASK_COLUMNS
        ))
        .bind(scope.tenant_id())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch task"))?;

        tx.commit().await.map_err(|err| Error::database(err, "Failed to commit task read"))?;
        Ok(row.map(Task::from))
    }

    #[instrument(skip(self, scope), fields(tenant_id = %scope.tenant_id(), task_id = %id), name = "db_find_task_owner")]
    async fn find_owner(&self, scope: &TenantScope, id: &TaskId) -> Result<Option<UserId>> {
        let mut tx = scope.begin(&self.pool).await?;

        let owner = sqlx::query_scalar::<_, Option<UserId>>(
            "SELECT assigned_to FROM tasks WHERE tenant_id = $1 AND id = $2",
        )
        .bind(scope.tenant_id())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch task owner"))?;

        tx.commit().await.map_err(|err| Error::database(err, "Failed to commit task read"))?;
        Ok(owner.flatten())
    }

    #[instrument(skip(self, scope), fields(tenant_id = %scope.tenant_id()), name = "db_list_tasks")]
    async fn list(&self, scope: &TenantScope, assigned_to: Option<&UserId>) -> Result<Vec<Task>> {
        let mut tx = scope.begin(&self.pool).await?;

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tasks WHERE tenant_id = ", TASK_COLUMNS));
        query.push_bind(scope.tenant_id());
        if let Some(owner) = assigned_to {
            query.push(" AND assigned_to = ").push_bind(*owner);
        }
        query.push(" ORDER BY created_at");

        let rows = query
            .build_query_as::<TaskRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(|err| Error::database(err, "Failed to list tasks"))?;

        tx.commit().await.map_err(|err| Error::database(err, "Failed to commit task read"))?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    #[instrument(skip(self, scope, update), fields(tenant_id = %scope.tenant_id(), task_id = %id), name = "db_update_task")]
    async fn update(
        &self,
        scope: &TenantScope,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        let mut tx = scope.begin(&self.pool).await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tasks SET updated_at = now()");
        if let Some(title) = &update.title {
            query.push(", title = ").push_bind(title.clone());
        }
        if let Some(status) = &update.status {
            query.push(", status = ").push_bind(status.clone());
        }
        query.push(" WHERE tenant_id = ").push_bind(scope.tenant_id());
        query.push(" AND id = ").push_bind(*id);
        query.push(format!(" RETURNING {}", TASK_COLUMNS));

        let row = query
            .build_query_as::<TaskRow>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| Error::database(err, "Failed to update task"))?;

        tx.commit().await.map_err(|err| Error::database(err, "Failed to commit task update"))?;
        Ok(row.map(Task::from))
    }
}

#[cfg(all(test, feature = "postgres_tests"))]
mod tests {
    use super::*;
    use crate::storage::test_helpers::TestDatabase;

    fn new_task(title: &str, assigned_to: Option<UserId>) -> NewTask {
        NewTask {
            id: TaskId::new(),
            title: title.to_string(),
            status: "open".to_string(),
            assigned_to,
        }
    }

    #[tokio::test]
    async fn test_tasks_are_invisible_across_tenants() {
        let db = TestDatabase::new("task_isolation").await;
        let (acme, acme_owner) = db.seed_tenant("acme").await;
        let (globex, _) = db.seed_tenant("globex").await;
        let repo = SqlxTaskRepository::new(db.pool.clone());
        let (acme_scope, globex_scope) =
            (TenantScope::for_resolved(&acme), TenantScope::for_resolved(&globex));

        let task = repo.create(&acme_scope, new_task("Call", Some(acme_owner.id))).await.unwrap();
        assert_eq!(task.tenant_id, acme.id);

        assert!(repo.find(&globex_scope, &task.id).await.unwrap().is_none());
        assert!(repo.find_owner(&globex_scope, &task.id).await.unwrap().is_none());
        assert!(repo.list(&globex_scope, None).await.unwrap().is_empty());

        let update = TaskUpdate { title: None, status: Some("done".to_string()) };
        assert!(repo.update(&globex_scope, &task.id, &update).await.unwrap().is_none());

        let stored = repo.find(&acme_scope, &task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "open");
        assert_eq!(repo.find_owner(&acme_scope, &task.id).await.unwrap(), Some(acme_owner.id));
    }

    #[tokio::test]
    async fn test_list_filters_by_assignee() {
        let db = TestDatabase::new("task_list").await;
        let (acme, owner) = db.seed_tenant("acme").await;
        let repo = SqlxTaskRepository::new(db.pool.clone());
        let scope = TenantScope::for_resolved(&acme);

        repo.create(&scope, new_task("Mine", Some(owner.id))).await.unwrap();
        repo.create(&scope, new_task("Unassigned", None)).await.unwrap();

        assert_eq!(repo.list(&scope, None).await.unwrap().len(), 2);
        let mine = repo.list(&scope, Some(&owner.id)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Mine");

        let update = TaskUpdate { title: Some("Renamed".to_string()), status: None };
        let updated = repo.update(&scope, &mine[0].id, &update).await.unwrap().unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.status, "open");
    }
}
