//! Tasks: the tenant-scoped resource behind ownership-based authorization.
//!
//! Every repository call runs under the request's [`TenantScope`], so a task
//! id from another tenant behaves exactly like one that does not exist.
//! Callers that only hold the `:own` permission are denied with 403 in both
//! cases.
//!
//! [`TenantScope`]: crate::storage::TenantScope

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::extractors::Client;
use crate::api::routes::AppState;
use crate::auth::{
    models::{NewTask, RequestContext, Task, TaskUpdate},
    permissions::{require_any_permission, require_permission, require_permission_with_ownership},
    validation::{CreateTaskRequest, UpdateTaskRequest},
};
use crate::domain::TaskId;
use crate::errors::Error;
use crate::services::audit::{actions, AuditEvent};

const DEFAULT_TASK_STATUS: &str = "open";

/// Ensure the caller may act on the task, revealing nothing to `:own` holders.
async fn authorize_task(
    state: &AppState,
    context: &RequestContext,
    id: TaskId,
    all_name: &str,
    own_name: &str,
) -> Result<(), ApiError> {
    let tasks = state.repos.tasks.clone();
    let scope = context.scope();
    let decision =
        require_permission_with_ownership(&context.auth, all_name, own_name, move || async move {
            tasks.find_owner(&scope, &id).await
        })
        .await?;
    decision.into_result()?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    responses(
        (status = 200, description = "Tasks visible to the caller", body = [Task]),
        (status = 403, description = "Missing tasks:read permission", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<Vec<Task>>, ApiError> {
    let permissions = &context.auth.permissions;
    require_any_permission(permissions, &["tasks:read:all", "tasks:read:own"]).into_result()?;

    let caller = context.auth.user_id();
    let assigned_to = if permissions.contains("tasks:read:all") { None } else { Some(&caller) };
    let tasks = state.repos.tasks.list(&context.scope(), assigned_to).await?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation error", body = crate::api::error::ErrorBody),
        (status = 403, description = "Missing tasks:create permission", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "tasks"
)]
pub async fn create_task_handler(
    State(state): State<AppState>,
    Client(client): Client,
    context: RequestContext,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    require_permission(&context.auth.permissions, "tasks:create").into_result()?;
    payload.validate().map_err(Error::from)?;

    let assignee = payload.assigned_to.unwrap_or_else(|| context.auth.user_id());
    if assignee != context.auth.user_id() {
        let in_tenant = state
            .repos
            .users
            .find_by_id(&assignee)
            .await?
            .is_some_and(|u| u.is_active && u.tenant_id == Some(context.tenant_id()));
        if !in_tenant {
            return Err(Error::validation_field("Unknown assignee", "assignedTo").into());
        }
    }

    let task = state
        .repos
        .tasks
        .create(
            &context.scope(),
            NewTask {
                id: TaskId::new(),
                title: payload.title.trim().to_string(),
                status: payload.status.unwrap_or_else(|| DEFAULT_TASK_STATUS.to_string()),
                assigned_to: Some(assignee),
            },
        )
        .await?;

    info!(task_id = %task.id, tenant_id = %task.tenant_id, "task created");
    state.audit.log(
        AuditEvent::new(actions::TASK_CREATED, "task")
            .tenant(Some(context.tenant_id()))
            .user(Some(context.auth.user_id()))
            .resource(task.id)
            .client(&client),
    );
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 403, description = "Not permitted to read this task", body = crate::api::error::ErrorBody),
        (status = 404, description = "Task not found", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "tasks"
)]
pub async fn get_task_handler(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, ApiError> {
    authorize_task(&state, &context, id, "tasks:read:all", "tasks:read:own").await?;

    let task = state
        .repos
        .tasks
        .find(&context.scope(), &id)
        .await?
        .ok_or_else(|| Error::not_found("task", id.to_string()))?;
    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{id}",
    params(("id" = String, Path, description = "Task id")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 400, description = "Validation error", body = crate::api::error::ErrorBody),
        (status = 403, description = "Not permitted to update this task", body = crate::api::error::ErrorBody),
        (status = 404, description = "Task not found", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "tasks"
)]
pub async fn update_task_handler(
    State(state): State<AppState>,
    Client(client): Client,
    context: RequestContext,
    Path(id): Path<TaskId>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    authorize_task(&state, &context, id, "tasks:update:all", "tasks:update:own").await?;
    payload.validate().map_err(Error::from)?;

    let update = TaskUpdate {
        title: payload.title.map(|t| t.trim().to_string()),
        status: payload.status,
    };
    let task = state
        .repos
        .tasks
        .update(&context.scope(), &id, &update)
        .await?
        .ok_or_else(|| Error::not_found("task", id.to_string()))?;

    state.audit.log(
        AuditEvent::new(actions::TASK_UPDATED, "task")
            .tenant(Some(context.tenant_id()))
            .user(Some(context.auth.user_id()))
            .resource(task.id)
            .details(json!({ "status": task.status }))
            .client(&client),
    );
    Ok(Json(task))
}
