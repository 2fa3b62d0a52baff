use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde_json::json;

use taskdeck_api::db::tasks::{TaskFilter, TaskScope};
use taskdeck_api::policy::{Action, Resource};
use taskdeck_api::service::{self, Validator};
use taskdeck_api::{
    ApiResponse, CreateTaskRequest, NotificationType, Pagination, Task, TaskListQuery, TaskStats,
    UpdateTaskRequest, Workspace, db,
};

use super::{
    Reply, authorize_in_team, authorize_task, created, done, load_task, new_id, ok, ok_with, role_in,
};
use crate::error::{ApiErr, ApiJson, ApiQuery};
use crate::routes::{auth::AuthUser, notifications};
use crate::storage::{Db, count, sq_execute, sq_query_map, sq_query_row, task_from_row};

/// An assignee must belong to the task's team; personal tasks can only be
/// assigned to their owner.
fn check_assignee(
    conn: &Connection,
    team_id: Option<&str>,
    owner_id: &str,
    assignee: &str,
) -> Result<(), ApiErr> {
    match team_id {
        Some(team_id) => {
            if role_in(conn, team_id, assignee)?.is_none() {
                return Err(ApiErr::bad_request("Assigned user is not a team member"));
            }
        }
        None => {
            if assignee != owner_id {
                return Err(ApiErr::bad_request(
                    "Personal tasks cannot be assigned to others",
                ));
            }
        }
    }
    Ok(())
}

fn notify_assignee(conn: &Connection, task: &Task, assigner_id: &str) {
    let Some(assignee) = task.assigned_to.as_deref() else {
        return;
    };
    if assignee == assigner_id {
        return;
    }
    if let Err(e) = notifications::insert(
        conn,
        assignee,
        NotificationType::TaskAssigned,
        "New task assigned",
        &format!("You have been assigned to \"{}\"", task.title),
        Some(json!({ "task_id": task.id, "team_id": task.team_id, "assigned_by": assigner_id })),
    ) {
        tracing::warn!("task {} assignment notification: {e}", task.id);
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/tasks: personal tasks, or a team's tasks with `workspace=team`.
pub async fn list_tasks(
    State(db): State<Db>,
    user: AuthUser,
    ApiQuery(q): ApiQuery<TaskListQuery>,
) -> Result<Json<ApiResponse<Vec<Task>>>, ApiErr> {
    let workspace = q.workspace.unwrap_or_default();
    let (limit, offset) = service::resolve_page(q.limit, q.offset)?;

    let mut v = Validator::new();
    let due_before = v.timestamp("due_before", q.due_before.as_deref());
    let due_after = v.timestamp("due_after", q.due_after.as_deref());
    v.finish()?;

    let team_id = match workspace {
        Workspace::Personal => None,
        Workspace::Team => {
            let raw = q
                .team_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ApiErr::bad_request("team_id is required for team workspace"))?;
            Some(service::parse_id(raw, "team")?)
        }
    };

    let conn = db.conn();
    let scope = match team_id.as_deref() {
        Some(team_id) => {
            authorize_in_team(&conn, team_id, &user.user_id, Resource::Team, Action::Read)?;
            TaskScope::Team { team_id }
        }
        None => TaskScope::Personal {
            user_id: &user.user_id,
        },
    };

    let search = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let category = q.category.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let built = db::tasks::list(&TaskFilter {
        scope,
        status: q.status,
        priority: q.priority,
        category,
        due_before: due_before.as_deref(),
        due_after: due_after.as_deref(),
        search,
        limit,
        offset,
        order_by: q.order_by.unwrap_or_default(),
        direction: q.order_direction.unwrap_or_default(),
    });

    let total = count(&conn, built.count_query).map_err(ApiErr::from_db("count tasks"))?;
    let tasks = sq_query_map(&conn, built.select_query, task_from_row)
        .map_err(ApiErr::from_db("list tasks"))?;

    let has_more = i64::from(offset) + (tasks.len() as i64) < total;
    let mut resp = ApiResponse::ok(tasks);
    resp.pagination = Some(Pagination {
        total,
        limit,
        offset,
        has_more,
    });
    resp.workspace = Some(workspace);
    Ok(Json(resp))
}

/// GET /api/tasks/stats: counts over tasks the caller owns or is assigned.
pub async fn task_stats(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<Reply<TaskStats>, ApiErr> {
    let now = service::now_timestamp();
    let conn = db.conn();
    let stats = sq_query_row(&conn, db::tasks::stats_for_user(&user.user_id, &now), |row| {
        Ok(TaskStats {
            total_tasks: row.get(0)?,
            completed_tasks: row.get(1)?,
            todo_tasks: row.get(2)?,
            in_progress_tasks: row.get(3)?,
            overdue_tasks: row.get(4)?,
        })
    })
    .map_err(ApiErr::from_db("task stats"))?;
    Ok(ok(stats))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/tasks: create a personal task, or a team task (leaders only).
pub async fn create_task(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Reply<Task>), ApiErr> {
    let new_task = service::validate_new_task(req)?;

    let conn = db.conn();
    if let Some(team_id) = new_task.team_id.as_deref() {
        authorize_in_team(
            &conn,
            team_id,
            &user.user_id,
            Resource::Task {
                owner_id: &user.user_id,
                team_id: Some(team_id),
                assigned_to: new_task.assigned_to.as_deref(),
            },
            Action::Create,
        )?;
    }
    if let Some(assignee) = new_task.assigned_to.as_deref() {
        check_assignee(&conn, new_task.team_id.as_deref(), &user.user_id, assignee)?;
    }

    let id = new_id();
    let assigned_by = new_task.assigned_to.as_ref().map(|_| user.user_id.as_str());
    sq_execute(&conn, db::tasks::insert(&id, &user.user_id, &new_task, assigned_by))
        .map_err(ApiErr::from_db("create task"))?;
    let task = load_task(&conn, &id)?;

    if task.team_id.is_some() {
        notify_assignee(&conn, &task, &user.user_id);
    }
    tracing::info!("task {} created by {}", task.id, user.user_id);

    Ok(created(task, "Task created successfully"))
}

// ---------------------------------------------------------------------------
// Single task
// ---------------------------------------------------------------------------

/// GET /api/tasks/{id}
pub async fn get_task(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<Task>, ApiErr> {
    let id = service::parse_id(&id, "task")?;
    let conn = db.conn();
    let task = load_task(&conn, &id)?;
    authorize_task(&conn, &user.user_id, &task, Action::Read)?;
    Ok(ok(task))
}

/// PUT /api/tasks/{id}: team members may only change `status`; the whole
/// request is refused when it carries any other field.
pub async fn update_task(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> Result<Reply<Task>, ApiErr> {
    let id = service::parse_id(&id, "task")?;
    let conn = db.conn();
    let task = load_task(&conn, &id)?;
    let fields = req.fields();
    authorize_task(&conn, &user.user_id, &task, Action::Update(&fields))?;

    let patch = service::validate_task_update(req)?;
    if let Some(Some(assignee)) = patch.assigned_to.as_ref() {
        check_assignee(&conn, task.team_id.as_deref(), &task.user_id, assignee)?;
    }

    let Some(built) = db::tasks::update(&id, &patch, &user.user_id) else {
        return Ok(ok_with(task, "Task updated successfully"));
    };
    sq_execute(&conn, built).map_err(ApiErr::from_db("update task"))?;
    let updated = load_task(&conn, &id)?;

    if updated.team_id.is_some() && updated.assigned_to != task.assigned_to {
        notify_assignee(&conn, &updated, &user.user_id);
    }

    Ok(ok_with(updated, "Task updated successfully"))
}

/// DELETE /api/tasks/{id}: comments and progress go with it.
pub async fn delete_task(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<()>, ApiErr> {
    let id = service::parse_id(&id, "task")?;
    let conn = db.conn();
    let task = load_task(&conn, &id)?;
    authorize_task(&conn, &user.user_id, &task, Action::Delete)?;
    sq_execute(&conn, db::tasks::delete(&id)).map_err(ApiErr::from_db("delete task"))?;
    Ok(done("Task deleted successfully"))
}
