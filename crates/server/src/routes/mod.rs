pub mod ai;
pub mod auth;
pub mod comments;
pub mod health;
pub mod meetings;
pub mod notifications;
pub mod profile;
pub mod progress;
pub mod tasks;
pub mod teams;
pub mod users;

use axum::{Json, http::StatusCode};
use rusqlite::Connection;
use serde::Serialize;

use taskdeck_api::policy::{self, Action, Caller, Resource};
use taskdeck_api::{ApiResponse, Task, TeamRole, db};

use crate::error::ApiErr;
use crate::storage::{self, sq_query_opt, task_from_row};

pub(crate) type Reply<T> = Json<ApiResponse<T>>;

pub(crate) fn ok<T: Serialize>(data: T) -> Reply<T> {
    Json(ApiResponse::ok(data))
}

pub(crate) fn ok_with<T: Serialize>(data: T, message: &str) -> Reply<T> {
    Json(ApiResponse::ok(data).with_message(message))
}

pub(crate) fn created<T: Serialize>(data: T, message: &str) -> (StatusCode, Reply<T>) {
    (
        StatusCode::CREATED,
        Json(ApiResponse::ok(data).with_message(message)),
    )
}

pub(crate) fn done(message: &str) -> Reply<()> {
    Json(ApiResponse::message(message))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Access helpers shared by the resource routes
// ---------------------------------------------------------------------------

/// The caller's role in `team_id`, or `None` when not a member.
pub(crate) fn role_in(conn: &Connection, team_id: &str, user_id: &str) -> Result<Option<TeamRole>, ApiErr> {
    storage::team_role(conn, team_id, user_id).map_err(ApiErr::from_db("load team role"))
}

pub(crate) fn load_task(conn: &Connection, id: &str) -> Result<Task, ApiErr> {
    sq_query_opt(conn, db::tasks::get_by_id(id), task_from_row)
        .map_err(ApiErr::from_db("load task"))?
        .ok_or_else(|| ApiErr::not_found("Task not found"))
}

/// Check `action` on `task` for `user_id`, loading their team role when the
/// task belongs to a team.
pub(crate) fn authorize_task(
    conn: &Connection,
    user_id: &str,
    task: &Task,
    action: Action<'_>,
) -> Result<(), ApiErr> {
    let caller = match task.team_id.as_deref() {
        Some(team_id) => Caller::in_team(user_id, role_in(conn, team_id, user_id)?),
        None => Caller::personal(user_id),
    };
    let resource = Resource::Task {
        owner_id: &task.user_id,
        team_id: task.team_id.as_deref(),
        assigned_to: task.assigned_to.as_deref(),
    };
    policy::authorize(&caller, &resource, action)?;
    Ok(())
}

/// Check `action` on a team-scoped resource, returning the caller's role.
pub(crate) fn authorize_in_team(
    conn: &Connection,
    team_id: &str,
    user_id: &str,
    resource: Resource<'_>,
    action: Action<'_>,
) -> Result<Option<TeamRole>, ApiErr> {
    let role = role_in(conn, team_id, user_id)?;
    policy::authorize(&Caller::in_team(user_id, role), &resource, action)?;
    Ok(role)
}
