use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use taskdeck_api::policy::Action;
use taskdeck_api::{CreateProgressRequest, ProgressUpdate, db, service};

use super::{Reply, authorize_task, created, load_task, new_id, ok};
use crate::error::{ApiErr, ApiJson};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, progress_from_row, sq_execute, sq_query_map, sq_query_opt};

/// GET /api/tasks/{id}/progress: newest first.
pub async fn list_progress(
    State(db): State<Db>,
    user: AuthUser,
    Path(task_id): Path<String>,
) -> Result<Reply<Vec<ProgressUpdate>>, ApiErr> {
    let task_id = service::parse_id(&task_id, "task")?;
    let conn = db.conn();
    let task = load_task(&conn, &task_id)?;
    authorize_task(&conn, &user.user_id, &task, Action::Read)?;
    let entries = sq_query_map(&conn, db::progress::list_for_task(&task_id), progress_from_row)
        .map_err(ApiErr::from_db("list progress"))?;
    Ok(ok(entries))
}

/// POST /api/tasks/{id}/progress: task owner or assignee only.
pub async fn create_progress(
    State(db): State<Db>,
    user: AuthUser,
    Path(task_id): Path<String>,
    ApiJson(req): ApiJson<CreateProgressRequest>,
) -> Result<(StatusCode, Reply<ProgressUpdate>), ApiErr> {
    let task_id = service::parse_id(&task_id, "task")?;
    let entry = service::validate_progress(req)?;
    let conn = db.conn();
    let task = load_task(&conn, &task_id)?;
    authorize_task(&conn, &user.user_id, &task, Action::ReportProgress)?;

    let id = new_id();
    sq_execute(&conn, db::progress::insert(&id, &task_id, &user.user_id, &entry))
        .map_err(ApiErr::from_db("create progress update"))?;
    let saved = sq_query_opt(&conn, db::progress::get_by_id(&id), progress_from_row)
        .map_err(ApiErr::from_db("load progress update"))?
        .ok_or_else(|| ApiErr::internal("internal server error"))?;
    Ok(created(saved, "Progress update added"))
}
