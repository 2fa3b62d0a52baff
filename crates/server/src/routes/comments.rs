use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;

use taskdeck_api::policy::{self, Action, Caller, Resource};
use taskdeck_api::{Comment, CommentRequest, db, service};

use super::{Reply, authorize_task, created, done, load_task, new_id, ok, ok_with};
use crate::error::{ApiErr, ApiJson};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, comment_from_row, sq_execute, sq_query_map, sq_query_opt};

fn load(conn: &Connection, id: &str) -> Result<Comment, ApiErr> {
    sq_query_opt(conn, db::comments::get_by_id(id), comment_from_row)
        .map_err(ApiErr::from_db("load comment"))?
        .ok_or_else(|| ApiErr::not_found("Comment not found"))
}

fn authorize_author(user_id: &str, comment: &Comment, action: Action<'_>) -> Result<(), ApiErr> {
    policy::authorize(
        &Caller::personal(user_id),
        &Resource::Comment {
            author_id: &comment.user_id,
        },
        action,
    )?;
    Ok(())
}

/// GET /api/tasks/{id}/comments: oldest first, with author profiles.
pub async fn list_comments(
    State(db): State<Db>,
    user: AuthUser,
    Path(task_id): Path<String>,
) -> Result<Reply<Vec<Comment>>, ApiErr> {
    let task_id = service::parse_id(&task_id, "task")?;
    let conn = db.conn();
    let task = load_task(&conn, &task_id)?;
    authorize_task(&conn, &user.user_id, &task, Action::Read)?;
    let comments = sq_query_map(&conn, db::comments::list_for_task(&task_id), comment_from_row)
        .map_err(ApiErr::from_db("list comments"))?;
    Ok(ok(comments))
}

/// POST /api/tasks/{id}/comments: anyone who can read the task may comment.
pub async fn create_comment(
    State(db): State<Db>,
    user: AuthUser,
    Path(task_id): Path<String>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<(StatusCode, Reply<Comment>), ApiErr> {
    let task_id = service::parse_id(&task_id, "task")?;
    let content = service::validate_comment(&req.content)?;
    let conn = db.conn();
    let task = load_task(&conn, &task_id)?;
    authorize_task(&conn, &user.user_id, &task, Action::Read)?;

    let id = new_id();
    sq_execute(&conn, db::comments::insert(&id, &task_id, &user.user_id, &content))
        .map_err(ApiErr::from_db("create comment"))?;
    Ok(created(load(&conn, &id)?, "Comment added"))
}

/// PATCH /api/comments/{id}: author only.
pub async fn update_comment(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<Reply<Comment>, ApiErr> {
    let id = service::parse_id(&id, "comment")?;
    let conn = db.conn();
    let comment = load(&conn, &id)?;
    authorize_author(&user.user_id, &comment, Action::Update(&[]))?;
    let content = service::validate_comment(&req.content)?;

    sq_execute(&conn, db::comments::update_content(&id, &content))
        .map_err(ApiErr::from_db("update comment"))?;
    Ok(ok_with(load(&conn, &id)?, "Comment updated"))
}

/// DELETE /api/comments/{id}: author only.
pub async fn delete_comment(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<()>, ApiErr> {
    let id = service::parse_id(&id, "comment")?;
    let conn = db.conn();
    let comment = load(&conn, &id)?;
    authorize_author(&user.user_id, &comment, Action::Delete)?;
    sq_execute(&conn, db::comments::delete(&id)).map_err(ApiErr::from_db("delete comment"))?;
    Ok(done("Comment deleted successfully"))
}
