use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;

use taskdeck_api::db::notifications::InsertParams;
use taskdeck_api::policy::{self, Action, Caller, Resource};
use taskdeck_api::{
    CreateNotificationRequest, MarkAllReadResponse, Notification, NotificationListQuery,
    NotificationType, UnreadCount, UpdateNotificationRequest, db, service,
};

use super::{Reply, created, done, new_id, ok, ok_with, role_in};
use crate::error::{ApiErr, ApiJson, ApiQuery};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, count, notification_from_row, sq_execute, sq_query_map, sq_query_opt};

/// Insert a notification row. Used by other routes for their side effects.
pub(crate) fn insert(
    conn: &Connection,
    user_id: &str,
    kind: NotificationType,
    title: &str,
    message: &str,
    data: Option<serde_json::Value>,
) -> rusqlite::Result<String> {
    let id = new_id();
    sq_execute(
        conn,
        db::notifications::insert(InsertParams {
            id: &id,
            user_id,
            kind,
            title,
            message,
            data: data.map(|d| d.to_string()),
        }),
    )?;
    Ok(id)
}

fn load(conn: &Connection, id: &str) -> Result<Notification, ApiErr> {
    sq_query_opt(conn, db::notifications::get(id), notification_from_row)
        .map_err(ApiErr::from_db("load notification"))?
        .ok_or_else(|| ApiErr::not_found("Notification not found"))
}

/// Load a notification and check `user_id` may perform `action` on it.
fn load_authorized(
    conn: &Connection,
    id: &str,
    user_id: &str,
    action: Action<'_>,
) -> Result<Notification, ApiErr> {
    let notification = load(conn, id)?;
    policy::authorize(
        &Caller::personal(user_id),
        &Resource::Notification {
            recipient_id: &notification.user_id,
        },
        action,
    )?;
    Ok(notification)
}

// ---------------------------------------------------------------------------
// List / count
// ---------------------------------------------------------------------------

/// GET /api/notifications: the caller's notifications, newest first.
pub async fn list_notifications(
    State(db): State<Db>,
    user: AuthUser,
    ApiQuery(q): ApiQuery<NotificationListQuery>,
) -> Result<Reply<Vec<Notification>>, ApiErr> {
    let conn = db.conn();
    let rows = sq_query_map(
        &conn,
        db::notifications::list(&user.user_id, q.read),
        notification_from_row,
    )
    .map_err(ApiErr::from_db("list notifications"))?;
    Ok(ok(rows))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<Reply<UnreadCount>, ApiErr> {
    let conn = db.conn();
    let count = count(&conn, db::notifications::unread_count(&user.user_id))
        .map_err(ApiErr::from_db("count unread notifications"))?;
    Ok(ok(UnreadCount { count }))
}

/// POST /api/notifications/mark-all-read
pub async fn mark_all_read(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<Reply<MarkAllReadResponse>, ApiErr> {
    let conn = db.conn();
    let updated = sq_execute(&conn, db::notifications::mark_all_read(&user.user_id))
        .map_err(ApiErr::from_db("mark all notifications read"))?;
    Ok(ok_with(
        MarkAllReadResponse { updated },
        "All notifications marked as read",
    ))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/notifications: notify yourself, or a member of a team you lead.
pub async fn create_notification(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Reply<Notification>), ApiErr> {
    let (title, message) = service::validate_notification(&req.title, &req.message)?;
    let recipient = match req.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => service::parse_id(raw, "user")?,
        None => user.user_id.clone(),
    };

    let conn = db.conn();
    if recipient != user.user_id {
        let team_id = req
            .team_id
            .as_deref()
            .map(|raw| service::parse_id(raw, "team"))
            .transpose()?
            .ok_or_else(|| ApiErr::forbidden("Only team leaders can notify other members"))?;
        let caller = Caller::in_team(&user.user_id, role_in(&conn, &team_id, &user.user_id)?);
        policy::authorize(
            &caller,
            &Resource::Notification {
                recipient_id: &recipient,
            },
            Action::Create,
        )?;
        if role_in(&conn, &team_id, &recipient)?.is_none() {
            return Err(ApiErr::bad_request("Recipient is not a team member"));
        }
    }

    let id = insert(&conn, &recipient, req.kind, &title, &message, req.data)
        .map_err(ApiErr::from_db("create notification"))?;
    let notification = load(&conn, &id)?;
    Ok(created(notification, "Notification created"))
}

// ---------------------------------------------------------------------------
// Single notification
// ---------------------------------------------------------------------------

/// GET /api/notifications/{id}
pub async fn get_notification(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<Notification>, ApiErr> {
    let id = service::parse_id(&id, "notification")?;
    let conn = db.conn();
    Ok(ok(load_authorized(&conn, &id, &user.user_id, Action::Read)?))
}

/// PATCH /api/notifications/{id}: set the read flag.
pub async fn update_notification(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateNotificationRequest>,
) -> Result<Reply<Notification>, ApiErr> {
    let id = service::parse_id(&id, "notification")?;
    let conn = db.conn();
    load_authorized(&conn, &id, &user.user_id, Action::Update(&[]))?;
    let changed = sq_execute(&conn, db::notifications::set_read(&id, &user.user_id, req.read))
        .map_err(ApiErr::from_db("update notification"))?;
    if changed == 0 {
        return Err(ApiErr::not_found("Notification not found"));
    }
    Ok(ok(load(&conn, &id)?))
}

/// DELETE /api/notifications/{id}
pub async fn delete_notification(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<()>, ApiErr> {
    let id = service::parse_id(&id, "notification")?;
    let conn = db.conn();
    load_authorized(&conn, &id, &user.user_id, Action::Delete)?;
    let deleted = sq_execute(&conn, db::notifications::delete(&id, &user.user_id))
        .map_err(ApiErr::from_db("delete notification"))?;
    if deleted == 0 {
        return Err(ApiErr::not_found("Notification not found"));
    }
    Ok(done("Notification deleted"))
}
