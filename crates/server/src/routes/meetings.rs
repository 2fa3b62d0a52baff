use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde_json::json;

use taskdeck_api::db::meetings::MeetingFilter;
use taskdeck_api::policy::{Action, Resource};
use taskdeck_api::service::{self, Validator};
use taskdeck_api::{
    CreateMeetingRequest, Meeting, MeetingListQuery, NotificationType, UpdateMeetingRequest, db,
};

use super::{Reply, authorize_in_team, created, done, new_id, ok, ok_with};
use crate::error::{ApiErr, ApiJson, ApiQuery};
use crate::routes::{auth::AuthUser, notifications};
use crate::storage::{Db, meeting_from_row, sq_execute, sq_query_map, sq_query_opt};

fn load(conn: &Connection, id: &str) -> Result<Meeting, ApiErr> {
    sq_query_opt(conn, db::meetings::get_by_id(id), meeting_from_row)
        .map_err(ApiErr::from_db("load meeting"))?
        .ok_or_else(|| ApiErr::not_found("Meeting not found"))
}

/// Tell the rest of the team about a new meeting. Failures are logged only.
fn notify_team(conn: &Connection, meeting: &Meeting) {
    let members = match sq_query_map(
        conn,
        db::teams::member_ids_except(&meeting.team_id, &meeting.created_by),
        |row| row.get::<_, String>(0),
    ) {
        Ok(members) => members,
        Err(e) => {
            tracing::warn!("meeting {} notification recipients: {e}", meeting.id);
            return;
        }
    };
    let message = format!("\"{}\" is scheduled for {}", meeting.title, meeting.scheduled_at);
    let data = json!({ "meeting_id": meeting.id, "team_id": meeting.team_id });
    for member in members {
        if let Err(e) = notifications::insert(
            conn,
            &member,
            NotificationType::MeetingScheduled,
            "New meeting scheduled",
            &message,
            Some(data.clone()),
        ) {
            tracing::warn!("meeting {} notification for {member}: {e}", meeting.id);
        }
    }
}

/// GET /api/meetings: meetings of the caller's teams, soonest first.
pub async fn list_meetings(
    State(db): State<Db>,
    user: AuthUser,
    ApiQuery(q): ApiQuery<MeetingListQuery>,
) -> Result<Reply<Vec<Meeting>>, ApiErr> {
    let mut v = Validator::new();
    let team_id = v.id("team_id", q.team_id.as_deref());
    let scheduled_after = v.timestamp("scheduled_after", q.scheduled_after.as_deref());
    let scheduled_before = v.timestamp("scheduled_before", q.scheduled_before.as_deref());
    v.finish()?;
    let (limit, offset) = match q.limit {
        Some(_) => {
            let (limit, offset) = service::resolve_page(q.limit, q.offset)?;
            (Some(limit), offset)
        }
        None => (None, q.offset.unwrap_or(0)),
    };

    let conn = db.conn();
    if let Some(team_id) = team_id.as_deref() {
        authorize_in_team(&conn, team_id, &user.user_id, Resource::Meeting, Action::Read)?;
    }
    let meetings = sq_query_map(
        &conn,
        db::meetings::list(&MeetingFilter {
            user_id: &user.user_id,
            team_id: team_id.as_deref(),
            scheduled_after: scheduled_after.as_deref(),
            scheduled_before: scheduled_before.as_deref(),
            limit,
            offset,
        }),
        meeting_from_row,
    )
    .map_err(ApiErr::from_db("list meetings"))?;
    Ok(ok(meetings))
}

/// POST /api/meetings: team leaders only.
pub async fn create_meeting(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateMeetingRequest>,
) -> Result<(StatusCode, Reply<Meeting>), ApiErr> {
    let meeting = service::validate_new_meeting(req)?;
    let conn = db.conn();
    authorize_in_team(
        &conn,
        &meeting.team_id,
        &user.user_id,
        Resource::Meeting,
        Action::Create,
    )?;

    let id = new_id();
    sq_execute(&conn, db::meetings::insert(&id, &user.user_id, &meeting))
        .map_err(ApiErr::from_db("create meeting"))?;
    let saved = load(&conn, &id)?;
    notify_team(&conn, &saved);
    Ok(created(saved, "Meeting scheduled successfully"))
}

/// GET /api/meetings/{id}
pub async fn get_meeting(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<Meeting>, ApiErr> {
    let id = service::parse_id(&id, "meeting")?;
    let conn = db.conn();
    let meeting = load(&conn, &id)?;
    authorize_in_team(&conn, &meeting.team_id, &user.user_id, Resource::Meeting, Action::Read)?;
    Ok(ok(meeting))
}

/// PATCH /api/meetings/{id}: team leaders only.
pub async fn update_meeting(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateMeetingRequest>,
) -> Result<Reply<Meeting>, ApiErr> {
    let id = service::parse_id(&id, "meeting")?;
    let conn = db.conn();
    let meeting = load(&conn, &id)?;
    authorize_in_team(
        &conn,
        &meeting.team_id,
        &user.user_id,
        Resource::Meeting,
        Action::Update(&[]),
    )?;
    let patch = service::validate_meeting_update(req)?;

    let Some(built) = db::meetings::update(&id, &patch) else {
        return Ok(ok_with(meeting, "Meeting updated successfully"));
    };
    sq_execute(&conn, built).map_err(ApiErr::from_db("update meeting"))?;
    Ok(ok_with(load(&conn, &id)?, "Meeting updated successfully"))
}

/// DELETE /api/meetings/{id}: team leaders only.
pub async fn delete_meeting(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<()>, ApiErr> {
    let id = service::parse_id(&id, "meeting")?;
    let conn = db.conn();
    let meeting = load(&conn, &id)?;
    authorize_in_team(
        &conn,
        &meeting.team_id,
        &user.user_id,
        Resource::Meeting,
        Action::Delete,
    )?;
    sq_execute(&conn, db::meetings::delete(&id)).map_err(ApiErr::from_db("delete meeting"))?;
    Ok(done("Meeting deleted successfully"))
}
