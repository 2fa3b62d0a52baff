use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde_json::json;

use taskdeck_api::policy::{Action, Resource};
use taskdeck_api::service::{self, TEAM_DESCRIPTION_MAX, TEAM_NAME_MAX, Validator};
use taskdeck_api::{
    AddMemberRequest, CreateTeamRequest, NotificationType, PublicProfile, Team, TeamDetail,
    TeamMember, TeamRole, TeamStats, TeamSummary, UpdateMemberRequest, UpdateTeamRequest, db,
};

use super::{Reply, authorize_in_team, created, done, new_id, ok, ok_with};
use crate::AppState;
use crate::error::{ApiErr, ApiJson};
use crate::mailer::{self, TeamInvitation};
use crate::routes::{auth::AuthUser, notifications};
use crate::storage::{
    Db, is_unique_violation, member_from_row, parse_col, public_profile_from_row, sq_execute,
    sq_query_map, sq_query_opt, sq_query_row, team_from_row,
};

fn load_team(conn: &Connection, id: &str) -> Result<Team, ApiErr> {
    sq_query_opt(conn, db::teams::get_by_id(id), team_from_row)
        .map_err(ApiErr::from_db("load team"))?
        .ok_or_else(|| ApiErr::not_found("Team not found"))
}

fn load_member(conn: &Connection, team_id: &str, member_id: &str) -> Result<TeamMember, ApiErr> {
    sq_query_opt(conn, db::teams::member_get(team_id, member_id), member_from_row)
        .map_err(ApiErr::from_db("load team member"))?
        .ok_or_else(|| ApiErr::not_found("Member not found"))
}

fn list_members_of(conn: &Connection, team_id: &str) -> Result<Vec<TeamMember>, ApiErr> {
    sq_query_map(conn, db::teams::member_list(team_id), member_from_row)
        .map_err(ApiErr::from_db("list team members"))
}

fn public_profile(conn: &Connection, user_id: &str) -> Result<Option<PublicProfile>, ApiErr> {
    sq_query_opt(conn, db::profiles::get_public(user_id), public_profile_from_row)
        .map_err(ApiErr::from_db("load profile"))
}

fn display_name(profile: Option<&PublicProfile>) -> Option<String> {
    profile.and_then(|p| p.full_name.clone().or_else(|| p.email.clone()))
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

/// GET /api/teams: teams the caller belongs to, with their role in each.
pub async fn list_my_teams(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<Reply<Vec<TeamSummary>>, ApiErr> {
    let conn = db.conn();
    let teams = sq_query_map(&conn, db::teams::list_my(&user.user_id), |row| {
        Ok(TeamSummary {
            team: team_from_row(row)?,
            role: parse_col(row, 6)?,
        })
    })
    .map_err(ApiErr::from_db("list teams"))?;
    Ok(ok(teams))
}

/// POST /api/teams: create a team. The creator becomes its leader.
pub async fn create_team(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTeamRequest>,
) -> Result<(StatusCode, Reply<Team>), ApiErr> {
    let (name, description) = service::validate_team(&req.name, req.description.as_deref())?;
    let team_id = new_id();

    let mut conn = db.conn();
    let tx = conn.transaction().map_err(ApiErr::from_db("begin transaction"))?;
    sq_execute(
        &tx,
        db::teams::insert(&team_id, &name, description.as_deref(), &user.user_id),
    )
    .map_err(ApiErr::from_db("create team"))?;
    sq_execute(
        &tx,
        db::teams::member_insert(&new_id(), &team_id, &user.user_id, TeamRole::Leader),
    )
    .map_err(ApiErr::from_db("add creator as leader"))?;
    tx.commit().map_err(ApiErr::from_db("commit team"))?;

    let team = load_team(&conn, &team_id)?;
    tracing::info!("team {} created by {}", team.id, user.user_id);
    Ok(created(team, "Team created successfully"))
}

/// GET /api/teams/{id}: team with its members. Members only.
pub async fn get_team(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<TeamDetail>, ApiErr> {
    let id = service::parse_id(&id, "team")?;
    let conn = db.conn();
    authorize_in_team(&conn, &id, &user.user_id, Resource::Team, Action::Read)?;
    let team = load_team(&conn, &id)?;
    let members = list_members_of(&conn, &id)?;
    let member_count = members.len() as i64;
    Ok(ok(TeamDetail {
        team,
        members,
        member_count,
    }))
}

/// PATCH|PUT /api/teams/{id}: rename or re-describe. Leaders only.
pub async fn update_team(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTeamRequest>,
) -> Result<Reply<Team>, ApiErr> {
    let id = service::parse_id(&id, "team")?;
    let conn = db.conn();
    authorize_in_team(&conn, &id, &user.user_id, Resource::Team, Action::Update(&[]))?;

    let mut v = Validator::new();
    let name = req
        .name
        .as_deref()
        .map(|n| v.required("name", Some(n), TEAM_NAME_MAX));
    let description = v.patch("description", req.description, TEAM_DESCRIPTION_MAX);
    v.finish()?;

    if let Some(built) = db::teams::update(
        &id,
        name.as_deref(),
        description.as_ref().map(|d| d.as_deref()),
    ) {
        sq_execute(&conn, built).map_err(ApiErr::from_db("update team"))?;
    }
    Ok(ok_with(load_team(&conn, &id)?, "Team updated successfully"))
}

/// DELETE /api/teams/{id}: members, team tasks and meetings go with it.
pub async fn delete_team(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<()>, ApiErr> {
    let id = service::parse_id(&id, "team")?;
    let conn = db.conn();
    authorize_in_team(&conn, &id, &user.user_id, Resource::Team, Action::Delete)?;
    sq_execute(&conn, db::teams::delete(&id)).map_err(ApiErr::from_db("delete team"))?;
    tracing::info!("team {id} deleted by {}", user.user_id);
    Ok(done("Team deleted successfully"))
}

/// GET /api/teams/{id}/stats: task counts across the team.
pub async fn team_stats(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<TeamStats>, ApiErr> {
    let id = service::parse_id(&id, "team")?;
    let now = service::now_timestamp();
    let conn = db.conn();
    authorize_in_team(&conn, &id, &user.user_id, Resource::Team, Action::Read)?;
    let stats = sq_query_row(&conn, db::tasks::stats_for_team(&id, &now), |row| {
        Ok(TeamStats {
            team_id: id.clone(),
            total_tasks: row.get(0)?,
            completed_tasks: row.get(1)?,
            todo_tasks: row.get(2)?,
            in_progress_tasks: row.get(3)?,
            overdue_tasks: row.get(4)?,
            members_with_tasks: row.get(5)?,
        })
    })
    .map_err(ApiErr::from_db("team stats"))?;
    Ok(ok(stats))
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// GET /api/teams/{id}/members
pub async fn list_members(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<Vec<TeamMember>>, ApiErr> {
    let id = service::parse_id(&id, "team")?;
    let conn = db.conn();
    authorize_in_team(&conn, &id, &user.user_id, Resource::Team, Action::Read)?;
    Ok(ok(list_members_of(&conn, &id)?))
}

/// What the invitation side effects need once the membership is stored.
struct Invite {
    member: TeamMember,
    team_name: String,
    inviter_name: String,
    invitee_name: String,
    invitee_email: Option<String>,
}

/// Invitees who never signed in have no profile row yet. Confirm them with
/// the identity provider and create the row the membership points at.
async fn create_invitee_profile(state: &AppState, invitee_id: &str) -> Result<(), ApiErr> {
    let email = state.identity.lookup_email(invitee_id).await.map_err(|e| {
        tracing::warn!("invitee lookup for {invitee_id}: {e}");
        ApiErr::unavailable("Identity service unavailable")
    })?;
    let Some(email) = email else {
        return Err(ApiErr::not_found("User not found"));
    };
    let conn = state.db.conn();
    sq_execute(&conn, db::profiles::ensure(invitee_id, Some(&email)))
        .map_err(ApiErr::from_db("create invitee profile"))?;
    tracing::debug!("created profile for invitee {invitee_id}");
    Ok(())
}

/// POST /api/teams/{id}/members: add a user to the team. Leaders only.
///
/// After the membership is stored the invitee gets an in-app notification
/// and an email; neither failure affects the response.
pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> Result<(StatusCode, Reply<TeamMember>), ApiErr> {
    let team_id = service::parse_id(&id, "team")?;
    let invitee_id = req
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiErr::bad_request("User ID is required"))?;
    let invitee_id = service::parse_id(invitee_id, "user")?;
    let role = req.role.unwrap_or(TeamRole::Member);

    let has_profile = {
        let conn = state.db.conn();
        authorize_in_team(
            &conn,
            &team_id,
            &user.user_id,
            Resource::Membership {
                user_id: &invitee_id,
            },
            Action::Create,
        )?;
        load_team(&conn, &team_id)?;
        public_profile(&conn, &invitee_id)?.is_some()
    };
    if !has_profile {
        create_invitee_profile(&state, &invitee_id).await?;
    }

    let invite = {
        let conn = state.db.conn();
        let team = load_team(&conn, &team_id)?;
        let invitee = public_profile(&conn, &invitee_id)?
            .ok_or_else(|| ApiErr::not_found("User not found"))?;

        let member_id = new_id();
        match sq_execute(
            &conn,
            db::teams::member_insert(&member_id, &team_id, &invitee_id, role),
        ) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(ApiErr::conflict("User is already a team member"));
            }
            Err(e) => return Err(ApiErr::from_db("add team member")(e)),
        }

        let inviter_name = display_name(public_profile(&conn, &user.user_id)?.as_ref())
            .or_else(|| user.email.clone())
            .unwrap_or_else(|| "A teammate".into());

        if let Err(e) = notifications::insert(
            &conn,
            &invitee_id,
            NotificationType::TeamInvitation,
            &format!("You've been added to {}", team.name),
            &format!(
                "{inviter_name} added you to {} as a {}",
                team.name,
                role.label()
            ),
            Some(json!({ "team_id": team_id, "role": role, "invited_by": user.user_id })),
        ) {
            tracing::warn!("team invitation notification for {invitee_id}: {e}");
        }

        Invite {
            member: load_member(&conn, &team_id, &member_id)?,
            team_name: team.name,
            inviter_name,
            invitee_name: display_name(Some(&invitee)).unwrap_or_else(|| "there".into()),
            invitee_email: invitee.email,
        }
    };

    let email = match invite.invitee_email.clone() {
        Some(email) => Some(email),
        None => match state.identity.lookup_email(&invitee_id).await {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!("invitee email lookup for {invitee_id}: {e}");
                None
            }
        },
    };
    match email {
        Some(to) => state.mail.enqueue(mailer::team_invitation(&TeamInvitation {
            to: &to,
            recipient_name: &invite.invitee_name,
            team_name: &invite.team_name,
            inviter_name: &invite.inviter_name,
            role,
            app_url: state.config.app_url(),
        })),
        None => tracing::warn!("no email address for {invitee_id}; invitation email skipped"),
    }

    tracing::info!("{invitee_id} added to team {team_id} by {}", user.user_id);
    Ok(created(invite.member, "Member added successfully"))
}

/// PATCH /api/teams/{id}/members/{member_id}: change a member's role.
pub async fn update_member(
    State(db): State<Db>,
    user: AuthUser,
    Path((id, member_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<UpdateMemberRequest>,
) -> Result<Reply<TeamMember>, ApiErr> {
    let team_id = service::parse_id(&id, "team")?;
    let member_id = service::parse_id(&member_id, "member")?;
    let conn = db.conn();
    let member = load_member(&conn, &team_id, &member_id)?;
    authorize_in_team(
        &conn,
        &team_id,
        &user.user_id,
        Resource::Membership {
            user_id: &member.user_id,
        },
        Action::Update(&[]),
    )?;
    sq_execute(&conn, db::teams::member_update_role(&member_id, req.role))
        .map_err(ApiErr::from_db("update team member"))?;
    Ok(ok_with(
        load_member(&conn, &team_id, &member_id)?,
        "Member updated successfully",
    ))
}

/// DELETE /api/teams/{id}/members/{member_id}: leaders remove anyone;
/// members may remove themselves.
pub async fn remove_member(
    State(db): State<Db>,
    user: AuthUser,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Reply<()>, ApiErr> {
    let team_id = service::parse_id(&id, "team")?;
    let member_id = service::parse_id(&member_id, "member")?;
    let conn = db.conn();
    let member = load_member(&conn, &team_id, &member_id)?;
    authorize_in_team(
        &conn,
        &team_id,
        &user.user_id,
        Resource::Membership {
            user_id: &member.user_id,
        },
        Action::Delete,
    )?;
    sq_execute(&conn, db::teams::member_delete(&member_id))
        .map_err(ApiErr::from_db("remove team member"))?;
    Ok(done("Member removed successfully"))
}
