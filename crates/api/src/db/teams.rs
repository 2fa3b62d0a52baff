//! Team + member query builders.

use sea_query::{Alias, Asterisk, Expr, Func, Order, Query, SimpleExpr, SqliteQueryBuilder};

use super::tables::{Profiles, TeamMembers, Teams};
use super::{Built, now_expr};
use crate::TeamRole;

// ── Team columns helper ───────────────────────────────────────────────────

/// Column order must match the server's `team_from_row()`.
fn team_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column((Teams::Table, Teams::Id))
        .column((Teams::Table, Teams::Name))
        .column((Teams::Table, Teams::Description))
        .column((Teams::Table, Teams::CreatedBy))
        .column((Teams::Table, Teams::CreatedAt))
        .column((Teams::Table, Teams::UpdatedAt))
}

// ── Team queries ──────────────────────────────────────────────────────────

/// INSERT a new team.
pub fn insert(id: &str, name: &str, description: Option<&str>, created_by: &str) -> Built {
    Query::insert()
        .into_table(Teams::Table)
        .columns([Teams::Id, Teams::Name, Teams::Description, Teams::CreatedBy])
        .values_panic([
            id.into(),
            name.into(),
            description.map(|s| s.to_string()).into(),
            created_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// SELECT a single team by id.
pub fn get_by_id(id: &str) -> Built {
    let mut q = Query::select().to_owned();
    team_columns(&mut q);
    q.from(Teams::Table)
        .and_where(Expr::col((Teams::Table, Teams::Id)).eq(id))
        .build(SqliteQueryBuilder)
}

/// List teams for a user (via team_members join), with the user's role as
/// the trailing column.
pub fn list_my(user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    team_columns(&mut q);
    q.column((TeamMembers::Table, TeamMembers::Role))
        .from(Teams::Table)
        .inner_join(
            TeamMembers::Table,
            Expr::col((TeamMembers::Table, TeamMembers::TeamId)).equals((Teams::Table, Teams::Id)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::UserId)).eq(user_id))
        .order_by((Teams::Table, Teams::CreatedAt), Order::Desc)
        .build(SqliteQueryBuilder)
}

/// Get a team's name by id.
pub fn get_name(id: &str) -> Built {
    Query::select()
        .column(Teams::Name)
        .from(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Update name and/or description. `None` when nothing changes.
pub fn update(id: &str, name: Option<&str>, description: Option<Option<&str>>) -> Option<Built> {
    let mut values: Vec<(Teams, SimpleExpr)> = Vec::new();
    if let Some(name) = name {
        values.push((Teams::Name, name.into()));
    }
    if let Some(description) = description {
        values.push((Teams::Description, description.map(str::to_string).into()));
    }
    if values.is_empty() {
        return None;
    }
    values.push((Teams::UpdatedAt, now_expr()));
    Some(
        Query::update()
            .table(Teams::Table)
            .values(values)
            .and_where(Expr::col(Teams::Id).eq(id))
            .build(SqliteQueryBuilder),
    )
}

/// DELETE a team (members, team tasks and meetings cascade).
pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Member queries ────────────────────────────────────────────────────────

/// Column order must match the server's `member_from_row()`: membership
/// columns followed by the member's public profile.
fn member_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column((TeamMembers::Table, TeamMembers::Id))
        .column((TeamMembers::Table, TeamMembers::TeamId))
        .column((TeamMembers::Table, TeamMembers::UserId))
        .column((TeamMembers::Table, TeamMembers::Role))
        .column((TeamMembers::Table, TeamMembers::JoinedAt))
        .column((Profiles::Table, Profiles::Id))
        .column((Profiles::Table, Profiles::Email))
        .column((Profiles::Table, Profiles::FullName))
        .column((Profiles::Table, Profiles::AvatarUrl))
}

fn member_select() -> sea_query::SelectStatement {
    let mut q = Query::select().to_owned();
    member_columns(&mut q);
    q.from(TeamMembers::Table)
        .left_join(
            Profiles::Table,
            Expr::col((Profiles::Table, Profiles::Id))
                .equals((TeamMembers::Table, TeamMembers::UserId)),
        )
        .to_owned()
}

/// INSERT a team member.
pub fn member_insert(id: &str, team_id: &str, user_id: &str, role: TeamRole) -> Built {
    Query::insert()
        .into_table(TeamMembers::Table)
        .columns([
            TeamMembers::Id,
            TeamMembers::TeamId,
            TeamMembers::UserId,
            TeamMembers::Role,
        ])
        .values_panic([id.into(), team_id.into(), user_id.into(), role.as_str().into()])
        .build(SqliteQueryBuilder)
}

/// List members of a team, oldest membership first.
pub fn member_list(team_id: &str) -> Built {
    member_select()
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .order_by((TeamMembers::Table, TeamMembers::JoinedAt), Order::Asc)
        .order_by_expr(Expr::cust("\"team_members\".rowid"), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// SELECT a membership row by its id, scoped to the team.
pub fn member_get(team_id: &str, member_id: &str) -> Built {
    member_select()
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::Id)).eq(member_id))
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .build(SqliteQueryBuilder)
}

/// Get a user's role in a team.
pub fn member_role(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .column(TeamMembers::Role)
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Check if a user is a member of a team.
pub fn member_exists(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Member user ids of a team, excluding one user.
pub fn member_ids_except(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .column(TeamMembers::UserId)
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::UserId).ne(user_id))
        .build(SqliteQueryBuilder)
}

/// Change a member's role.
pub fn member_update_role(member_id: &str, role: TeamRole) -> Built {
    Query::update()
        .table(TeamMembers::Table)
        .value(TeamMembers::Role, role.as_str())
        .and_where(Expr::col(TeamMembers::Id).eq(member_id))
        .build(SqliteQueryBuilder)
}

/// Remove a membership row.
pub fn member_delete(member_id: &str) -> Built {
    Query::delete()
        .from_table(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::Id).eq(member_id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_my_appends_role() {
        let (sql, values) = list_my("u1");
        assert!(sql.contains("INNER JOIN \"team_members\""), "{sql}");
        assert!(sql.contains("\"team_members\".\"role\" FROM"), "{sql}");
        assert_eq!(values.0.len(), 1);
    }

    #[test]
    fn member_list_joins_profiles() {
        let (sql, _) = member_list("t1");
        assert!(sql.contains("LEFT JOIN \"profiles\""), "{sql}");
    }

    #[test]
    fn update_without_fields_is_none() {
        assert!(update("t1", None, None).is_none());
        let (sql, _) = update("t1", None, Some(None)).unwrap();
        assert!(sql.contains("\"description\" = NULL") || sql.contains("\"description\" = ?"), "{sql}");
    }
}
