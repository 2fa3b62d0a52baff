//! Meeting query builders.

use sea_query::{Expr, Order, Query, SimpleExpr, SqliteQueryBuilder};

use super::tables::{Meetings, TeamMembers};
use super::{Built, now_expr};
use crate::UpdateMeetingRequest;
use crate::service::NewMeeting;

/// Column order must match the server's `meeting_from_row()`.
fn meeting_select() -> sea_query::SelectStatement {
    Query::select()
        .column((Meetings::Table, Meetings::Id))
        .column((Meetings::Table, Meetings::TeamId))
        .column((Meetings::Table, Meetings::Title))
        .column((Meetings::Table, Meetings::Description))
        .column((Meetings::Table, Meetings::ScheduledAt))
        .column((Meetings::Table, Meetings::DurationMinutes))
        .column((Meetings::Table, Meetings::Location))
        .column((Meetings::Table, Meetings::MeetingUrl))
        .column((Meetings::Table, Meetings::CreatedBy))
        .column((Meetings::Table, Meetings::CreatedAt))
        .column((Meetings::Table, Meetings::UpdatedAt))
        .from(Meetings::Table)
        .to_owned()
}

/// Filters for `GET /api/meetings`. Listings are always limited to teams the
/// user belongs to.
#[derive(Debug, Clone)]
pub struct MeetingFilter<'a> {
    pub user_id: &'a str,
    pub team_id: Option<&'a str>,
    pub scheduled_after: Option<&'a str>,
    pub scheduled_before: Option<&'a str>,
    pub limit: Option<u32>,
    pub offset: u32,
}

pub fn insert(id: &str, created_by: &str, m: &NewMeeting) -> Built {
    Query::insert()
        .into_table(Meetings::Table)
        .columns([
            Meetings::Id,
            Meetings::TeamId,
            Meetings::Title,
            Meetings::Description,
            Meetings::ScheduledAt,
            Meetings::DurationMinutes,
            Meetings::Location,
            Meetings::MeetingUrl,
            Meetings::CreatedBy,
        ])
        .values_panic([
            id.into(),
            m.team_id.clone().into(),
            m.title.clone().into(),
            m.description.clone().into(),
            m.scheduled_at.clone().into(),
            m.duration_minutes.into(),
            m.location.clone().into(),
            m.meeting_url.clone().into(),
            created_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get_by_id(id: &str) -> Built {
    meeting_select()
        .and_where(Expr::col((Meetings::Table, Meetings::Id)).eq(id))
        .build(SqliteQueryBuilder)
}

/// Meetings of the user's teams, soonest first.
pub fn list(f: &MeetingFilter<'_>) -> Built {
    let mut q = meeting_select();
    q.inner_join(
        TeamMembers::Table,
        Expr::col((TeamMembers::Table, TeamMembers::TeamId))
            .equals((Meetings::Table, Meetings::TeamId)),
    )
    .and_where(Expr::col((TeamMembers::Table, TeamMembers::UserId)).eq(f.user_id));

    if let Some(team_id) = f.team_id {
        q.and_where(Expr::col((Meetings::Table, Meetings::TeamId)).eq(team_id));
    }
    if let Some(after) = f.scheduled_after {
        q.and_where(Expr::col((Meetings::Table, Meetings::ScheduledAt)).gte(after));
    }
    if let Some(before) = f.scheduled_before {
        q.and_where(Expr::col((Meetings::Table, Meetings::ScheduledAt)).lte(before));
    }
    q.order_by((Meetings::Table, Meetings::ScheduledAt), Order::Asc);
    if let Some(limit) = f.limit {
        q.limit(u64::from(limit)).offset(u64::from(f.offset));
    }
    q.build(SqliteQueryBuilder)
}

/// Apply a validated meeting patch. `None` when nothing changes.
pub fn update(id: &str, patch: &UpdateMeetingRequest) -> Option<Built> {
    let mut values: Vec<(Meetings, SimpleExpr)> = Vec::new();
    if let Some(title) = &patch.title {
        values.push((Meetings::Title, title.clone().into()));
    }
    if let Some(description) = &patch.description {
        values.push((Meetings::Description, description.clone().into()));
    }
    if let Some(scheduled_at) = &patch.scheduled_at {
        values.push((Meetings::ScheduledAt, scheduled_at.clone().into()));
    }
    if let Some(minutes) = patch.duration_minutes {
        values.push((Meetings::DurationMinutes, minutes.into()));
    }
    if let Some(location) = &patch.location {
        values.push((Meetings::Location, location.clone().into()));
    }
    if let Some(url) = &patch.meeting_url {
        values.push((Meetings::MeetingUrl, url.clone().into()));
    }
    if values.is_empty() {
        return None;
    }
    values.push((Meetings::UpdatedAt, now_expr()));
    Some(
        Query::update()
            .table(Meetings::Table)
            .values(values)
            .and_where(Expr::col(Meetings::Id).eq(id))
            .build(SqliteQueryBuilder),
    )
}

pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Meetings::Table)
        .and_where(Expr::col(Meetings::Id).eq(id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_scoped_to_membership() {
        let (sql, values) = list(&MeetingFilter {
            user_id: "u1",
            team_id: Some("t1"),
            scheduled_after: Some("2025-01-01T00:00:00Z"),
            scheduled_before: None,
            limit: None,
            offset: 0,
        });
        assert!(sql.contains("INNER JOIN \"team_members\""), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
        assert_eq!(values.0.len(), 3);
    }
}
