//! Profile query builders.

use sea_query::{Expr, LikeExpr, Order, Query, SimpleExpr, SqliteQueryBuilder};

use super::tables::Profiles;
use super::{Built, now_expr};
use crate::UpdateProfileRequest;
use crate::service::like_pattern;

/// Column order must match the server's `profile_from_row()`.
fn profile_select() -> sea_query::SelectStatement {
    Query::select()
        .columns([
            Profiles::Id,
            Profiles::Email,
            Profiles::FullName,
            Profiles::Bio,
            Profiles::AvatarUrl,
            Profiles::Phone,
            Profiles::Location,
            Profiles::CreatedAt,
            Profiles::UpdatedAt,
        ])
        .from(Profiles::Table)
        .to_owned()
}

/// Create the profile for a newly seen identity; refresh its email otherwise.
pub fn ensure(id: &str, email: Option<&str>) -> Built {
    (
        "INSERT INTO profiles (id, email) VALUES (?1, ?2) \
         ON CONFLICT (id) DO UPDATE SET email = COALESCE(excluded.email, profiles.email)"
            .to_string(),
        sea_query::Values(vec![id.into(), email.map(str::to_string).into()]),
    )
}

pub fn get_by_id(id: &str) -> Built {
    profile_select()
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Public fields (id, email, full_name, avatar_url) of one user.
pub fn get_public(id: &str) -> Built {
    Query::select()
        .columns([
            Profiles::Id,
            Profiles::Email,
            Profiles::FullName,
            Profiles::AvatarUrl,
        ])
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Partial, case-insensitive email match, excluding the searcher.
pub fn search_by_email(term: &str, exclude_id: &str, limit: u64) -> Built {
    Query::select()
        .columns([
            Profiles::Id,
            Profiles::Email,
            Profiles::FullName,
            Profiles::AvatarUrl,
        ])
        .from(Profiles::Table)
        .and_where(Expr::col(Profiles::Email).like(LikeExpr::new(like_pattern(term)).escape('\\')))
        .and_where(Expr::col(Profiles::Id).ne(exclude_id))
        .order_by(Profiles::Email, Order::Asc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

/// Apply a validated profile patch. `None` when nothing changes.
pub fn update(id: &str, patch: &UpdateProfileRequest) -> Option<Built> {
    let mut values: Vec<(Profiles, SimpleExpr)> = Vec::new();
    if let Some(full_name) = &patch.full_name {
        values.push((Profiles::FullName, full_name.clone().into()));
    }
    if let Some(bio) = &patch.bio {
        values.push((Profiles::Bio, bio.clone().into()));
    }
    if let Some(phone) = &patch.phone {
        values.push((Profiles::Phone, phone.clone().into()));
    }
    if let Some(location) = &patch.location {
        values.push((Profiles::Location, location.clone().into()));
    }
    if values.is_empty() {
        return None;
    }
    values.push((Profiles::UpdatedAt, now_expr()));
    Some(
        Query::update()
            .table(Profiles::Table)
            .values(values)
            .and_where(Expr::col(Profiles::Id).eq(id))
            .build(SqliteQueryBuilder),
    )
}

pub fn set_avatar_url(id: &str, avatar_url: Option<&str>) -> Built {
    Query::update()
        .table(Profiles::Table)
        .value(Profiles::AvatarUrl, avatar_url.map(str::to_string))
        .value(Profiles::UpdatedAt, now_expr())
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// DELETE a profile (owned rows cascade).
pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Profiles::Table)
        .and_where(Expr::col(Profiles::Id).eq(id))
        .build(SqliteQueryBuilder)
}
