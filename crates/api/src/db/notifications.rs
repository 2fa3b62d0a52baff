//! Notification query builders. Every statement is scoped to the recipient.

use sea_query::{Alias, Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::tables::Notifications;
use super::{Built, now_expr};
use crate::NotificationType;

/// Column order must match the server's `notification_from_row()`.
fn notification_select() -> sea_query::SelectStatement {
    Query::select()
        .columns([
            Notifications::Id,
            Notifications::UserId,
            Notifications::Kind,
            Notifications::Title,
            Notifications::Message,
            Notifications::Read,
            Notifications::Data,
            Notifications::CreatedAt,
            Notifications::UpdatedAt,
        ])
        .from(Notifications::Table)
        .to_owned()
}

/// Parameters for inserting a notification.
pub struct InsertParams<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub kind: NotificationType,
    pub title: &'a str,
    pub message: &'a str,
    /// Serialized JSON payload.
    pub data: Option<String>,
}

pub fn insert(p: InsertParams<'_>) -> Built {
    Query::insert()
        .into_table(Notifications::Table)
        .columns([
            Notifications::Id,
            Notifications::UserId,
            Notifications::Kind,
            Notifications::Title,
            Notifications::Message,
            Notifications::Data,
        ])
        .values_panic([
            p.id.into(),
            p.user_id.into(),
            p.kind.as_str().into(),
            p.title.into(),
            p.message.into(),
            p.data.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// By id alone; callers check the recipient before exposing the row.
pub fn get(id: &str) -> Built {
    notification_select()
        .and_where(Expr::col(Notifications::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Newest first, optionally filtered by read state.
pub fn list(user_id: &str, read: Option<bool>) -> Built {
    let mut q = notification_select();
    q.and_where(Expr::col(Notifications::UserId).eq(user_id));
    if let Some(read) = read {
        q.and_where(Expr::col(Notifications::Read).eq(read));
    }
    q.order_by(Notifications::CreatedAt, Order::Desc)
        .order_by_expr(Expr::cust("rowid"), Order::Desc)
        .build(SqliteQueryBuilder)
}

pub fn unread_count(user_id: &str) -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(Notifications::Table)
        .and_where(Expr::col(Notifications::UserId).eq(user_id))
        .and_where(Expr::col(Notifications::Read).eq(false))
        .build(SqliteQueryBuilder)
}

pub fn set_read(id: &str, user_id: &str, read: bool) -> Built {
    Query::update()
        .table(Notifications::Table)
        .value(Notifications::Read, read)
        .value(Notifications::UpdatedAt, now_expr())
        .and_where(Expr::col(Notifications::Id).eq(id))
        .and_where(Expr::col(Notifications::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

pub fn mark_all_read(user_id: &str) -> Built {
    Query::update()
        .table(Notifications::Table)
        .value(Notifications::Read, true)
        .value(Notifications::UpdatedAt, now_expr())
        .and_where(Expr::col(Notifications::UserId).eq(user_id))
        .and_where(Expr::col(Notifications::Read).eq(false))
        .build(SqliteQueryBuilder)
}

pub fn delete(id: &str, user_id: &str) -> Built {
    Query::delete()
        .from_table(Notifications::Table)
        .and_where(Expr::col(Notifications::Id).eq(id))
        .and_where(Expr::col(Notifications::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_write_and_listing_is_recipient_scoped() {
        for (sql, _) in [
            list("u", Some(false)),
            unread_count("u"),
            set_read("n", "u", true),
            mark_all_read("u"),
            delete("n", "u"),
        ] {
            assert!(sql.contains("\"user_id\" = ?"), "{sql}");
        }
    }

    #[test]
    fn get_looks_up_by_id_only() {
        let (sql, values) = get("n");
        assert!(sql.contains("\"id\" = ?"), "{sql}");
        assert!(!sql.contains("\"user_id\" = ?"), "{sql}");
        assert_eq!(values.0.len(), 1);
    }
}
