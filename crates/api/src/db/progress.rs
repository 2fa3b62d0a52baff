//! Task progress query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{Profiles, TaskProgress};
use crate::service::NewProgress;

/// Column order must match the server's `progress_from_row()`.
fn progress_select() -> sea_query::SelectStatement {
    Query::select()
        .column((TaskProgress::Table, TaskProgress::Id))
        .column((TaskProgress::Table, TaskProgress::TaskId))
        .column((TaskProgress::Table, TaskProgress::UserId))
        .column((TaskProgress::Table, TaskProgress::Status))
        .column((TaskProgress::Table, TaskProgress::ProgressPercentage))
        .column((TaskProgress::Table, TaskProgress::Blocker))
        .column((TaskProgress::Table, TaskProgress::Notes))
        .column((TaskProgress::Table, TaskProgress::CreatedAt))
        .column((Profiles::Table, Profiles::Id))
        .column((Profiles::Table, Profiles::Email))
        .column((Profiles::Table, Profiles::FullName))
        .column((Profiles::Table, Profiles::AvatarUrl))
        .from(TaskProgress::Table)
        .left_join(
            Profiles::Table,
            Expr::col((Profiles::Table, Profiles::Id))
                .equals((TaskProgress::Table, TaskProgress::UserId)),
        )
        .to_owned()
}

pub fn insert(id: &str, task_id: &str, user_id: &str, entry: &NewProgress) -> Built {
    Query::insert()
        .into_table(TaskProgress::Table)
        .columns([
            TaskProgress::Id,
            TaskProgress::TaskId,
            TaskProgress::UserId,
            TaskProgress::Status,
            TaskProgress::ProgressPercentage,
            TaskProgress::Blocker,
            TaskProgress::Notes,
        ])
        .values_panic([
            id.into(),
            task_id.into(),
            user_id.into(),
            entry.status.clone().into(),
            entry.progress_percentage.into(),
            entry.blocker.clone().into(),
            entry.notes.clone().into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn get_by_id(id: &str) -> Built {
    progress_select()
        .and_where(Expr::col((TaskProgress::Table, TaskProgress::Id)).eq(id))
        .build(SqliteQueryBuilder)
}

/// Progress history of a task, newest first.
pub fn list_for_task(task_id: &str) -> Built {
    progress_select()
        .and_where(Expr::col((TaskProgress::Table, TaskProgress::TaskId)).eq(task_id))
        .order_by((TaskProgress::Table, TaskProgress::CreatedAt), Order::Desc)
        .order_by_expr(Expr::cust("\"task_progress\".rowid"), Order::Desc)
        .build(SqliteQueryBuilder)
}
