//! Task comment query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::tables::{Profiles, TaskComments};
use super::{Built, now_expr};

/// Column order must match the server's `comment_from_row()`: comment
/// columns followed by the author's public profile.
fn comment_select() -> sea_query::SelectStatement {
    Query::select()
        .column((TaskComments::Table, TaskComments::Id))
        .column((TaskComments::Table, TaskComments::TaskId))
        .column((TaskComments::Table, TaskComments::UserId))
        .column((TaskComments::Table, TaskComments::Content))
        .column((TaskComments::Table, TaskComments::CreatedAt))
        .column((TaskComments::Table, TaskComments::UpdatedAt))
        .column((Profiles::Table, Profiles::Id))
        .column((Profiles::Table, Profiles::Email))
        .column((Profiles::Table, Profiles::FullName))
        .column((Profiles::Table, Profiles::AvatarUrl))
        .from(TaskComments::Table)
        .left_join(
            Profiles::Table,
            Expr::col((Profiles::Table, Profiles::Id))
                .equals((TaskComments::Table, TaskComments::UserId)),
        )
        .to_owned()
}

pub fn insert(id: &str, task_id: &str, user_id: &str, content: &str) -> Built {
    Query::insert()
        .into_table(TaskComments::Table)
        .columns([
            TaskComments::Id,
            TaskComments::TaskId,
            TaskComments::UserId,
            TaskComments::Content,
        ])
        .values_panic([id.into(), task_id.into(), user_id.into(), content.into()])
        .build(SqliteQueryBuilder)
}

pub fn get_by_id(id: &str) -> Built {
    comment_select()
        .and_where(Expr::col((TaskComments::Table, TaskComments::Id)).eq(id))
        .build(SqliteQueryBuilder)
}

/// Comments on a task, oldest first.
pub fn list_for_task(task_id: &str) -> Built {
    comment_select()
        .and_where(Expr::col((TaskComments::Table, TaskComments::TaskId)).eq(task_id))
        .order_by((TaskComments::Table, TaskComments::CreatedAt), Order::Asc)
        .order_by_expr(Expr::cust("\"task_comments\".rowid"), Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn update_content(id: &str, content: &str) -> Built {
    Query::update()
        .table(TaskComments::Table)
        .value(TaskComments::Content, content)
        .value(TaskComments::UpdatedAt, now_expr())
        .and_where(Expr::col(TaskComments::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(TaskComments::Table)
        .and_where(Expr::col(TaskComments::Id).eq(id))
        .build(SqliteQueryBuilder)
}
