//! Task query builders.

use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, LikeExpr, Order, Query, SimpleExpr,
    SqliteQueryBuilder,
};

use super::tables::Tasks;
use super::{Built, now_expr};
use crate::service::{NewTask, TaskPatch, like_pattern};
use crate::{OrderDirection, TaskOrderBy, TaskPriority, TaskStatus};

/// Which tasks a listing covers.
#[derive(Debug, Clone, Copy)]
pub enum TaskScope<'a> {
    /// The caller's own tasks that belong to no team.
    Personal { user_id: &'a str },
    Team { team_id: &'a str },
}

/// Normalized filters for `GET /api/tasks`.
#[derive(Debug, Clone)]
pub struct TaskFilter<'a> {
    pub scope: TaskScope<'a>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<&'a str>,
    pub due_before: Option<&'a str>,
    pub due_after: Option<&'a str>,
    pub search: Option<&'a str>,
    pub limit: u32,
    pub offset: u32,
    pub order_by: TaskOrderBy,
    pub direction: OrderDirection,
}

/// Result of building a paginated task list query.
pub struct BuiltTaskList {
    pub count_query: Built,
    pub select_query: Built,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Column order must match the server's `task_from_row()`.
fn task_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column((Tasks::Table, Tasks::Id))
        .column((Tasks::Table, Tasks::UserId))
        .column((Tasks::Table, Tasks::TeamId))
        .column((Tasks::Table, Tasks::Title))
        .column((Tasks::Table, Tasks::Description))
        .column((Tasks::Table, Tasks::Status))
        .column((Tasks::Table, Tasks::Priority))
        .column((Tasks::Table, Tasks::Category))
        .column((Tasks::Table, Tasks::DueDate))
        .column((Tasks::Table, Tasks::AssignedTo))
        .column((Tasks::Table, Tasks::AssignedBy))
        .column((Tasks::Table, Tasks::CreatedAt))
        .column((Tasks::Table, Tasks::UpdatedAt))
}

fn order(direction: OrderDirection) -> Order {
    match direction {
        OrderDirection::Asc => Order::Asc,
        OrderDirection::Desc => Order::Desc,
    }
}

/// Rank priorities by urgency rather than alphabetically.
fn priority_rank() -> SimpleExpr {
    Expr::cust(
        "CASE \"tasks\".\"priority\" WHEN 'low' THEN 0 WHEN 'medium' THEN 1 \
         WHEN 'high' THEN 2 ELSE 3 END",
    )
}

fn filter_condition(f: &TaskFilter<'_>) -> Condition {
    let mut cond = Cond::all();
    match f.scope {
        TaskScope::Personal { user_id } => {
            cond = cond
                .add(Expr::col((Tasks::Table, Tasks::UserId)).eq(user_id))
                .add(Expr::col((Tasks::Table, Tasks::TeamId)).is_null());
        }
        TaskScope::Team { team_id } => {
            cond = cond.add(Expr::col((Tasks::Table, Tasks::TeamId)).eq(team_id));
        }
    }
    if let Some(status) = f.status {
        cond = cond.add(Expr::col((Tasks::Table, Tasks::Status)).eq(status.as_str()));
    }
    if let Some(priority) = f.priority {
        cond = cond.add(Expr::col((Tasks::Table, Tasks::Priority)).eq(priority.as_str()));
    }
    if let Some(category) = f.category {
        cond = cond.add(Expr::col((Tasks::Table, Tasks::Category)).eq(category));
    }
    if let Some(before) = f.due_before {
        cond = cond.add(Expr::col((Tasks::Table, Tasks::DueDate)).lte(before));
    }
    if let Some(after) = f.due_after {
        cond = cond.add(Expr::col((Tasks::Table, Tasks::DueDate)).gte(after));
    }
    if let Some(term) = f.search {
        let pattern = like_pattern(term);
        cond = cond.add(
            Cond::any()
                .add(
                    Expr::col((Tasks::Table, Tasks::Title))
                        .like(LikeExpr::new(pattern.clone()).escape('\\')),
                )
                .add(
                    Expr::col((Tasks::Table, Tasks::Description))
                        .like(LikeExpr::new(pattern).escape('\\')),
                ),
        );
    }
    cond
}

// ── Queries ────────────────────────────────────────────────────────────────

/// INSERT a new task. `assigned_by` is recorded only alongside an assignee.
pub fn insert(id: &str, user_id: &str, task: &NewTask, assigned_by: Option<&str>) -> Built {
    Query::insert()
        .into_table(Tasks::Table)
        .columns([
            Tasks::Id,
            Tasks::UserId,
            Tasks::TeamId,
            Tasks::Title,
            Tasks::Description,
            Tasks::Status,
            Tasks::Priority,
            Tasks::Category,
            Tasks::DueDate,
            Tasks::AssignedTo,
            Tasks::AssignedBy,
        ])
        .values_panic([
            id.into(),
            user_id.into(),
            task.team_id.clone().into(),
            task.title.clone().into(),
            task.description.clone().into(),
            task.status.as_str().into(),
            task.priority.as_str().into(),
            task.category.clone().into(),
            task.due_date.clone().into(),
            task.assigned_to.clone().into(),
            task.assigned_to
                .as_ref()
                .and(assigned_by)
                .map(str::to_string)
                .into(),
        ])
        .build(SqliteQueryBuilder)
}

/// SELECT a single task by id.
pub fn get_by_id(id: &str) -> Built {
    let mut q = Query::select().to_owned();
    task_columns(&mut q);
    q.from(Tasks::Table)
        .and_where(Expr::col((Tasks::Table, Tasks::Id)).eq(id))
        .build(SqliteQueryBuilder)
}

/// Build the count + page queries for a filtered task listing.
pub fn list(f: &TaskFilter<'_>) -> BuiltTaskList {
    let cond = filter_condition(f);

    let count_query = Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(Tasks::Table)
        .cond_where(cond.clone())
        .build(SqliteQueryBuilder);

    let mut q = Query::select().to_owned();
    task_columns(&mut q);
    q.from(Tasks::Table).cond_where(cond);
    let dir = order(f.direction);
    match f.order_by {
        TaskOrderBy::CreatedAt => q.order_by((Tasks::Table, Tasks::CreatedAt), dir.clone()),
        TaskOrderBy::UpdatedAt => q.order_by((Tasks::Table, Tasks::UpdatedAt), dir.clone()),
        TaskOrderBy::DueDate => q.order_by((Tasks::Table, Tasks::DueDate), dir.clone()),
        TaskOrderBy::Priority => q.order_by_expr(priority_rank(), dir.clone()),
    };
    let select_query = q
        .order_by_expr(Expr::cust("\"tasks\".rowid"), dir)
        .limit(u64::from(f.limit))
        .offset(u64::from(f.offset))
        .build(SqliteQueryBuilder);

    BuiltTaskList {
        count_query,
        select_query,
    }
}

/// UPDATE the fields present in `patch`. Returns `None` when there is nothing
/// to change. Changing the assignee records `assigned_by`.
pub fn update(id: &str, patch: &TaskPatch, assigned_by: &str) -> Option<Built> {
    let mut values: Vec<(Tasks, SimpleExpr)> = Vec::new();
    if let Some(title) = &patch.title {
        values.push((Tasks::Title, title.clone().into()));
    }
    if let Some(description) = &patch.description {
        values.push((Tasks::Description, description.clone().into()));
    }
    if let Some(status) = patch.status {
        values.push((Tasks::Status, status.as_str().into()));
    }
    if let Some(priority) = patch.priority {
        values.push((Tasks::Priority, priority.as_str().into()));
    }
    if let Some(category) = &patch.category {
        values.push((Tasks::Category, category.clone().into()));
    }
    if let Some(due_date) = &patch.due_date {
        values.push((Tasks::DueDate, due_date.clone().into()));
    }
    if let Some(assigned_to) = &patch.assigned_to {
        values.push((Tasks::AssignedTo, assigned_to.clone().into()));
        let by = assigned_to.as_ref().map(|_| assigned_by.to_string());
        values.push((Tasks::AssignedBy, by.into()));
    }
    if values.is_empty() {
        return None;
    }
    values.push((Tasks::UpdatedAt, now_expr()));

    Some(
        Query::update()
            .table(Tasks::Table)
            .values(values)
            .and_where(Expr::col(Tasks::Id).eq(id))
            .build(SqliteQueryBuilder),
    )
}

/// DELETE a task (comments and progress cascade).
pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Tasks::Table)
        .and_where(Expr::col(Tasks::Id).eq(id))
        .build(SqliteQueryBuilder)
}

// ── Aggregates ─────────────────────────────────────────────────────────────

const STATS_COLUMNS: &str = "COUNT(*), \
     COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0), \
     COALESCE(SUM(CASE WHEN status = 'todo' THEN 1 ELSE 0 END), 0), \
     COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0), \
     COALESCE(SUM(CASE WHEN due_date IS NOT NULL AND due_date < ?1 \
         AND status NOT IN ('completed', 'archived') THEN 1 ELSE 0 END), 0)";

/// Counts over tasks the user owns or is assigned. `now` is an RFC 3339 UTC
/// timestamp used for the overdue check.
pub fn stats_for_user(user_id: &str, now: &str) -> Built {
    (
        format!("SELECT {STATS_COLUMNS} FROM tasks WHERE user_id = ?2 OR assigned_to = ?2"),
        sea_query::Values(vec![now.into(), user_id.into()]),
    )
}

/// Counts over a team's tasks, plus the number of distinct assignees.
pub fn stats_for_team(team_id: &str, now: &str) -> Built {
    (
        format!(
            "SELECT {STATS_COLUMNS}, COUNT(DISTINCT assigned_to) FROM tasks WHERE team_id = ?2"
        ),
        sea_query::Values(vec![now.into(), team_id.into()]),
    )
}
