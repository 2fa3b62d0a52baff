use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use taskdeck_api::db::{self, Built};
use taskdeck_api::{
    Comment, Meeting, Notification, ProgressUpdate, Profile, PublicProfile, Task, Team,
    TeamMember, TeamRole,
};

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    data_dir: PathBuf,
}

impl Db {
    /// Lock the connection. The guard must be dropped before any `.await`.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("taskdeck.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    // Enable WAL mode for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
        data_dir: data_dir.to_path_buf(),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in db::migrations::MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query adapter
// ---------------------------------------------------------------------------

fn bind_values(values: sea_query::Values) -> Vec<SqlValue> {
    use sea_query::Value;

    values
        .0
        .into_iter()
        .map(|v| match v {
            Value::Bool(Some(b)) => SqlValue::Integer(i64::from(b)),
            Value::TinyInt(Some(i)) => SqlValue::Integer(i64::from(i)),
            Value::SmallInt(Some(i)) => SqlValue::Integer(i64::from(i)),
            Value::Int(Some(i)) => SqlValue::Integer(i64::from(i)),
            Value::BigInt(Some(i)) => SqlValue::Integer(i),
            Value::TinyUnsigned(Some(u)) => SqlValue::Integer(i64::from(u)),
            Value::SmallUnsigned(Some(u)) => SqlValue::Integer(i64::from(u)),
            Value::Unsigned(Some(u)) => SqlValue::Integer(i64::from(u)),
            Value::BigUnsigned(Some(u)) => SqlValue::Integer(i64::try_from(u).unwrap_or(i64::MAX)),
            Value::Float(Some(f)) => SqlValue::Real(f64::from(f)),
            Value::Double(Some(f)) => SqlValue::Real(f),
            Value::String(Some(s)) => SqlValue::Text(s.to_string()),
            Value::Char(Some(c)) => SqlValue::Text(c.to_string()),
            Value::Bytes(Some(b)) => SqlValue::Blob(b.to_vec()),
            _ => SqlValue::Null,
        })
        .collect()
}

/// Execute a built statement, returning the number of changed rows.
pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, rusqlite::params_from_iter(bind_values(values)))
}

/// Fetch exactly one row. `QueryReturnedNoRows` when there is none.
pub fn sq_query_row<T>(
    conn: &Connection,
    (sql, values): Built,
    f: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    conn.query_row(&sql, rusqlite::params_from_iter(bind_values(values)), f)
}

/// Fetch at most one row.
pub fn sq_query_opt<T>(
    conn: &Connection,
    built: Built,
    f: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Option<T>> {
    match sq_query_row(conn, built, f) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn sq_query_map<T>(
    conn: &Connection,
    (sql, values): Built,
    f: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bind_values(values)), f)?;
    rows.collect()
}

/// True when `e` is a UNIQUE/PRIMARY KEY violation.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}

// ---------------------------------------------------------------------------
// Lookups shared by several routes
// ---------------------------------------------------------------------------

/// The user's current role in a team, or `None` when they are not a member.
pub fn team_role(conn: &Connection, team_id: &str, user_id: &str) -> rusqlite::Result<Option<TeamRole>> {
    sq_query_opt(conn, db::teams::member_role(team_id, user_id), |row| {
        parse_col::<TeamRole>(row, 0)
    })
}

pub fn count(conn: &Connection, built: Built) -> rusqlite::Result<i64> {
    sq_query_row(conn, built, |row| row.get(0))
}

// ---------------------------------------------------------------------------
// Row mappers (column order fixed by the builders in `taskdeck_api::db`)
// ---------------------------------------------------------------------------

/// Read a TEXT column holding one of the API's snake_case enums.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Optional public profile from a LEFT JOIN starting at column `start`.
fn public_profile_at(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<PublicProfile>> {
    let id: Option<String> = row.get(start)?;
    Ok(match id {
        Some(id) => Some(PublicProfile {
            id,
            email: row.get(start + 1)?,
            full_name: row.get(start + 2)?,
            avatar_url: row.get(start + 3)?,
        }),
        None => None,
    })
}

pub fn public_profile_from_row(row: &Row<'_>) -> rusqlite::Result<PublicProfile> {
    Ok(PublicProfile {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        avatar_url: row.get(3)?,
    })
}

pub fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        bio: row.get(3)?,
        avatar_url: row.get(4)?,
        phone: row.get(5)?,
        location: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        team_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: parse_col(row, 5)?,
        priority: parse_col(row, 6)?,
        category: row.get(7)?,
        due_date: row.get(8)?,
        assigned_to: row.get(9)?,
        assigned_by: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn member_from_row(row: &Row<'_>) -> rusqlite::Result<TeamMember> {
    Ok(TeamMember {
        id: row.get(0)?,
        team_id: row.get(1)?,
        user_id: row.get(2)?,
        role: parse_col(row, 3)?,
        joined_at: row.get(4)?,
        profile: public_profile_at(row, 5)?,
    })
}

pub fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        author: public_profile_at(row, 6)?,
    })
}

pub fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressUpdate> {
    Ok(ProgressUpdate {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        status: row.get(3)?,
        progress_percentage: row.get(4)?,
        blocker: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        author: public_profile_at(row, 8)?,
    })
}

pub fn meeting_from_row(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    Ok(Meeting {
        id: row.get(0)?,
        team_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        scheduled_at: row.get(4)?,
        duration_minutes: row.get(5)?,
        location: row.get(6)?,
        meeting_url: row.get(7)?,
        created_by: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let data: Option<String> = row.get(6)?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_col(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        // Payloads are written by this server as JSON; unreadable ones read as absent.
        data: data.and_then(|d| serde_json::from_str(&d).ok()),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
