//! Database schema, migrations, and query builders.
//!
//! Builders return `(sql, values)` pairs for `SqliteQueryBuilder`; the server
//! binds the values and maps rows positionally, so every `*_columns` helper
//! fixes the column order its row mapper expects.

pub mod comments;
pub mod meetings;
pub mod migrations;
pub mod notifications;
pub mod profiles;
pub mod progress;
pub mod tables;
pub mod tasks;
pub mod teams;

// Re-export tables for convenience
pub use tables::*;

pub type Built = (String, sea_query::Values);

/// Current time in the same format the schema defaults use.
pub(crate) fn now_expr() -> sea_query::SimpleExpr {
    sea_query::Expr::cust("strftime('%Y-%m-%dT%H:%M:%fZ', 'now')")
}
