use axum::extract::{Path, State};

use taskdeck_api::service::{self, USER_SEARCH_LIMIT};
use taskdeck_api::{PublicProfile, UserSearchQuery, db};

use super::{Reply, ok};
use crate::error::{ApiErr, ApiQuery};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, public_profile_from_row, sq_query_map, sq_query_opt};

/// GET /api/users/search?email=: partial email match, caller excluded.
pub async fn search_users(
    State(db): State<Db>,
    user: AuthUser,
    ApiQuery(q): ApiQuery<UserSearchQuery>,
) -> Result<Reply<Vec<PublicProfile>>, ApiErr> {
    let term = service::validate_email_query(q.email.as_deref())?;
    let conn = db.conn();
    let users = sq_query_map(
        &conn,
        db::profiles::search_by_email(&term, &user.user_id, USER_SEARCH_LIMIT),
        public_profile_from_row,
    )
    .map_err(ApiErr::from_db("search users"))?;
    Ok(ok(users))
}

/// GET /api/users/{id}: public profile of any user.
pub async fn get_user(
    State(db): State<Db>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Reply<PublicProfile>, ApiErr> {
    let id = service::parse_id(&id, "user")?;
    let conn = db.conn();
    let profile = sq_query_opt(&conn, db::profiles::get_public(&id), public_profile_from_row)
        .map_err(ApiErr::from_db("load user"))?
        .ok_or_else(|| ApiErr::not_found("User not found"))?;
    Ok(ok(profile))
}
