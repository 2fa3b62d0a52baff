use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;

use taskdeck_api::db;

use crate::error::ApiErr;
use crate::identity::{IdentityError, IdentityProvider};
use crate::storage::{Db, sq_execute};

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Authenticated user extracted from the `Authorization: Bearer <token>` header.
///
/// The first request of a new identity creates its profile row, so every
/// authenticated user id can be referenced by foreign keys.
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Db: FromRef<S>,
    Arc<dyn IdentityProvider>: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiErr::unauthorized("Missing or invalid authorization header"))?;

        let identity = Arc::<dyn IdentityProvider>::from_ref(state);
        let verified = match identity.verify(token).await {
            Ok(id) => id,
            Err(IdentityError::InvalidToken) => {
                return Err(ApiErr::unauthorized("Invalid or expired token"));
            }
            Err(e) => {
                tracing::error!("token verification: {e}");
                return Err(ApiErr::unauthorized("Authentication failed"));
            }
        };

        let db = Db::from_ref(state);
        {
            let conn = db.conn();
            sq_execute(
                &conn,
                db::profiles::ensure(&verified.user_id, verified.email.as_deref()),
            )
            .map_err(ApiErr::from_db("ensure profile"))?;
        }

        Ok(AuthUser {
            user_id: verified.user_id,
            email: verified.email,
        })
    }
}
