use axum::extract::{Multipart, State};

use taskdeck_api::{AvatarUploadResponse, Profile, UpdateProfileRequest, db, service};

use super::{Reply, done, ok, ok_with};
use crate::AppState;
use crate::error::{ApiErr, ApiJson};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, profile_from_row, sq_execute, sq_query_opt};

fn load(db: &Db, user_id: &str) -> Result<Profile, ApiErr> {
    let conn = db.conn();
    sq_query_opt(&conn, db::profiles::get_by_id(user_id), profile_from_row)
        .map_err(ApiErr::from_db("load profile"))?
        .ok_or_else(|| ApiErr::not_found("Profile not found"))
}

/// GET /api/profile
pub async fn get_profile(State(db): State<Db>, user: AuthUser) -> Result<Reply<Profile>, ApiErr> {
    Ok(ok(load(&db, &user.user_id)?))
}

/// PUT /api/profile: absent fields are kept, `null` clears.
pub async fn update_profile(
    State(db): State<Db>,
    user: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Reply<Profile>, ApiErr> {
    let patch = service::validate_profile_update(req)?;
    if let Some(built) = db::profiles::update(&user.user_id, &patch) {
        let conn = db.conn();
        sq_execute(&conn, built).map_err(ApiErr::from_db("update profile"))?;
    }
    Ok(ok_with(load(&db, &user.user_id)?, "Profile updated successfully"))
}

/// DELETE /api/profile: remove the avatar object, then the identity, then
/// every row the user owns.
pub async fn delete_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Reply<()>, ApiErr> {
    let profile = load(&state.db, &user.user_id)?;

    if let Some(key) = profile.avatar_url.as_deref().and_then(service::avatar_key_from_url) {
        if let Err(e) = state.avatars.remove(&key).await {
            tracing::warn!("avatar cleanup for {}: {e}", user.user_id);
        }
    }

    state
        .identity
        .delete_user(&user.user_id)
        .await
        .map_err(|e| {
            tracing::error!("delete identity {}: {e}", user.user_id);
            ApiErr::downstream("Failed to delete account", e)
        })?;

    {
        let conn = state.db.conn();
        sq_execute(&conn, db::profiles::delete(&user.user_id))
            .map_err(ApiErr::from_db("delete profile"))?;
    }
    tracing::info!("account {} deleted", user.user_id);
    Ok(done("Account deleted successfully"))
}

// ---------------------------------------------------------------------------
// Avatar
// ---------------------------------------------------------------------------

/// POST /api/profile/avatar: multipart field `avatar`, images up to 5 MiB.
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Reply<AvatarUploadResponse>, ApiErr> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("avatar") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some((content_type, file_name, bytes));
        break;
    }
    let (content_type, file_name, bytes) =
        upload.ok_or_else(|| ApiErr::bad_request("No file uploaded"))?;
    service::validate_avatar(&content_type, bytes.len())?;

    let previous = load(&state.db, &user.user_id)?.avatar_url;

    let ext = service::avatar_extension(file_name.as_deref(), &content_type);
    let key = service::avatar_key(&user.user_id, chrono::Utc::now().timestamp_millis(), &ext);
    let url = state
        .avatars
        .put(&key, &content_type, bytes.to_vec())
        .await
        .map_err(|e| {
            tracing::error!("avatar upload for {}: {e}", user.user_id);
            ApiErr::downstream("Failed to upload avatar", e)
        })?;

    {
        let conn = state.db.conn();
        sq_execute(&conn, db::profiles::set_avatar_url(&user.user_id, Some(&url)))
            .map_err(ApiErr::from_db("store avatar url"))?;
    }

    if let Some(old_key) = previous.as_deref().and_then(service::avatar_key_from_url) {
        if old_key != key {
            if let Err(e) = state.avatars.remove(&old_key).await {
                tracing::warn!("old avatar cleanup for {}: {e}", user.user_id);
            }
        }
    }

    Ok(ok_with(
        AvatarUploadResponse {
            avatar_url: url,
            path: key,
        },
        "Avatar uploaded successfully",
    ))
}

/// DELETE /api/profile/avatar
pub async fn delete_avatar(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Reply<()>, ApiErr> {
    let profile = load(&state.db, &user.user_id)?;
    let Some(url) = profile.avatar_url else {
        return Err(ApiErr::not_found("No avatar to delete"));
    };

    if let Some(key) = service::avatar_key_from_url(&url) {
        state.avatars.remove(&key).await.map_err(|e| {
            tracing::error!("avatar delete for {}: {e}", user.user_id);
            ApiErr::downstream("Failed to delete avatar", e)
        })?;
    }

    let conn = state.db.conn();
    sq_execute(&conn, db::profiles::set_avatar_url(&user.user_id, None))
        .map_err(ApiErr::from_db("clear avatar url"))?;
    Ok(done("Avatar deleted successfully"))
}
