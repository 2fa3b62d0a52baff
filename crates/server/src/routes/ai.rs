use axum::extract::State;
use std::sync::Arc;

use taskdeck_api::assistant;
use taskdeck_api::{CategorizeRequest, Categorization, Prioritization, PrioritizeRequest};

use super::{Reply, ok};
use crate::AppState;
use crate::ai::{self as model, AiError, LanguageModel};
use crate::error::{ApiErr, ApiJson};
use crate::routes::auth::AuthUser;

fn configured(state: &AppState) -> Result<Arc<dyn LanguageModel>, ApiErr> {
    state
        .ai
        .clone()
        .ok_or_else(|| ApiErr::unavailable("AI assistant is not configured"))
}

fn failure(context: &'static str) -> impl FnOnce(AiError) -> ApiErr {
    move |e| {
        tracing::error!("{context}: {e}");
        ApiErr::downstream(context, e)
    }
}

/// POST /api/ai/categorize: suggest a category for a task.
pub async fn categorize(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(req): ApiJson<CategorizeRequest>,
) -> Result<Reply<Categorization>, ApiErr> {
    let title = assistant::validate_categorize_title(req.title.as_deref())?;
    let model = configured(&state)?;
    let result = model::categorize(
        model.as_ref(),
        &title,
        req.description.as_deref(),
        req.priority.as_deref(),
    )
    .await
    .map_err(failure("Failed to categorize task"))?;
    Ok(ok(result))
}

/// POST /api/ai/prioritize: order tasks by suggested urgency.
pub async fn prioritize(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(req): ApiJson<PrioritizeRequest>,
) -> Result<Reply<Prioritization>, ApiErr> {
    assistant::validate_prioritize_request(&req)?;
    let model = configured(&state)?;
    let result = model::prioritize(model.as_ref(), &req)
        .await
        .map_err(failure("Failed to prioritize tasks"))?;
    Ok(ok(result))
}
