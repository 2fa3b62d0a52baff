//! Shared business logic: framework-agnostic pure functions.
//!
//! Route handlers call these to validate and normalize input before any
//! storage access, keeping the handlers as thin adapters.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    CreateMeetingRequest, CreateProgressRequest, CreateTaskRequest, FieldError,
    ServiceError, TaskPriority, TaskStatus, UpdateMeetingRequest, UpdateProfileRequest,
    UpdateTaskRequest,
};

pub const TASK_TITLE_MAX: usize = 200;
pub const TASK_DESCRIPTION_MAX: usize = 2000;
pub const TASK_CATEGORY_MAX: usize = 50;
pub const TEAM_NAME_MAX: usize = 100;
pub const TEAM_DESCRIPTION_MAX: usize = 500;
pub const COMMENT_MAX: usize = 5000;
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_MEETING_MINUTES: i64 = 60;
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
pub const USER_SEARCH_LIMIT: u64 = 10;

// ─── Field collector ────────────────────────────────────────────────────────

/// Accumulates field errors so one response reports every broken field.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Trimmed, non-empty, at most `max` characters.
    pub fn required(&mut self, field: &str, value: Option<&str>, max: usize) -> String {
        let value = value.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            self.fail(field, format!("{field} is required"));
        } else if value.chars().count() > max {
            self.fail(field, format!("{field} must be at most {max} characters"));
        }
        value.to_string()
    }

    /// Trimmed; blank collapses to `None`.
    pub fn optional(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        if value.chars().count() > max {
            self.fail(field, format!("{field} must be at most {max} characters"));
        }
        Some(value.to_string())
    }

    /// Same as [`Validator::optional`] for a nullable patch field.
    pub fn patch(
        &mut self,
        field: &str,
        value: Option<Option<String>>,
        max: usize,
    ) -> Option<Option<String>> {
        value.map(|inner| self.optional(field, inner.as_deref(), max))
    }

    pub fn timestamp(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match normalize_timestamp(value) {
            Some(ts) => Some(ts),
            None => {
                self.fail(field, format!("{field} must be an RFC 3339 date-time"));
                None
            }
        }
    }

    pub fn id(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        if uuid::Uuid::parse_str(value).is_err() {
            self.fail(field, format!("{field} must be a UUID"));
            return None;
        }
        Some(value.to_string())
    }

    pub fn finish(self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self.errors))
        }
    }
}

// ─── Identifiers & time ─────────────────────────────────────────────────────

/// Validate a path identifier. `what` names the entity in the error message.
pub fn parse_id(raw: &str, what: &str) -> Result<String, ServiceError> {
    uuid::Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ServiceError::BadRequest(format!("Invalid {what} ID")))
}

/// Parse an RFC 3339 timestamp and re-render it in UTC at second precision,
/// which keeps stored values lexicographically comparable.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| format_timestamp(dt.with_timezone(&Utc)))
}

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Resolve `limit`/`offset` query values, defaulting the limit to 50.
pub fn resolve_page(limit: Option<u32>, offset: Option<u32>) -> Result<(u32, u32), ServiceError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ServiceError::Validation(vec![FieldError::new(
            "limit",
            format!("limit must be between 1 and {MAX_PAGE_LIMIT}"),
        )]));
    }
    Ok((limit, offset.unwrap_or(0)))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` substring match.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ─── Tasks ──────────────────────────────────────────────────────────────────

/// A validated task ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub team_id: Option<String>,
    pub assigned_to: Option<String>,
}

pub fn validate_new_task(req: CreateTaskRequest) -> Result<NewTask, ServiceError> {
    let mut v = Validator::new();
    let title = v.required("title", Some(req.title.as_str()), TASK_TITLE_MAX);
    let description = v.optional("description", req.description.as_deref(), TASK_DESCRIPTION_MAX);
    let category = v.optional("category", req.category.as_deref(), TASK_CATEGORY_MAX);
    let due_date = v.timestamp("due_date", req.due_date.as_deref());
    let team_id = v.id("team_id", req.team_id.as_deref());
    let assigned_to = req
        .assigned_to
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    v.finish()?;

    Ok(NewTask {
        title,
        description,
        status: req.status.unwrap_or(TaskStatus::Todo),
        priority: req.priority.unwrap_or(TaskPriority::Medium),
        category,
        due_date,
        team_id,
        assigned_to,
    })
}

/// A validated task update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub assigned_to: Option<Option<String>>,
}

/// Trim text, collapse blanks to `null`, canonicalize timestamps. `title`,
/// `status` and `priority` cannot be cleared.
pub fn validate_task_update(req: UpdateTaskRequest) -> Result<TaskPatch, ServiceError> {
    let mut v = Validator::new();
    let title = req
        .title
        .map(|inner| v.required("title", inner.as_deref(), TASK_TITLE_MAX));
    let status = req.status.and_then(|inner| {
        if inner.is_none() {
            v.fail("status", "status cannot be null");
        }
        inner
    });
    let priority = req.priority.and_then(|inner| {
        if inner.is_none() {
            v.fail("priority", "priority cannot be null");
        }
        inner
    });
    let description = v.patch("description", req.description, TASK_DESCRIPTION_MAX);
    let category = v.patch("category", req.category, TASK_CATEGORY_MAX);
    let due_date = req
        .due_date
        .map(|inner| v.timestamp("due_date", inner.as_deref()));
    let assigned_to = req
        .assigned_to
        .map(|inner| inner.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    v.finish()?;

    Ok(TaskPatch {
        title,
        description,
        status,
        priority,
        category,
        due_date,
        assigned_to,
    })
}

// ─── Teams ──────────────────────────────────────────────────────────────────

/// Validate a team name and optional description.
pub fn validate_team(
    name: &str,
    description: Option<&str>,
) -> Result<(String, Option<String>), ServiceError> {
    let mut v = Validator::new();
    let name = v.required("name", Some(name), TEAM_NAME_MAX);
    let description = v.optional("description", description, TEAM_DESCRIPTION_MAX);
    v.finish()?;
    Ok((name, description))
}

// ─── Comments & Progress ────────────────────────────────────────────────────

pub fn validate_comment(content: &str) -> Result<String, ServiceError> {
    let mut v = Validator::new();
    let content = v.required("content", Some(content), COMMENT_MAX);
    v.finish()?;
    Ok(content)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgress {
    pub status: String,
    pub progress_percentage: i64,
    pub blocker: Option<String>,
    pub notes: Option<String>,
}

pub fn validate_progress(req: CreateProgressRequest) -> Result<NewProgress, ServiceError> {
    let mut v = Validator::new();
    let status = v.required("status", Some(req.status.as_str()), 50);
    let progress_percentage = req.progress_percentage.unwrap_or(0);
    if !(0..=100).contains(&progress_percentage) {
        v.fail("progress_percentage", "progress_percentage must be between 0 and 100");
    }
    let blocker = v.optional("blocker", req.blocker.as_deref(), 1000);
    let notes = v.optional("notes", req.notes.as_deref(), TASK_DESCRIPTION_MAX);
    v.finish()?;
    Ok(NewProgress {
        status,
        progress_percentage,
        blocker,
        notes,
    })
}

// ─── Meetings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMeeting {
    pub team_id: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i64,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
}

fn check_duration(v: &mut Validator, minutes: i64) {
    if !(1..=1440).contains(&minutes) {
        v.fail("duration_minutes", "duration_minutes must be between 1 and 1440");
    }
}

pub fn validate_new_meeting(req: CreateMeetingRequest) -> Result<NewMeeting, ServiceError> {
    let mut v = Validator::new();
    let team_id = match req.team_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => v.id("team_id", Some(raw)).unwrap_or_default(),
        None => {
            v.fail("team_id", "team_id is required");
            String::new()
        }
    };
    let title = v.required("title", req.title.as_deref(), TASK_TITLE_MAX);
    let scheduled_at = match req.scheduled_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => v.timestamp("scheduled_at", Some(raw)).unwrap_or_default(),
        None => {
            v.fail("scheduled_at", "scheduled_at is required");
            String::new()
        }
    };
    let duration_minutes = req.duration_minutes.unwrap_or(DEFAULT_MEETING_MINUTES);
    check_duration(&mut v, duration_minutes);
    let description = v.optional("description", req.description.as_deref(), TASK_DESCRIPTION_MAX);
    let location = v.optional("location", req.location.as_deref(), 200);
    let meeting_url = v.optional("meeting_url", req.meeting_url.as_deref(), 500);
    v.finish()?;

    Ok(NewMeeting {
        team_id,
        title,
        description,
        scheduled_at,
        duration_minutes,
        location,
        meeting_url,
    })
}

pub fn validate_meeting_update(
    req: UpdateMeetingRequest,
) -> Result<UpdateMeetingRequest, ServiceError> {
    let mut v = Validator::new();
    let title = req
        .title
        .as_deref()
        .map(|t| v.required("title", Some(t), TASK_TITLE_MAX));
    let scheduled_at = match req.scheduled_at.as_deref() {
        Some(raw) => match normalize_timestamp(raw.trim()) {
            Some(ts) => Some(ts),
            None => {
                v.fail("scheduled_at", "scheduled_at must be an RFC 3339 date-time");
                None
            }
        },
        None => None,
    };
    if let Some(minutes) = req.duration_minutes {
        check_duration(&mut v, minutes);
    }
    let description = v.patch("description", req.description, TASK_DESCRIPTION_MAX);
    let location = v.patch("location", req.location, 200);
    let meeting_url = v.patch("meeting_url", req.meeting_url, 500);
    v.finish()?;

    Ok(UpdateMeetingRequest {
        title,
        description,
        scheduled_at,
        duration_minutes: req.duration_minutes,
        location,
        meeting_url,
    })
}

// ─── Notifications ──────────────────────────────────────────────────────────

pub fn validate_notification(title: &str, message: &str) -> Result<(String, String), ServiceError> {
    let mut v = Validator::new();
    let title = v.required("title", Some(title), TASK_TITLE_MAX);
    let message = v.required("message", Some(message), TASK_DESCRIPTION_MAX);
    v.finish()?;
    Ok((title, message))
}

// ─── Profiles ───────────────────────────────────────────────────────────────

pub fn validate_profile_update(
    req: UpdateProfileRequest,
) -> Result<UpdateProfileRequest, ServiceError> {
    let mut v = Validator::new();
    let full_name = match req.full_name {
        Some(Some(name)) => Some(Some(v.required("full_name", Some(name.as_str()), 100))),
        other => other,
    };
    let bio = v.patch("bio", req.bio, 500);
    let phone = v.patch("phone", req.phone, 20);
    let location = v.patch("location", req.location, 100);
    v.finish()?;
    Ok(UpdateProfileRequest {
        full_name,
        bio,
        phone,
        location,
    })
}

pub fn validate_email_query(email: Option<&str>) -> Result<String, ServiceError> {
    email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| ServiceError::BadRequest("Email query parameter is required".into()))
}

// ─── Avatars ────────────────────────────────────────────────────────────────

pub fn validate_avatar(content_type: &str, len: usize) -> Result<(), ServiceError> {
    if !content_type.starts_with("image/") {
        return Err(ServiceError::BadRequest("Only image files are allowed".into()));
    }
    if len == 0 {
        return Err(ServiceError::BadRequest("No file uploaded".into()));
    }
    if len > MAX_AVATAR_BYTES {
        return Err(ServiceError::BadRequest(
            "File size must be less than 5MB".into(),
        ));
    }
    Ok(())
}

/// File extension for an uploaded avatar: taken from the file name when it
/// has one, otherwise from the image subtype.
pub fn avatar_extension(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    from_name.unwrap_or_else(|| {
        match content_type.trim_start_matches("image/") {
            "jpeg" => "jpg".to_string(),
            "svg+xml" => "svg".to_string(),
            other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphanumeric()) => {
                other.to_string()
            }
            _ => "png".to_string(),
        }
    })
}

/// Storage key for a new avatar object: `{user_id}/{millis}.{ext}`.
pub fn avatar_key(user_id: &str, millis: i64, ext: &str) -> String {
    format!("{user_id}/{millis}.{ext}")
}

/// Recover the storage key (last two path segments) from a public avatar URL.
pub fn avatar_key_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p)?,
        None => path,
    };
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let file = segments.next()?;
    let owner = segments.next()?;
    if !file.contains('.') {
        return None;
    }
    Some(format!("{owner}/{file}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let task = validate_new_task(CreateTaskRequest {
            title: "  Write report ".into(),
            description: Some("   ".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(task.title, "Write report");
        assert_eq!(task.description, None);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
    }

    #[test]
    fn test_new_task_reports_every_field() {
        let err = validate_new_task(CreateTaskRequest {
            title: "x".repeat(201),
            category: Some("c".repeat(51)),
            due_date: Some("tomorrow".into()),
            team_id: Some("not-a-uuid".into()),
            ..Default::default()
        })
        .unwrap_err();
        let fields: Vec<_> = err.details().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "category", "due_date", "team_id"]);
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_task_update_normalizes() {
        let req: UpdateTaskRequest = serde_json::from_str(
            r#"{"category":"  ","due_date":"2025-03-01T10:00:00+02:00","description":null}"#,
        )
        .unwrap();
        let patch = validate_task_update(req).unwrap();
        assert_eq!(patch.category, Some(None));
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.due_date, Some(Some("2025-03-01T08:00:00Z".into())));
        assert_eq!(patch.title, None);
    }

    #[test]
    fn test_task_update_rejects_blank_title() {
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"title":"   "}"#).unwrap();
        assert!(validate_task_update(req).is_err());
    }

    #[test]
    fn test_task_update_rejects_clearing_required_columns() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"title":null,"status":null,"priority":null}"#).unwrap();
        let err = validate_task_update(req).unwrap_err();
        let fields: Vec<_> = err.details().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "status", "priority"]);
    }

    #[test]
    fn test_resolve_page() {
        assert_eq!(resolve_page(None, None).unwrap(), (50, 0));
        assert_eq!(resolve_page(Some(100), Some(20)).unwrap(), (100, 20));
        assert!(resolve_page(Some(0), None).is_err());
        assert!(resolve_page(Some(101), None).is_err());
    }

    #[test]
    fn test_parse_id() {
        assert!(parse_id("3f2b8a9e-7c1d-4e5f-9a0b-1c2d3e4f5a6b", "task").is_ok());
        let err = parse_id("42", "task").unwrap_err();
        assert_eq!(err.message(), "Invalid task ID");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_meeting_requires_core_fields() {
        let err = validate_new_meeting(CreateMeetingRequest::default()).unwrap_err();
        let fields: Vec<_> = err.details().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["team_id", "title", "scheduled_at"]);
    }

    #[test]
    fn test_meeting_defaults_duration() {
        let meeting = validate_new_meeting(CreateMeetingRequest {
            team_id: Some("3f2b8a9e-7c1d-4e5f-9a0b-1c2d3e4f5a6b".into()),
            title: Some("Standup".into()),
            scheduled_at: Some("2025-06-01T09:00:00Z".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(meeting.duration_minutes, 60);
    }

    #[test]
    fn test_progress_bounds() {
        let ok = validate_progress(CreateProgressRequest {
            status: "on_track".into(),
            progress_percentage: None,
            blocker: None,
            notes: Some(" halfway ".into()),
        })
        .unwrap();
        assert_eq!(ok.progress_percentage, 0);
        assert_eq!(ok.notes.as_deref(), Some("halfway"));

        let err = validate_progress(CreateProgressRequest {
            status: String::new(),
            progress_percentage: Some(120),
            blocker: None,
            notes: None,
        })
        .unwrap_err();
        assert_eq!(err.details().len(), 2);
    }

    #[test]
    fn test_profile_update_limits() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"full_name":"","phone":"012345678901234567890"}"#).unwrap();
        let err = validate_profile_update(req).unwrap_err();
        let fields: Vec<_> = err.details().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["full_name", "phone"]);

        let req: UpdateProfileRequest = serde_json::from_str(r#"{"full_name":null}"#).unwrap();
        assert_eq!(validate_profile_update(req).unwrap().full_name, Some(None));
    }

    #[test]
    fn test_avatar_rules() {
        assert!(validate_avatar("image/png", 10).is_ok());
        assert!(validate_avatar("application/pdf", 10).is_err());
        assert!(validate_avatar("image/png", MAX_AVATAR_BYTES + 1).is_err());
        assert_eq!(avatar_extension(Some("me.JPG"), "image/jpeg"), "jpg");
        assert_eq!(avatar_extension(None, "image/jpeg"), "jpg");
        assert_eq!(avatar_extension(Some("blob"), "image/webp"), "webp");
        assert_eq!(avatar_key("u1", 1700, "png"), "u1/1700.png");
    }

    #[test]
    fn test_avatar_key_from_url() {
        assert_eq!(
            avatar_key_from_url("https://cdn.example.com/storage/v1/object/public/avatars/u1/1700.png"),
            Some("u1/1700.png".into())
        );
        assert_eq!(
            avatar_key_from_url("http://localhost:4000/avatars/u1/1700.png?v=2"),
            Some("u1/1700.png".into())
        );
        assert_eq!(avatar_key_from_url("https://example.com/"), None);
    }
}
