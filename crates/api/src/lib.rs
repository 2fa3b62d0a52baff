//! Shared API types for taskdeck.
//!
//! This crate is the single source of truth for all API request/response types,
//! the workspace access policy, and validation rules. The Axum server depends on
//! it with the `backend` feature for token helpers and SQL builders.

use serde::{Deserialize, Deserializer, Serialize};

pub mod assistant;
pub mod policy;
pub mod service;

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Error returned when a string does not name a variant of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `Display`, `FromStr` and `ALL` for a snake_case wire enum.
macro_rules! wire_enum {
    ($name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Archived,
}

wire_enum!(TaskStatus, "task status" {
    Todo => "todo",
    InProgress => "in_progress",
    Completed => "completed",
    Archived => "archived",
});

/// Task priority, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

wire_enum!(TaskPriority, "task priority" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// Role of a user within a team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Leader,
    Member,
}

wire_enum!(TeamRole, "team role" {
    Leader => "leader",
    Member => "member",
});

impl TeamRole {
    /// Human-readable label used in invitation emails.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Leader => "Team Leader",
            Self::Member => "Team Member",
        }
    }
}

/// Kind of an in-app notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TeamInvitation,
    TaskAssigned,
    TaskComment,
    TaskCompleted,
    MeetingScheduled,
    MeetingReminder,
    TeamUpdate,
    General,
}

wire_enum!(NotificationType, "notification type" {
    TeamInvitation => "team_invitation",
    TaskAssigned => "task_assigned",
    TaskComment => "task_comment",
    TaskCompleted => "task_completed",
    MeetingScheduled => "meeting_scheduled",
    MeetingReminder => "meeting_reminder",
    TeamUpdate => "team_update",
    General => "general",
});

/// Which task workspace a listing targets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Workspace {
    #[default]
    Personal,
    Team,
}

wire_enum!(Workspace, "workspace" {
    Personal => "personal",
    Team => "team",
});

/// Sortable task columns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrderBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
}

wire_enum!(TaskOrderBy, "task order" {
    CreatedAt => "created_at",
    UpdatedAt => "updated_at",
    DueDate => "due_date",
    Priority => "priority",
});

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

wire_enum!(OrderDirection, "order direction" {
    Asc => "asc",
    Desc => "desc",
});

/// Task columns a client may change through `PUT /api/tasks/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Title,
    Description,
    Status,
    Priority,
    Category,
    DueDate,
    AssignedTo,
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// ─── Response Envelope ───────────────────────────────────────────────────────

/// Success envelope: `{ success, data?, message?, pagination?, workspace? }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
            workspace: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Envelope carrying only a message (deletions, bulk updates).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            pagination: None,
            workspace: None,
        }
    }
}

/// Error envelope: `{ success: false, error, details? }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

/// One failed validation rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

// ─── Profiles & Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// The subset of a profile other users may see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicProfile {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// `PUT /api/profile`. Absent fields are untouched, `null` clears.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub full_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvatarUploadResponse {
    pub avatar_url: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub email: Option<String>,
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub team_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub team_id: Option<String>,
    pub assigned_to: Option<String>,
}

/// `PUT /api/tasks/{id}`. Unknown keys are rejected and every field keeps
/// "sent as null" apart from "absent", so the field set the policy sees is
/// exactly the set of keys the client sent.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTaskRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub status: Option<Option<TaskStatus>>,
    #[serde(default, deserialize_with = "nullable")]
    pub priority: Option<Option<TaskPriority>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<String>>,
}

impl UpdateTaskRequest {
    /// Keys present in the payload, `null` included, in declaration order.
    pub fn fields(&self) -> Vec<TaskField> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push(TaskField::Title);
        }
        if self.description.is_some() {
            fields.push(TaskField::Description);
        }
        if self.status.is_some() {
            fields.push(TaskField::Status);
        }
        if self.priority.is_some() {
            fields.push(TaskField::Priority);
        }
        if self.category.is_some() {
            fields.push(TaskField::Category);
        }
        if self.due_date.is_some() {
            fields.push(TaskField::DueDate);
        }
        if self.assigned_to.is_some() {
            fields.push(TaskField::AssignedTo);
        }
        fields
    }
}

/// Query string of `GET /api/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub workspace: Option<Workspace>,
    pub team_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub due_before: Option<String>,
    pub due_after: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Option<TaskOrderBy>,
    pub order_direction: Option<OrderDirection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub todo_tasks: i64,
    pub in_progress_tasks: i64,
    pub overdue_tasks: i64,
}

// ─── Comments & Progress ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub author: Option<PublicProfile>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub status: String,
    pub progress_percentage: i64,
    pub blocker: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub author: Option<PublicProfile>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProgressRequest {
    #[serde(default)]
    pub status: String,
    pub progress_percentage: Option<i64>,
    pub blocker: Option<String>,
    pub notes: Option<String>,
}

// ─── Teams ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A team as listed for one of its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSummary {
    #[serde(flatten)]
    pub team: Team,
    pub role: TeamRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub role: TeamRole,
    pub joined_at: String,
    pub profile: Option<PublicProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<TeamMember>,
    pub member_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTeamRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Option<String>,
    pub role: Option<TeamRole>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: TeamRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamStats {
    pub team_id: String,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub todo_tasks: i64,
    pub in_progress_tasks: i64,
    pub overdue_tasks: i64,
    pub members_with_tasks: i64,
}

// ─── Meetings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub team_id: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i64,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateMeetingRequest {
    pub team_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_at: Option<String>,
    pub duration_minutes: Option<i64>,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMeetingRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub scheduled_at: Option<String>,
    pub duration_minutes: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub meeting_url: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MeetingListQuery {
    pub team_id: Option<String>,
    pub scheduled_after: Option<String>,
    pub scheduled_before: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub data: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// `POST /api/notifications`. Without `user_id` the caller notifies themselves;
/// notifying someone else requires `team_id` of a team the caller leads.
#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    #[serde(rename = "type", default = "default_notification_type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<serde_json::Value>,
}

fn default_notification_type() -> NotificationType {
    NotificationType::General
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    pub read: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub read: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

// ─── AI Assistant ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CategorizeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Categorization {
    pub category: String,
    pub confidence: u8,
    pub reasoning: String,
}

/// A task as submitted for prioritization. Fields default to empty so that
/// incomplete entries are reported by index instead of failing to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizationTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    pub category: Option<String>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub past_behavior: Option<String>,
    pub preferences: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizeRequest {
    #[serde(default)]
    pub tasks: Vec<PrioritizationTask>,
    pub user_context: Option<UserContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedTask {
    pub task_id: String,
    pub recommended_order: u32,
    pub score: u8,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prioritization {
    pub prioritized_tasks: Vec<PrioritizedTask>,
    pub summary: String,
}

// ─── Health ──────────────────────────────────────────────────────────────────

/// Counters of the background mail queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailStats {
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub mail: MailStats,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code. Both the server routes and the
/// policy layer produce this type; the server wraps it in its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Validation(Vec<FieldError>),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(_) => "Validation failed",
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => m,
        }
    }

    /// Field-level details (only for validation failures).
    pub fn details(&self) -> &[FieldError] {
        match self {
            Self::Validation(details) => details,
            _ => &[],
        }
    }

    /// Build a closure that wraps a DB/IO error as `Internal`.
    pub fn from_db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Self::Internal(format!("{context}: {e}"))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}
