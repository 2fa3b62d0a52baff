//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Profiles {
    Table,
    Id,
    Email,
    FullName,
    Bio,
    AvatarUrl,
    Phone,
    Location,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Teams {
    Table,
    Id,
    Name,
    Description,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum TeamMembers {
    Table,
    Id,
    TeamId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(Iden)]
pub enum Tasks {
    Table,
    Id,
    UserId,
    TeamId,
    Title,
    Description,
    Status,
    Priority,
    Category,
    DueDate,
    AssignedTo,
    AssignedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum TaskComments {
    Table,
    Id,
    TaskId,
    UserId,
    Content,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum TaskProgress {
    Table,
    Id,
    TaskId,
    UserId,
    Status,
    ProgressPercentage,
    Blocker,
    Notes,
    CreatedAt,
}

#[derive(Iden)]
pub enum Meetings {
    Table,
    Id,
    TeamId,
    Title,
    Description,
    ScheduledAt,
    DurationMinutes,
    Location,
    MeetingUrl,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Notifications {
    Table,
    Id,
    UserId,
    #[iden = "type"]
    Kind,
    Title,
    Message,
    Read,
    Data,
    CreatedAt,
    UpdatedAt,
}
