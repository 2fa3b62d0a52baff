//! Workspace access policy.
//!
//! Every handler loads the target resource and the caller's current team role,
//! then asks [`authorize`] whether the action is allowed. Roles are read fresh
//! from storage on each request; nothing in the request body is trusted.

use crate::{ServiceError, TaskField, TeamRole};

/// The authenticated user, plus their role in the team that owns the resource
/// (`None` when they are not a member or the resource is personal).
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub user_id: &'a str,
    pub team_role: Option<TeamRole>,
}

impl<'a> Caller<'a> {
    pub fn personal(user_id: &'a str) -> Self {
        Self {
            user_id,
            team_role: None,
        }
    }

    pub fn in_team(user_id: &'a str, team_role: Option<TeamRole>) -> Self {
        Self { user_id, team_role }
    }

    fn is_member(&self) -> bool {
        self.team_role.is_some()
    }

    fn is_leader(&self) -> bool {
        self.team_role == Some(TeamRole::Leader)
    }
}

/// The thing being accessed, reduced to the fields the policy needs.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// A task. Comments and progress entries are read and created through it.
    Task {
        owner_id: &'a str,
        team_id: Option<&'a str>,
        assigned_to: Option<&'a str>,
    },
    Team,
    Membership { user_id: &'a str },
    Meeting,
    Comment { author_id: &'a str },
    Notification { recipient_id: &'a str },
}

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    Read,
    Create,
    /// Update with the set of fields present in the payload. Only team tasks
    /// distinguish between fields; other resources ignore the list.
    Update(&'a [TaskField]),
    Delete,
    ReportProgress,
}

/// Why an action was refused. Always surfaces as 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotOwner,
    NotMember,
    LeaderOnly(&'static str),
    StatusOnly,
    NotAuthor,
    NotRecipient,
    NotOwnerOrAssignee,
    ProgressOnTasksOnly,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotOwner => "Access denied",
            Self::NotMember => "Not a team member",
            Self::LeaderOnly(msg) => msg,
            Self::StatusOnly => {
                "Team members can only update task status. Full edit permissions are restricted to team leaders."
            }
            Self::NotAuthor => "Only the author can modify this comment",
            Self::NotRecipient => "Notification not accessible",
            Self::NotOwnerOrAssignee => "Only the task owner or assignee can add progress updates",
            Self::ProgressOnTasksOnly => "Progress can only be reported on tasks",
        }
    }
}

impl From<Denial> for ServiceError {
    fn from(d: Denial) -> Self {
        ServiceError::Forbidden(d.message().to_string())
    }
}

/// Decide whether `caller` may perform `action` on `resource`.
pub fn authorize(caller: &Caller<'_>, resource: &Resource<'_>, action: Action<'_>) -> Result<(), Denial> {
    match *resource {
        Resource::Task {
            owner_id,
            team_id: None,
            ..
        } => {
            if caller.user_id == owner_id {
                Ok(())
            } else {
                Err(Denial::NotOwner)
            }
        }
        Resource::Task {
            owner_id,
            team_id: Some(_),
            assigned_to,
        } => {
            if !caller.is_member() {
                return Err(Denial::NotMember);
            }
            match action {
                Action::Read => Ok(()),
                Action::Create => leader(caller, "Only team leaders can create team tasks"),
                Action::Update(fields) => {
                    if caller.is_leader() || fields.iter().all(|f| *f == TaskField::Status) {
                        Ok(())
                    } else {
                        Err(Denial::StatusOnly)
                    }
                }
                Action::Delete => leader(caller, "Only team leaders can delete team tasks"),
                Action::ReportProgress => {
                    if caller.user_id == owner_id || assigned_to == Some(caller.user_id) {
                        Ok(())
                    } else {
                        Err(Denial::NotOwnerOrAssignee)
                    }
                }
            }
        }
        Resource::Team => {
            if !caller.is_member() {
                return Err(Denial::NotMember);
            }
            match action {
                Action::Read => Ok(()),
                Action::Create | Action::Update(_) => {
                    leader(caller, "Only team leaders can update the team")
                }
                Action::Delete => leader(caller, "Only team leaders can delete the team"),
                Action::ReportProgress => Err(Denial::ProgressOnTasksOnly),
            }
        }
        Resource::Membership { user_id } => match action {
            Action::Delete if caller.user_id == user_id && caller.is_member() => Ok(()),
            Action::Delete => {
                if caller.is_leader() {
                    Ok(())
                } else {
                    Err(Denial::LeaderOnly("Insufficient permissions"))
                }
            }
            Action::Read => {
                if caller.is_member() {
                    Ok(())
                } else {
                    Err(Denial::NotMember)
                }
            }
            Action::Create if caller.is_member() => {
                leader(caller, "Only team leaders can add members")
            }
            Action::Update(_) if caller.is_member() => {
                leader(caller, "Only team leaders can manage members")
            }
            Action::Create | Action::Update(_) => Err(Denial::NotMember),
            Action::ReportProgress => Err(Denial::ProgressOnTasksOnly),
        },
        Resource::Meeting => {
            if !caller.is_member() {
                return Err(Denial::NotMember);
            }
            match action {
                Action::Read => Ok(()),
                Action::Create => leader(caller, "Only team leaders can create meetings"),
                Action::Update(_) => leader(caller, "Only team leaders can update meetings"),
                Action::Delete => leader(caller, "Only team leaders can delete meetings"),
                Action::ReportProgress => Err(Denial::ProgressOnTasksOnly),
            }
        }
        Resource::Comment { author_id } => match action {
            Action::Update(_) | Action::Delete if caller.user_id != author_id => {
                Err(Denial::NotAuthor)
            }
            Action::Read | Action::Create | Action::Update(_) | Action::Delete => Ok(()),
            Action::ReportProgress => Err(Denial::ProgressOnTasksOnly),
        },
        Resource::Notification { recipient_id } => match action {
            Action::ReportProgress => Err(Denial::ProgressOnTasksOnly),
            _ if caller.user_id == recipient_id => Ok(()),
            Action::Create => leader(caller, "Only team leaders can notify other members"),
            Action::Read | Action::Update(_) | Action::Delete => Err(Denial::NotRecipient),
        },
    }
}

fn leader(caller: &Caller<'_>, msg: &'static str) -> Result<(), Denial> {
    if caller.is_leader() {
        Ok(())
    } else {
        Err(Denial::LeaderOnly(msg))
    }
}
