//! Wire commands and notifications of the `user` topic.

use serde::{Deserialize, Serialize};

use userhub_core::UserId;

use crate::User;

/// Topic every user command and notification is addressed to.
pub const TOPIC: &str = "user";

/// Commands accepted on the `user` topic, tagged by `cmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum UserCommand {
    #[serde(rename = "GET")]
    Get { id: UserId },

    #[serde(rename = "CREATE")]
    Create {
        email: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },

    #[serde(rename = "GET.all")]
    GetAll,

    #[serde(rename = "SET.email")]
    SetEmail { id: UserId, email: String },

    #[serde(rename = "SET.username")]
    SetUsername { id: UserId, username: String },

    #[serde(rename = "DELETE")]
    Delete { id: UserId },
}

impl UserCommand {
    /// Wire name of the command (`cmd` field).
    pub fn name(&self) -> &'static str {
        match self {
            UserCommand::Get { .. } => "GET",
            UserCommand::Create { .. } => "CREATE",
            UserCommand::GetAll => "GET.all",
            UserCommand::SetEmail { .. } => "SET.email",
            UserCommand::SetUsername { .. } => "SET.username",
            UserCommand::Delete { .. } => "DELETE",
        }
    }
}

/// Body of a `DELETED` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedUser {
    pub id: UserId,
}

/// Notifications published after a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum UserNotification {
    #[serde(rename = "CREATED")]
    Created { user: User },

    #[serde(rename = "DELETED")]
    Deleted { user: DeletedUser },
}

impl UserNotification {
    pub fn name(&self) -> &'static str {
        match self {
            UserNotification::Created { .. } => "CREATED",
            UserNotification::Deleted { .. } => "DELETED",
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            UserNotification::Created { user } => user.id,
            UserNotification::Deleted { user } => user.id,
        }
    }
}
