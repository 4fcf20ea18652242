//! Roles and command permissions.

use crate::message::Command;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a connected surface is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The console of the authority process itself
    Local,
    Admin,
    Operator,
    Monitor,
}

impl Role {
    /// Whether this role may issue `command`.
    pub fn can(&self, command: &Command) -> bool {
        match self {
            Self::Local | Self::Admin => true,
            Self::Operator => !matches!(
                command,
                Command::Browse { .. }
                    | Command::DevTools { .. }
                    | Command::CreateInvite { .. }
                    | Command::DeleteToken { .. }
            ),
            Self::Monitor => matches!(
                command,
                Command::SetViewBlurred { .. } | Command::SetStreamCensored { .. }
            ),
        }
    }

    /// Whether state snapshots for this role include token listings.
    pub fn sees_tokens(&self) -> bool {
        matches!(self, Self::Local | Self::Admin)
    }

    /// Whether this role can be handed out through an invite.
    pub fn is_grantable(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Monitor => "monitor",
        };
        f.write_str(name)
    }
}
