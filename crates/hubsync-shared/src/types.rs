use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SharedError;

/// Kind of conversation on the remote network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Single,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Group => "group",
        }
    }
}

impl FromStr for ChatType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "group" => Ok(Self::Group),
            other => Err(SharedError::UnknownChatType(other.to_string())),
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pagination direction relative to a cursor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Newer items than the cursor.
    After,
    /// Older items than the cursor.
    Before,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::After => "after",
            Self::Before => "before",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "after" => Ok(Self::After),
            "before" => Ok(Self::Before),
            other => Err(SharedError::UnknownDirection(other.to_string())),
        }
    }
}

/// Which side of the conversation sent a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageSide {
    User,
    Them,
}

impl MessageSide {
    pub fn from_is_sender(is_from_user: bool) -> Self {
        if is_from_user {
            Self::User
        } else {
            Self::Them
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Them => "them",
        }
    }
}

impl FromStr for MessageSide {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "them" => Ok(Self::Them),
            other => Err(SharedError::UnknownMessageSide(other.to_string())),
        }
    }
}

/// Delivery state of a locally stored message.
///
/// Everything fetched from the hub is `Sent`; `Sending` and `Failed` only
/// exist for optimistic inserts made by the send path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Sending,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Sending => "sending",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "sending" => Ok(Self::Sending),
            "failed" => Ok(Self::Failed),
            other => Err(SharedError::UnknownMessageStatus(other.to_string())),
        }
    }
}

/// Chat list filters offered to the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatFilter {
    Unreplied,
    Unread,
    #[default]
    All,
    Archived,
}

impl FromStr for ChatFilter {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreplied" => Ok(Self::Unreplied),
            "unread" => Ok(Self::Unread),
            "all" => Ok(Self::All),
            "archived" => Ok(Self::Archived),
            other => Err(SharedError::UnknownChatFilter(other.to_string())),
        }
    }
}
