use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotIdentified,
    InvalidArgument,
    AlreadyExists,
    NotFound,
    AlreadyVoted,
    InvalidOption,
    IoFailure,
    UnknownCommand,
}

/// A rejected command. The `Display` output is the exact text sent back to
/// the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Error: login required")]
    NotIdentified,
    #[error("Error: {0}")]
    InvalidArgument(String),
    #[error("Error: group \"{group}\" already exists")]
    GroupAlreadyExists { group: String },
    #[error("Error: poll \"{poll}\" already exists")]
    PollAlreadyExists { poll: String },
    #[error("Error: group \"{group}\" not found")]
    GroupNotFound { group: String },
    #[error("Error: poll \"{poll}\" not found in group \"{group}\"")]
    PollNotFound { group: String, poll: String },
    #[error("Error: you have already voted in this poll")]
    AlreadyVoted,
    #[error("Error: invalid option \"{option}\"")]
    InvalidOption { option: String },
    #[error("Error: failed to save data: {cause}")]
    SaveFailed { cause: String },
    #[error("Error: failed to load data: {cause}")]
    LoadFailed { cause: String },
    #[error("Unknown command: {kind}")]
    UnknownCommand { kind: String },
}

impl CommandError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotIdentified => ErrorCode::NotIdentified,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::GroupAlreadyExists { .. } | Self::PollAlreadyExists { .. } => {
                ErrorCode::AlreadyExists
            }
            Self::GroupNotFound { .. } | Self::PollNotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyVoted => ErrorCode::AlreadyVoted,
            Self::InvalidOption { .. } => ErrorCode::InvalidOption,
            Self::SaveFailed { .. } | Self::LoadFailed { .. } => ErrorCode::IoFailure,
            Self::UnknownCommand { .. } => ErrorCode::UnknownCommand,
        }
    }
}
