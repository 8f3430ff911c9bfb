use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;

/// A command as it travels on the wire: a kind, string parameters and an
/// optional structured payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CommandMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Value of a parameter, treating blank strings as absent.
    fn required(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Login,
    CreateTopic,
    View,
    CreateVote,
    Vote,
    ViewVote,
    Delete,
    Save,
    Load,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::Login,
        CommandKind::CreateTopic,
        CommandKind::View,
        CommandKind::CreateVote,
        CommandKind::Vote,
        CommandKind::ViewVote,
        CommandKind::Delete,
        CommandKind::Save,
        CommandKind::Load,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Login => "login",
            CommandKind::CreateTopic => "create_topic",
            CommandKind::View => "view",
            CommandKind::CreateVote => "create_vote",
            CommandKind::Vote => "vote",
            CommandKind::ViewVote => "view_vote",
            CommandKind::Delete => "delete",
            CommandKind::Save => "save",
            CommandKind::Load => "load",
        }
    }

    /// Every kind except `login` needs an identified session.
    pub fn requires_identity(self) -> bool {
        self != CommandKind::Login
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = CommandError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == kind)
            .ok_or_else(|| CommandError::UnknownCommand {
                kind: kind.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        username: String,
    },
    CreateTopic {
        topic: String,
    },
    View {
        topic: Option<String>,
    },
    CreateVote {
        topic: String,
        vote_name: String,
        description: String,
        options: Vec<String>,
    },
    Vote {
        topic: String,
        vote: String,
        option: String,
    },
    ViewVote {
        topic: String,
        vote: String,
    },
    Delete {
        topic: String,
        vote: String,
    },
    Save {
        filename: String,
    },
    Load {
        filename: String,
    },
}

impl Command {
    /// Decodes the typed command for an already resolved `kind`. Missing or
    /// blank required fields become `InvalidArgument`.
    pub fn decode(kind: CommandKind, message: &CommandMessage) -> Result<Self, CommandError> {
        let command = match kind {
            CommandKind::Login => Command::Login {
                username: field(message, "username", "username not specified")?,
            },
            CommandKind::CreateTopic => Command::CreateTopic {
                topic: field(message, "topic", "topic name not specified")?,
            },
            CommandKind::View => Command::View {
                topic: message.required("topic").map(str::to_string),
            },
            CommandKind::CreateVote => {
                const MISSING: &str = "not enough parameters to create a poll";
                let topic = field(message, "topic", MISSING)?;
                let vote_name = field(message, "vote_name", MISSING)?;
                let description = field(message, "description", MISSING)?;
                let payload = message
                    .payload
                    .as_ref()
                    .ok_or_else(|| CommandError::invalid_argument(MISSING))?;
                Command::CreateVote {
                    topic,
                    vote_name,
                    description,
                    options: option_labels(payload)?,
                }
            }
            CommandKind::Vote => {
                const MISSING: &str = "not enough parameters to vote";
                Command::Vote {
                    topic: field(message, "topic", MISSING)?,
                    vote: field(message, "vote", MISSING)?,
                    option: field(message, "option", MISSING)?,
                }
            }
            CommandKind::ViewVote => {
                const MISSING: &str = "not enough parameters to view a poll";
                Command::ViewVote {
                    topic: field(message, "topic", MISSING)?,
                    vote: field(message, "vote", MISSING)?,
                }
            }
            CommandKind::Delete => {
                const MISSING: &str = "not enough parameters to delete a poll";
                Command::Delete {
                    topic: field(message, "topic", MISSING)?,
                    vote: field(message, "vote", MISSING)?,
                }
            }
            CommandKind::Save => Command::Save {
                filename: field(message, "filename", "filename not specified")?,
            },
            CommandKind::Load => Command::Load {
                filename: field(message, "filename", "filename not specified")?,
            },
        };
        Ok(command)
    }
}

fn field(message: &CommandMessage, key: &str, missing: &str) -> Result<String, CommandError> {
    message
        .required(key)
        .map(str::to_string)
        .ok_or_else(|| CommandError::invalid_argument(missing))
}

fn option_labels(payload: &Value) -> Result<Vec<String>, CommandError> {
    let expected = || CommandError::invalid_argument("expected a list of options");
    payload
        .as_array()
        .ok_or_else(expected)?
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(expected))
        .collect()
}
