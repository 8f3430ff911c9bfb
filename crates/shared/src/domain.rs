use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Issued by the transport, one per accepted connection.
id_newtype!(ConnectionId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub label: String,
    pub count: u64,
}

impl OptionTally {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub name: String,
    pub poll_count: usize,
}

/// Answer of a `view` command: every group, or the polls of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupListing {
    Groups(Vec<GroupSummary>),
    Polls { group: String, polls: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResults {
    NoVotes,
    Tally(Vec<OptionTally>),
}
