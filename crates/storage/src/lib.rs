use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;
use shared::{
    domain::{GroupListing, GroupSummary, OptionTally, PollResults},
    error::CommandError,
};

mod snapshot;

pub use snapshot::{
    read_snapshot, write_snapshot, BallotRecord, GroupRecord, PollRecord, Snapshot, SnapshotError,
    SNAPSHOT_VERSION,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Poll {
    pub(crate) group: String,
    pub(crate) description: String,
    pub(crate) options: Vec<OptionTally>,
    /// username -> chosen option
    pub(crate) ballots: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StoreState {
    pub(crate) groups: BTreeMap<String, Vec<String>>,
    pub(crate) polls: HashMap<String, Poll>,
}

impl StoreState {
    fn member_poll(&self, group: &str, poll: &str) -> Result<&Poll, CommandError> {
        let members = self
            .groups
            .get(group)
            .ok_or_else(|| CommandError::GroupNotFound {
                group: group.to_string(),
            })?;
        if !members.iter().any(|member| member == poll) {
            return Err(poll_not_found(group, poll));
        }
        self.polls
            .get(poll)
            .ok_or_else(|| poll_not_found(group, poll))
    }

    fn member_poll_mut(&mut self, group: &str, poll: &str) -> Result<&mut Poll, CommandError> {
        self.member_poll(group, poll)?;
        self.polls
            .get_mut(poll)
            .ok_or_else(|| poll_not_found(group, poll))
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            groups: self.groups.len(),
            polls: self.polls.len(),
            ballots: self.polls.values().map(|poll| poll.ballots.len()).sum(),
        }
    }
}

fn poll_not_found(group: &str, poll: &str) -> CommandError {
    CommandError::PollNotFound {
        group: group.to_string(),
        poll: poll.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub groups: usize,
    pub polls: usize,
    pub ballots: usize,
}

/// Groups and polls behind a single lock. Every operation holds it for its
/// whole check-then-act sequence. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct PollStore {
    state: Arc<Mutex<StoreState>>,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_group(&self, name: &str) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        if state.groups.contains_key(name) {
            return Err(CommandError::GroupAlreadyExists {
                group: name.to_string(),
            });
        }
        state.groups.insert(name.to_string(), Vec::new());
        Ok(())
    }

    /// Without a filter lists every group with its poll count, otherwise the
    /// polls of the named group in creation order.
    pub fn list_groups(&self, filter: Option<&str>) -> Result<GroupListing, CommandError> {
        let state = self.state.lock();
        match filter {
            None => Ok(GroupListing::Groups(
                state
                    .groups
                    .iter()
                    .map(|(name, polls)| GroupSummary {
                        name: name.clone(),
                        poll_count: polls.len(),
                    })
                    .collect(),
            )),
            Some(group) => {
                let polls = state
                    .groups
                    .get(group)
                    .ok_or_else(|| CommandError::GroupNotFound {
                        group: group.to_string(),
                    })?;
                Ok(GroupListing::Polls {
                    group: group.to_string(),
                    polls: polls.clone(),
                })
            }
        }
    }

    /// Poll names are unique across all groups, not per group.
    pub fn create_poll(
        &self,
        group: &str,
        poll: &str,
        description: &str,
        options: &[String],
    ) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        if !state.groups.contains_key(group) {
            return Err(CommandError::GroupNotFound {
                group: group.to_string(),
            });
        }
        if state.polls.contains_key(poll) {
            return Err(CommandError::PollAlreadyExists {
                poll: poll.to_string(),
            });
        }
        validate_options(options)?;

        if let Some(members) = state.groups.get_mut(group) {
            members.push(poll.to_string());
        }
        state.polls.insert(
            poll.to_string(),
            Poll {
                group: group.to_string(),
                description: description.to_string(),
                options: options.iter().map(OptionTally::new).collect(),
                ballots: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Records one ballot for `user` and returns the accepted option.
    pub fn cast_vote(
        &self,
        group: &str,
        poll: &str,
        user: &str,
        option: &str,
    ) -> Result<String, CommandError> {
        let mut state = self.state.lock();
        let target = state.member_poll_mut(group, poll)?;
        if target.ballots.contains_key(user) {
            return Err(CommandError::AlreadyVoted);
        }
        let tally = target
            .options
            .iter_mut()
            .find(|tally| tally.label == option)
            .ok_or_else(|| CommandError::InvalidOption {
                option: option.to_string(),
            })?;
        tally.count += 1;
        target.ballots.insert(user.to_string(), option.to_string());
        Ok(option.to_string())
    }

    pub fn view_results(&self, group: &str, poll: &str) -> Result<PollResults, CommandError> {
        let state = self.state.lock();
        let target = state.member_poll(group, poll)?;
        if target.ballots.is_empty() {
            return Ok(PollResults::NoVotes);
        }
        Ok(PollResults::Tally(target.options.clone()))
    }

    pub fn delete_poll(&self, group: &str, poll: &str) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        state.member_poll(group, poll)?;
        if let Some(members) = state.groups.get_mut(group) {
            members.retain(|member| member != poll);
        }
        state.polls.remove(poll);
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats()
    }

    /// Point-in-time copy of the whole store in its persisted shape.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state.lock())
    }

    /// Writes the store to `path`. The lock is held for the whole write so
    /// the file never mixes states from before and after a concurrent
    /// command.
    pub fn save(&self, path: &Path) -> Result<StoreStats, SnapshotError> {
        let state = self.state.lock();
        write_snapshot(path, &Snapshot::capture(&state))?;
        Ok(state.stats())
    }

    /// Replaces the whole store with the contents of `path`. Nothing changes
    /// unless the file reads, decodes and validates completely.
    pub fn load(&self, path: &Path) -> Result<StoreStats, SnapshotError> {
        let mut state = self.state.lock();
        let restored = read_snapshot(path)?.into_state()?;
        *state = restored;
        Ok(state.stats())
    }
}

fn validate_options(options: &[String]) -> Result<(), CommandError> {
    if options.is_empty() {
        return Err(CommandError::invalid_argument("option list is empty"));
    }
    if options.iter().any(|option| option.trim().is_empty()) {
        return Err(CommandError::invalid_argument(
            "option labels must not be blank",
        ));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = options.iter().find(|option| !seen.insert(*option)) {
        return Err(CommandError::invalid_argument(format!(
            "duplicate option \"{duplicate}\""
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
