use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::OptionTally;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::{Poll, StoreState};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed snapshot: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

impl SnapshotError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub groups: Vec<GroupRecord>,
    pub polls: Vec<PollRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub polls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRecord {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub description: String,
    pub options: Vec<OptionTally>,
    #[serde(default)]
    pub ballots: Vec<BallotRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRecord {
    pub user: String,
    pub option: String,
}

impl Snapshot {
    pub(crate) fn capture(state: &StoreState) -> Self {
        let groups = state
            .groups
            .iter()
            .map(|(name, polls)| GroupRecord {
                name: name.clone(),
                polls: polls.clone(),
            })
            .collect();

        // Follow group order so the file diffs cleanly between saves.
        let polls = state
            .groups
            .values()
            .flatten()
            .filter_map(|name| state.polls.get(name).map(|poll| (name, poll)))
            .map(|(name, poll)| {
                let mut ballots: Vec<BallotRecord> = poll
                    .ballots
                    .iter()
                    .map(|(user, option)| BallotRecord {
                        user: user.clone(),
                        option: option.clone(),
                    })
                    .collect();
                ballots.sort_by(|a, b| a.user.cmp(&b.user));
                PollRecord {
                    name: name.clone(),
                    group: poll.group.clone(),
                    description: poll.description.clone(),
                    options: poll.options.clone(),
                    ballots,
                }
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            groups,
            polls,
        }
    }

    pub fn total_ballots(&self) -> usize {
        self.polls.iter().map(|poll| poll.ballots.len()).sum()
    }

    /// Checks every store invariant: unique names, group membership and
    /// poll ownership agree, and tallies match the ballot records.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        self.clone().into_state().map(|_| ())
    }

    pub(crate) fn into_state(self) -> Result<StoreState, SnapshotError> {
        let mut state = StoreState::default();

        for group in self.groups {
            if state.groups.contains_key(&group.name) {
                return Err(SnapshotError::Inconsistent(format!(
                    "group \"{}\" appears twice",
                    group.name
                )));
            }
            state.groups.insert(group.name, group.polls);
        }

        for record in self.polls {
            if state.polls.contains_key(&record.name) {
                return Err(SnapshotError::Inconsistent(format!(
                    "poll \"{}\" appears twice",
                    record.name
                )));
            }
            let listed = state
                .groups
                .get(&record.group)
                .is_some_and(|members| members.contains(&record.name));
            if !listed {
                return Err(SnapshotError::Inconsistent(format!(
                    "poll \"{}\" is not listed in group \"{}\"",
                    record.name, record.group
                )));
            }
            let poll = poll_from_record(&record).map_err(SnapshotError::Inconsistent)?;
            state.polls.insert(record.name, poll);
        }

        let mut listed = HashSet::new();
        for (group, members) in &state.groups {
            for member in members {
                if !listed.insert(member) {
                    return Err(SnapshotError::Inconsistent(format!(
                        "poll \"{member}\" is listed twice"
                    )));
                }
                let owned = state
                    .polls
                    .get(member)
                    .is_some_and(|poll| &poll.group == group);
                if !owned {
                    return Err(SnapshotError::Inconsistent(format!(
                        "group \"{group}\" lists unknown poll \"{member}\""
                    )));
                }
            }
        }

        Ok(state)
    }
}

fn poll_from_record(record: &PollRecord) -> Result<Poll, String> {
    if record.options.is_empty() {
        return Err(format!("poll \"{}\" has no options", record.name));
    }

    let mut expected: HashMap<&str, u64> = HashMap::new();
    for tally in &record.options {
        if expected.insert(tally.label.as_str(), tally.count).is_some() {
            return Err(format!(
                "poll \"{}\" repeats option \"{}\"",
                record.name, tally.label
            ));
        }
    }

    let mut ballots = HashMap::new();
    let mut counted: HashMap<&str, u64> = HashMap::new();
    for ballot in &record.ballots {
        if !expected.contains_key(ballot.option.as_str()) {
            return Err(format!(
                "ballot of \"{}\" in poll \"{}\" names unknown option \"{}\"",
                ballot.user, record.name, ballot.option
            ));
        }
        if ballots
            .insert(ballot.user.clone(), ballot.option.clone())
            .is_some()
        {
            return Err(format!(
                "user \"{}\" has two ballots in poll \"{}\"",
                ballot.user, record.name
            ));
        }
        *counted.entry(ballot.option.as_str()).or_default() += 1;
    }

    for tally in &record.options {
        let recorded = counted.get(tally.label.as_str()).copied().unwrap_or(0);
        if recorded != tally.count {
            return Err(format!(
                "option \"{}\" of poll \"{}\" counts {} votes but {} ballots name it",
                tally.label, record.name, tally.count, recorded
            ));
        }
    }

    Ok(Poll {
        group: record.group.clone(),
        description: record.description.clone(),
        options: record.options.clone(),
        ballots,
    })
}

/// Reads and decodes a snapshot file. Only the format version is checked;
/// call [`Snapshot::validate`] for the store invariants.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let file = File::open(path).map_err(|source| SnapshotError::io(path, source))?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: snapshot.version,
        });
    }
    Ok(snapshot)
}

/// Writes `snapshot` to a temporary file next to `path` and renames it into
/// place, so an interrupted write never truncates an existing snapshot.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(|source| SnapshotError::io(path, source))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer
            .write_all(b"\n")
            .map_err(|source| SnapshotError::io(path, source))?;
        writer
            .flush()
            .map_err(|source| SnapshotError::io(path, source))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|source| SnapshotError::io(path, source))?;
    temp.persist(path)
        .map_err(|err| SnapshotError::io(path, err.error))?;
    Ok(())
}
