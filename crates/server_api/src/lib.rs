use std::path::{Component, Path, PathBuf};

use shared::{
    domain::{ConnectionId, GroupListing, PollResults},
    error::{CommandError, ErrorCode},
    protocol::{Command, CommandKind, CommandMessage},
};
use storage::PollStore;
use tracing::{debug, error, info, warn};

mod session;

pub use session::SessionTable;

/// Where client-supplied snapshot file names end up on disk.
#[derive(Debug, Clone, Default)]
pub struct SnapshotLocator {
    dir: Option<PathBuf>,
}

impl SnapshotLocator {
    /// File names are used exactly as the client sent them.
    pub fn anywhere() -> Self {
        Self::default()
    }

    /// File names must be bare names and resolve inside `dir`.
    pub fn within(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Whether client file names are kept inside a snapshot directory.
    pub fn is_confined(&self) -> bool {
        self.dir.is_some()
    }

    pub fn resolve(&self, filename: &str) -> Result<PathBuf, CommandError> {
        let Some(dir) = &self.dir else {
            return Ok(PathBuf::from(filename));
        };
        let name = Path::new(filename);
        let mut components = name.components();
        let bare = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !bare || filename.contains(['/', '\\']) {
            return Err(CommandError::invalid_argument(
                "filename must not contain path separators",
            ));
        }
        Ok(dir.join(name))
    }
}

/// Everything a command needs: sessions, the poll store and the snapshot
/// location. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ApiContext {
    pub sessions: SessionTable,
    pub store: PollStore,
    pub snapshots: SnapshotLocator,
}

impl ApiContext {
    pub fn new(snapshots: SnapshotLocator) -> Self {
        Self {
            snapshots,
            ..Self::default()
        }
    }

    /// Runs one command for `connection` and returns the text to send back.
    pub fn dispatch(&self, connection: ConnectionId, message: &CommandMessage) -> String {
        match self.execute(connection, message) {
            Ok(reply) => reply,
            Err(err) => {
                if err.code() == ErrorCode::UnknownCommand {
                    warn!(%connection, kind = %message.kind, "unknown command");
                } else {
                    debug!(%connection, kind = %message.kind, code = ?err.code(), "command rejected");
                }
                err.to_string()
            }
        }
    }

    /// Resolves the kind, applies the login gate before looking at any
    /// parameter, then decodes and runs the command.
    pub fn execute(
        &self,
        connection: ConnectionId,
        message: &CommandMessage,
    ) -> Result<String, CommandError> {
        let kind: CommandKind = message.kind.parse()?;
        let session = self.sessions.current_user(connection);
        if kind.requires_identity() && session.is_none() {
            return Err(CommandError::NotIdentified);
        }

        let user = session.as_deref();
        let identified = || user.ok_or(CommandError::NotIdentified);
        match Command::decode(kind, message)? {
            Command::Login { username } => login(self, connection, &username),
            Command::CreateTopic { topic } => create_group(self, identified()?, &topic),
            Command::View { topic } => list_groups(self, identified()?, topic.as_deref()),
            Command::CreateVote {
                topic,
                vote_name,
                description,
                options,
            } => create_poll(
                self,
                identified()?,
                &topic,
                &vote_name,
                &description,
                &options,
            ),
            Command::Vote {
                topic,
                vote,
                option,
            } => cast_vote(self, identified()?, &topic, &vote, &option),
            Command::ViewVote { topic, vote } => view_results(self, identified()?, &topic, &vote),
            Command::Delete { topic, vote } => delete_poll(self, identified()?, &topic, &vote),
            Command::Save { filename } => save_snapshot(self, identified()?, &filename),
            Command::Load { filename } => load_snapshot(self, identified()?, &filename),
        }
    }
}

pub fn login(
    ctx: &ApiContext,
    connection: ConnectionId,
    username: &str,
) -> Result<String, CommandError> {
    ctx.sessions.identify(connection, username)?;
    Ok(format!("User \"{username}\" logged in"))
}

pub fn create_group(ctx: &ApiContext, user: &str, topic: &str) -> Result<String, CommandError> {
    ctx.store.create_group(topic)?;
    info!(%user, group = %topic, "group created");
    Ok(format!("Group \"{topic}\" created"))
}

pub fn list_groups(
    ctx: &ApiContext,
    user: &str,
    topic: Option<&str>,
) -> Result<String, CommandError> {
    let listing = ctx.store.list_groups(topic)?;
    debug!(%user, group = ?topic, "listing groups");
    Ok(render_listing(&listing))
}

pub fn create_poll(
    ctx: &ApiContext,
    user: &str,
    topic: &str,
    vote_name: &str,
    description: &str,
    options: &[String],
) -> Result<String, CommandError> {
    ctx.store
        .create_poll(topic, vote_name, description, options)?;
    info!(%user, group = %topic, poll = %vote_name, options = options.len(), "poll created");
    Ok(format!("Poll \"{vote_name}\" created in group \"{topic}\""))
}

pub fn cast_vote(
    ctx: &ApiContext,
    user: &str,
    topic: &str,
    vote: &str,
    option: &str,
) -> Result<String, CommandError> {
    let accepted = ctx.store.cast_vote(topic, vote, user, option)?;
    debug!(%user, group = %topic, poll = %vote, option = %accepted, "vote accepted");
    Ok(format!("Vote accepted: {accepted}"))
}

pub fn view_results(
    ctx: &ApiContext,
    user: &str,
    topic: &str,
    vote: &str,
) -> Result<String, CommandError> {
    let results = ctx.store.view_results(topic, vote)?;
    debug!(%user, group = %topic, poll = %vote, "viewing results");
    Ok(render_results(vote, &results))
}

pub fn delete_poll(
    ctx: &ApiContext,
    user: &str,
    topic: &str,
    vote: &str,
) -> Result<String, CommandError> {
    ctx.store.delete_poll(topic, vote)?;
    info!(%user, group = %topic, poll = %vote, "poll deleted");
    Ok(format!("Poll \"{vote}\" deleted from group \"{topic}\""))
}

pub fn save_snapshot(ctx: &ApiContext, user: &str, filename: &str) -> Result<String, CommandError> {
    let path = ctx.snapshots.resolve(filename)?;
    let stats = ctx.store.save(&path).map_err(|err| {
        error!(%user, path = %path.display(), error = %err, "failed to save snapshot");
        CommandError::SaveFailed {
            cause: err.to_string(),
        }
    })?;
    info!(
        %user,
        path = %path.display(),
        groups = stats.groups,
        polls = stats.polls,
        ballots = stats.ballots,
        "snapshot saved"
    );
    Ok(format!("Data saved to file: {filename}"))
}

pub fn load_snapshot(ctx: &ApiContext, user: &str, filename: &str) -> Result<String, CommandError> {
    let path = ctx.snapshots.resolve(filename)?;
    let stats = ctx.store.load(&path).map_err(|err| {
        error!(%user, path = %path.display(), error = %err, "failed to load snapshot");
        CommandError::LoadFailed {
            cause: err.to_string(),
        }
    })?;
    info!(
        %user,
        path = %path.display(),
        groups = stats.groups,
        polls = stats.polls,
        ballots = stats.ballots,
        "snapshot loaded"
    );
    Ok(format!("Data loaded from file: {filename}"))
}

pub fn render_listing(listing: &GroupListing) -> String {
    match listing {
        GroupListing::Groups(groups) if groups.is_empty() => "No groups yet".to_string(),
        GroupListing::Groups(groups) => {
            let lines: Vec<String> = groups
                .iter()
                .map(|group| format!("- {} ({} polls)", group.name, group.poll_count))
                .collect();
            format!("Groups:\n{}", lines.join("\n"))
        }
        GroupListing::Polls { group, polls } if polls.is_empty() => {
            format!("No polls in group \"{group}\"")
        }
        GroupListing::Polls { group, polls } => {
            let lines: Vec<String> = polls.iter().map(|poll| format!("- {poll}")).collect();
            format!("Polls in group \"{group}\":\n{}", lines.join("\n"))
        }
    }
}

/// One `<label>: <count> votes` line per option, in creation order.
pub fn render_results(poll: &str, results: &PollResults) -> String {
    match results {
        PollResults::NoVotes => format!("No votes yet for poll \"{poll}\""),
        PollResults::Tally(tally) => tally
            .iter()
            .map(|option| format!("{}: {} votes", option.label, option.count))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
