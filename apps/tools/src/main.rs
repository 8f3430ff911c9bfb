use std::{fmt::Write as _, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use storage::{read_snapshot, Snapshot};

/// Offline checks for poll server snapshot files.
#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every group, poll, description and tally in a snapshot.
    Inspect { file: PathBuf },
    /// Decode a snapshot and check its invariants.
    Validate { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { file } => {
            let snapshot = read_snapshot(&file)
                .with_context(|| format!("failed to read snapshot '{}'", file.display()))?;
            print!("{}", render(&snapshot));
        }
        Command::Validate { file } => {
            let snapshot = read_snapshot(&file)
                .with_context(|| format!("failed to read snapshot '{}'", file.display()))?;
            snapshot
                .validate()
                .with_context(|| format!("snapshot '{}' is invalid", file.display()))?;
            println!(
                "ok: {} groups, {} polls, {} ballots",
                snapshot.groups.len(),
                snapshot.polls.len(),
                snapshot.total_ballots()
            );
        }
    }

    Ok(())
}

fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "snapshot v{} saved {}",
        snapshot.version,
        snapshot.saved_at.to_rfc3339()
    );

    for group in &snapshot.groups {
        let _ = writeln!(out, "group {} ({} polls)", group.name, group.polls.len());
        for poll in snapshot.polls.iter().filter(|poll| poll.group == group.name) {
            let _ = writeln!(out, "  poll {}: {}", poll.name, poll.description);
            for option in &poll.options {
                let _ = writeln!(out, "    {}: {} votes", option.label, option.count);
            }
            let _ = writeln!(out, "    ballots: {}", poll.ballots.len());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::PollStore;

    #[test]
    fn render_lists_groups_polls_and_tallies() {
        let store = PollStore::new();
        store.create_group("sports").expect("group");
        store.create_group("music").expect("group");
        store
            .create_poll("sports", "finals", "who wins", &["A".into(), "B".into()])
            .expect("poll");
        store
            .cast_vote("sports", "finals", "alice", "B")
            .expect("vote");

        let text = render(&store.snapshot());
        let lines: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "group music (0 polls)",
                "group sports (1 polls)",
                "  poll finals: who wins",
                "    A: 0 votes",
                "    B: 1 votes",
                "    ballots: 1",
            ]
        );
        assert!(text.starts_with("snapshot v1 saved "));
    }
}
