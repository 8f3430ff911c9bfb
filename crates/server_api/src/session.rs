use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use shared::{domain::ConnectionId, error::CommandError};
use tracing::info;

#[derive(Debug, Default)]
struct Sessions {
    by_connection: HashMap<ConnectionId, String>,
    known_users: HashSet<String>,
}

/// Which username each live connection identified as. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    inner: Arc<Mutex<Sessions>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `connection` to `username`, replacing any earlier binding.
    pub fn identify(&self, connection: ConnectionId, username: &str) -> Result<(), CommandError> {
        if username.trim().is_empty() {
            return Err(CommandError::invalid_argument("username not specified"));
        }
        let mut sessions = self.inner.lock();
        let previous = sessions
            .by_connection
            .insert(connection, username.to_string());
        sessions.known_users.insert(username.to_string());
        drop(sessions);

        info!(%connection, %username, previous = ?previous, "user logged in");
        Ok(())
    }

    pub fn current_user(&self, connection: ConnectionId) -> Option<String> {
        self.inner.lock().by_connection.get(&connection).cloned()
    }

    /// Forgets the binding of a closed connection.
    pub fn disconnect(&self, connection: ConnectionId) -> Option<String> {
        self.inner.lock().by_connection.remove(&connection)
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.lock().by_connection.len()
    }

    pub fn is_known(&self, username: &str) -> bool {
        self.inner.lock().known_users.contains(username)
    }
}
