use std::sync::atomic::{AtomicU64, Ordering};

use server_api::ApiContext;
use shared::domain::ConnectionId;

pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) max_frame_bytes: usize,
    next_connection: AtomicU64,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, max_frame_bytes: usize) -> Self {
        Self {
            api,
            max_frame_bytes,
            next_connection: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }
}
