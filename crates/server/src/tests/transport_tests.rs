use super::*;

use serde_json::json;
use server_api::ApiContext;
use tokio::{
    io::{DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};

struct Client {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write");
    }

    async fn send(&mut self, message: serde_json::Value) {
        self.send_line(&message.to_string()).await;
    }

    async fn reply(&mut self) -> String {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.expect("read");
        assert!(read > 0, "connection closed before a reply");
        serde_json::from_str(&line).expect("reply is a json string")
    }

    async fn closed(&mut self) -> bool {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.expect("read") == 0
    }
}

fn connect(state: &Arc<AppState>, connection: ConnectionId) -> (Client, JoinHandle<()>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let state = Arc::clone(state);
    let task = tokio::spawn(async move {
        serve(state, connection, server).await.expect("serve");
    });
    let (reader, writer) = tokio::io::split(client);
    (
        Client {
            reader: BufReader::new(reader),
            writer,
        },
        task,
    )
}

fn state_with_limit(max_frame_bytes: usize) -> Arc<AppState> {
    Arc::new(AppState::new(ApiContext::default(), max_frame_bytes))
}

#[tokio::test]
async fn scenario_over_the_wire() {
    let state = state_with_limit(4096);
    let (mut client, _task) = connect(&state, ConnectionId(1));

    client
        .send(json!({ "type": "login", "params": { "username": "alice" } }))
        .await;
    assert_eq!(client.reply().await, "User \"alice\" logged in");

    client
        .send(json!({ "type": "create_topic", "params": { "topic": "sports" } }))
        .await;
    assert_eq!(client.reply().await, "Group \"sports\" created");

    client
        .send(json!({
            "type": "create_vote",
            "params": { "topic": "sports", "vote_name": "finals", "description": "cup" },
            "payload": ["A", "B"]
        }))
        .await;
    assert_eq!(
        client.reply().await,
        "Poll \"finals\" created in group \"sports\""
    );

    let vote = json!({
        "type": "vote",
        "params": { "topic": "sports", "vote": "finals", "option": "A" }
    });
    client.send(vote.clone()).await;
    assert_eq!(client.reply().await, "Vote accepted: A");
    client.send(vote).await;
    assert_eq!(
        client.reply().await,
        "Error: you have already voted in this poll"
    );

    client
        .send(json!({ "type": "view_vote", "params": { "topic": "sports", "vote": "finals" } }))
        .await;
    assert_eq!(client.reply().await, "A: 1 votes\nB: 0 votes");
}

#[tokio::test]
async fn malformed_lines_get_an_error_and_the_connection_stays_open() {
    let state = state_with_limit(4096);
    let (mut client, _task) = connect(&state, ConnectionId(1));

    client.send_line("{ not json").await;
    assert!(client
        .reply()
        .await
        .starts_with("Error: malformed message: "));

    client.send_line("").await;
    client.send(json!({ "type": "view" })).await;
    assert_eq!(client.reply().await, "Error: login required");
}

#[tokio::test]
async fn oversized_frame_is_rejected_and_closes_the_connection() {
    let state = state_with_limit(64);
    let (mut client, task) = connect(&state, ConnectionId(1));

    client.send_line(&"x".repeat(200)).await;
    assert_eq!(client.reply().await, "Error: message exceeds 64 bytes");
    assert!(client.closed().await);
    task.await.expect("serve task");
}

#[tokio::test]
async fn closing_the_stream_ends_the_session() {
    let state = state_with_limit(4096);
    let (mut client, task) = connect(&state, ConnectionId(9));

    client
        .send(json!({ "type": "login", "params": { "username": "alice" } }))
        .await;
    client.reply().await;
    assert_eq!(state.api.sessions.active_sessions(), 1);

    drop(client);
    task.await.expect("serve task");
    assert_eq!(state.api.sessions.active_sessions(), 0);
    assert!(state.api.sessions.is_known("alice"));
}

#[tokio::test]
async fn sessions_are_independent_per_connection() {
    let state = state_with_limit(4096);
    let (mut alice, _a) = connect(&state, state.next_connection_id());
    let (mut anonymous, _b) = connect(&state, state.next_connection_id());

    alice
        .send(json!({ "type": "login", "params": { "username": "alice" } }))
        .await;
    alice.reply().await;

    anonymous
        .send(json!({ "type": "create_topic", "params": { "topic": "sports" } }))
        .await;
    assert_eq!(anonymous.reply().await, "Error: login required");

    anonymous.send(json!({ "type": "shout" })).await;
    assert_eq!(anonymous.reply().await, "Unknown command: shout");
}

#[tokio::test]
async fn largest_possible_limit_still_serves_commands() {
    let state = state_with_limit(usize::MAX);
    let (mut client, _task) = connect(&state, ConnectionId(1));

    client
        .send(json!({ "type": "login", "params": { "username": "alice" } }))
        .await;
    assert_eq!(client.reply().await, "User \"alice\" logged in");
}

#[tokio::test]
async fn frame_of_exactly_the_limit_is_accepted() {
    let frame = json!({ "type": "view" }).to_string();
    let state = state_with_limit(frame.len());
    let (mut client, task) = connect(&state, ConnectionId(1));

    client.send_line(&frame).await;
    assert_eq!(client.reply().await, "Error: login required");

    client.send_line(&format!(" {frame}")).await;
    assert_eq!(
        client.reply().await,
        format!("Error: message exceeds {} bytes", frame.len())
    );
    assert!(client.closed().await);
    task.await.expect("serve task");
}
