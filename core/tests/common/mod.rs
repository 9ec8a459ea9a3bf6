//! Shared harness for server integration tests
//!
//! Sessions are attached through the same API the accept path uses, backed
//! by plain channels instead of sockets, so tests drive the dispatcher
//! directly and read exactly what a connected client would.

#![allow(dead_code)]

use oxircd_core::{Config, Server, SessionId};
use tokio::sync::mpsc;

pub const PASSWORD: &str = "secret";

pub struct TestClient {
    pub id: SessionId,
    rx: mpsc::Receiver<String>,
}

impl TestClient {
    /// Collect everything queued for this client, terminators stripped
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line.trim_end().to_string());
        }
        lines
    }

    /// Drain and keep only the three-digit reply codes, in order
    pub fn drain_codes(&mut self) -> Vec<String> {
        self.drain()
            .iter()
            .filter_map(|line| line.split(' ').nth(1).map(str::to_string))
            .collect()
    }
}

pub struct TestServer {
    pub server: Server,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let server = Server::new(config, PASSWORD.to_string()).unwrap();
        Self { server }
    }

    /// Attach a session with the default outbound queue depth
    pub fn connect(&mut self) -> TestClient {
        self.connect_with_queue(64)
    }

    /// Attach a session with a specific outbound queue depth
    pub fn connect_with_queue(&mut self, depth: usize) -> TestClient {
        let (tx, rx) = mpsc::channel(depth);
        let id = self.server.attach_session("127.0.0.1".to_string(), tx);
        TestClient { id, rx }
    }

    pub async fn send(&mut self, client: &TestClient, line: &str) {
        self.server.handle_line(client.id, line).await;
    }

    /// Run the PASS/NICK/USER handshake and discard the welcome block
    pub async fn register(&mut self, client: &mut TestClient, nick: &str) {
        self.send(client, &format!("PASS {}", PASSWORD)).await;
        self.send(client, &format!("NICK {}", nick)).await;
        self.send(client, &format!("USER {} 0 * :{}", nick, nick))
            .await;
        client.drain();
    }
}
