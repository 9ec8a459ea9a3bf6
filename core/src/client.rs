//! Client session state

use crate::{Message, Prefix};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Stable handle for a client session, used in all cross-references
pub type SessionId = Uuid;

/// Registration state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, PASS not yet accepted
    AwaitingPassword,
    /// Valid PASS received; NICK/USER may still be missing
    PasswordAccepted,
    /// Fully registered
    Registered,
    /// Marked for teardown; reaped by the server loop
    Disconnecting,
}

/// One client session per TCP connection.
///
/// The session owns its outbound queue: a bounded channel drained by the
/// connection's writer task. The server loop is the only code that touches
/// the rest of the state.
#[derive(Debug)]
pub struct Client {
    /// Session handle
    pub id: SessionId,
    /// Peer host, fixed at accept time
    pub host: String,
    /// Registration state
    pub state: SessionState,
    /// Nickname; empty until NICK succeeds
    pub nick: String,
    /// Username; empty until USER
    pub username: String,
    /// Real name; empty until USER
    pub realname: String,
    /// Away message, if marked away
    pub away_message: Option<String>,
    /// Global operator flag (OPER)
    pub is_operator: bool,
    /// Lowercased names of joined channels
    pub channels: HashSet<String>,
    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,
    /// Last command activity, for WHOIS idle
    pub last_activity: DateTime<Utc>,
    /// Last PONG received, kept for idle timeout bookkeeping
    pub last_pong: Option<DateTime<Utc>>,
    /// Outbound queue feeding the writer task
    sender: mpsc::Sender<String>,
}

impl Client {
    /// Create a new session in the AwaitingPassword state
    pub fn new(id: SessionId, host: String, sender: mpsc::Sender<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            host,
            state: SessionState::AwaitingPassword,
            nick: String::new(),
            username: String::new(),
            realname: String::new(),
            away_message: None,
            is_operator: false,
            channels: HashSet::new(),
            connected_at: now,
            last_activity: now,
            last_pong: None,
            sender,
        }
    }

    /// Queue a message for delivery.
    ///
    /// Queueing never blocks. A full queue means the peer has stopped
    /// reading past the watermark, so the session is marked Disconnecting
    /// and the server loop reaps it.
    pub fn send(&mut self, message: Message) {
        if self.state == SessionState::Disconnecting {
            return;
        }
        match self.sender.try_send(message.to_wire()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("outbound queue full for {}, disconnecting", self.info_string());
                self.state = SessionState::Disconnecting;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.state = SessionState::Disconnecting;
            }
        }
    }

    /// Check if the session is registered
    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Registered
    }

    /// Nickname, or `*` before one has been chosen (numeric reply target)
    pub fn nick_or_star(&self) -> &str {
        if self.nick.is_empty() {
            "*"
        } else {
            &self.nick
        }
    }

    /// Message prefix for lines originating from this client
    pub fn prefix(&self) -> Prefix {
        Prefix::User {
            nick: self.nick.clone(),
            user: self.username.clone(),
            host: self.host.clone(),
        }
    }

    /// Record membership of a channel (by lowercased name); idempotent
    pub fn join_channel(&mut self, channel: String) {
        self.channels.insert(channel);
    }

    /// Drop membership of a channel (by lowercased name); idempotent
    pub fn part_channel(&mut self, channel: &str) {
        self.channels.remove(channel);
    }

    /// Check membership of a channel (by lowercased name)
    pub fn is_on_channel(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Set or clear the away message
    pub fn set_away(&mut self, message: Option<String>) {
        self.away_message = message;
    }

    /// Check if the client is away
    pub fn is_away(&self) -> bool {
        self.away_message.is_some()
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Client description for logs
    pub fn info_string(&self) -> String {
        if self.nick.is_empty() {
            format!("unknown@{}", self.host)
        } else {
            format!("{}!{}@{}", self.nick, self.username, self.host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;

    fn test_client(depth: usize) -> (Client, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(depth);
        let client = Client::new(Uuid::new_v4(), "127.0.0.1".to_string(), tx);
        (client, rx)
    }

    #[test]
    fn test_new_client_state() {
        let (client, _rx) = test_client(8);
        assert_eq!(client.state, SessionState::AwaitingPassword);
        assert!(!client.is_registered());
        assert_eq!(client.nick_or_star(), "*");
        assert!(client.channels.is_empty());
    }

    #[test]
    fn test_send_queues_wire_line() {
        let (mut client, mut rx) = test_client(8);
        client.send(Message::new(Command::Ping, vec!["token".to_string()]));
        assert_eq!(rx.try_recv().unwrap(), "PING token\r\n");
    }

    #[test]
    fn test_full_queue_marks_disconnecting() {
        let (mut client, _rx) = test_client(1);
        client.send(Message::new(Command::Ping, vec!["one".to_string()]));
        assert_eq!(client.state, SessionState::AwaitingPassword);
        client.send(Message::new(Command::Ping, vec!["two".to_string()]));
        assert_eq!(client.state, SessionState::Disconnecting);
    }

    #[test]
    fn test_channel_membership_is_idempotent() {
        let (mut client, _rx) = test_client(8);
        client.join_channel("#foo".to_string());
        client.join_channel("#foo".to_string());
        assert_eq!(client.channels.len(), 1);
        assert!(client.is_on_channel("#foo"));
        client.part_channel("#foo");
        client.part_channel("#foo");
        assert!(!client.is_on_channel("#foo"));
    }
}
