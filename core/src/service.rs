//! Virtual clients
//!
//! A virtual client is a server-side participant that answers to a nickname
//! without owning a socket. Extensions such as bots register one and receive
//! the PRIVMSGs addressed to their nick; whatever they return is delivered
//! back from their prefix. They run inside the server loop and must not
//! block.

use crate::Prefix;
use async_trait::async_trait;

/// A server-side participant addressable by nickname
#[async_trait]
pub trait VirtualClient: Send {
    /// Nickname the virtual client answers to
    fn nick(&self) -> &str;

    /// Handle a PRIVMSG addressed to this virtual client.
    ///
    /// Returns the reply lines to deliver to the sender, one PRIVMSG each.
    async fn on_privmsg(&mut self, from_nick: &str, text: &str) -> Vec<String>;
}

/// Message prefix for lines originating from a virtual client
pub fn service_prefix(nick: &str, server: &str) -> Prefix {
    Prefix::User {
        nick: nick.to_string(),
        user: nick.to_string(),
        host: server.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl VirtualClient for Echo {
        fn nick(&self) -> &str {
            "echo"
        }

        async fn on_privmsg(&mut self, from_nick: &str, text: &str) -> Vec<String> {
            vec![format!("{} said: {}", from_nick, text)]
        }
    }

    #[tokio::test]
    async fn test_virtual_client_replies() {
        let mut echo = Echo;
        let replies = echo.on_privmsg("alice", "hello").await;
        assert_eq!(replies, vec!["alice said: hello"]);
    }

    #[test]
    fn test_service_prefix() {
        let prefix = service_prefix("echo", "irc.example.org");
        assert_eq!(prefix.to_string(), "echo!echo@irc.example.org");
    }
}
