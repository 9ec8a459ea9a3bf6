//! IRC message parsing and formatting
//!
//! This module implements the IRC message format as defined in RFC 1459.

use std::fmt;

/// IRC message prefix (server or user)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// Server name
    Server(String),
    /// User prefix (nick!user@host)
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{}", name),
            Prefix::User { nick, user, host } => write!(f, "{}!{}@{}", nick, user, host),
        }
    }
}

/// IRC commands understood by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    // Connection registration
    Pass,
    Nick,
    User,
    Oper,
    Quit,

    // Channel operations
    Join,
    Part,
    Mode,
    Topic,
    Names,
    List,
    Invite,
    Kick,

    // Messaging
    PrivMsg,
    Notice,

    // Miscellaneous
    Ping,
    Pong,
    Away,
    Who,
    Whois,

    /// Anything else, normalized to uppercase
    Custom(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Command::Pass => "PASS",
            Command::Nick => "NICK",
            Command::User => "USER",
            Command::Oper => "OPER",
            Command::Quit => "QUIT",
            Command::Join => "JOIN",
            Command::Part => "PART",
            Command::Mode => "MODE",
            Command::Topic => "TOPIC",
            Command::Names => "NAMES",
            Command::List => "LIST",
            Command::Invite => "INVITE",
            Command::Kick => "KICK",
            Command::PrivMsg => "PRIVMSG",
            Command::Notice => "NOTICE",
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::Away => "AWAY",
            Command::Who => "WHO",
            Command::Whois => "WHOIS",
            Command::Custom(cmd) => cmd,
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PASS" => Command::Pass,
            "NICK" => Command::Nick,
            "USER" => Command::User,
            "OPER" => Command::Oper,
            "QUIT" => Command::Quit,
            "JOIN" => Command::Join,
            "PART" => Command::Part,
            "MODE" => Command::Mode,
            "TOPIC" => Command::Topic,
            "NAMES" => Command::Names,
            "LIST" => Command::List,
            "INVITE" => Command::Invite,
            "KICK" => Command::Kick,
            "PRIVMSG" => Command::PrivMsg,
            "NOTICE" => Command::Notice,
            "PING" => Command::Ping,
            "PONG" => Command::Pong,
            "AWAY" => Command::Away,
            "WHO" => Command::Who,
            "WHOIS" => Command::Whois,
            other => Command::Custom(other.to_string()),
        }
    }
}

/// IRC message as defined in RFC 1459
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Optional prefix (server or user)
    pub prefix: Option<Prefix>,
    /// Message command
    pub command: Command,
    /// Message parameters
    pub params: Vec<String>,
    /// Whether the final parameter was (or must be) introduced by `:`
    pub has_trailing: bool,
}

impl Message {
    /// Create a new message
    pub fn new(command: Command, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command,
            params,
            has_trailing: false,
        }
    }

    /// Create a new message with prefix
    pub fn with_prefix(prefix: Prefix, command: Command, params: Vec<String>) -> Self {
        Self {
            prefix: Some(prefix),
            command,
            params,
            has_trailing: false,
        }
    }

    /// Append a trailing parameter, which may contain spaces
    pub fn trailing(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self.has_trailing = true;
        self
    }

    /// Parse an IRC message from a logical line.
    ///
    /// Best-effort: malformed prefixes and odd parameter shapes still yield
    /// tokens; dispatch rejects what it cannot use. Only a line without a
    /// command (empty or whitespace) returns an error.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let mut rest = input.trim_start();
        if rest.is_empty() {
            return Err(crate::Error::MessageParse("empty message".to_string()));
        }

        // Optional prefix
        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (token, remainder) = split_token(stripped);
            rest = remainder.trim_start_matches(' ');
            Some(parse_prefix(token))
        } else {
            None
        };

        // Command token
        let (command_str, mut rest) = split_token(rest);
        if command_str.is_empty() {
            return Err(crate::Error::MessageParse("no command found".to_string()));
        }
        let command = Command::from(command_str);

        // Parameters, with the trailing ":"-rule
        let mut params = Vec::new();
        let mut has_trailing = false;
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                has_trailing = true;
                break;
            }
            let (token, remainder) = split_token(rest);
            params.push(token.to_string());
            rest = remainder;
        }

        Ok(Message {
            prefix,
            command,
            params,
            has_trailing,
        })
    }

    /// Serialize the message to its wire form, including the terminator
    pub fn to_wire(&self) -> String {
        let mut result = String::new();

        if let Some(ref prefix) = self.prefix {
            result.push(':');
            result.push_str(&prefix.to_string());
            result.push(' ');
        }

        result.push_str(&self.command.to_string());

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            result.push(' ');
            if i == last
                && (self.has_trailing
                    || param.is_empty()
                    || param.contains(' ')
                    || param.starts_with(':'))
            {
                result.push(':');
            }
            result.push_str(param);
        }

        result.push_str("\r\n");
        result
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire().trim_end())
    }
}

/// Split off the first space-delimited token
fn split_token(input: &str) -> (&str, &str) {
    match input.find(' ') {
        Some(pos) => (&input[..pos], &input[pos + 1..]),
        None => (input, ""),
    }
}

/// Parse a prefix token into a server or user prefix
fn parse_prefix(token: &str) -> Prefix {
    if let Some(bang) = token.find('!') {
        if let Some(at) = token[bang + 1..].find('@') {
            return Prefix::User {
                nick: token[..bang].to_string(),
                user: token[bang + 1..bang + 1 + at].to_string(),
                host: token[bang + 1 + at + 1..].to_string(),
            };
        }
    }
    Prefix::Server(token.to_string())
}
