//! oxircd core
//!
//! This crate provides the core of an IRC server implementing RFC 1459
//! semantics: line framing, message parsing, client sessions, channels,
//! command dispatch and the single-threaded server loop.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod framer;
pub mod message;
pub mod motd;
pub mod numeric;
pub mod server;
pub mod service;
pub mod utils;

pub use channel::{Channel, ChannelMember, JoinDenied};
pub use client::{Client, SessionId, SessionState};
pub use config::{Config, LimitsConfig, MotdConfig, OperatorConfig, ServerConfig};
pub use error::{Error, Result};
pub use framer::{LineFramer, MAX_LINE_BYTES, MAX_PAYLOAD_BYTES};
pub use message::{Command, Message, Prefix};
pub use motd::MotdManager;
pub use numeric::NumericReply;
pub use server::{Server, SessionEvent, StopHandle};
pub use service::VirtualClient;

/// Re-exports for convenience
pub use async_trait::async_trait;
pub use tracing::{debug, error, info, warn};
