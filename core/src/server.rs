//! Main IRC server implementation
//!
//! The server task exclusively owns every session and channel. Connection
//! reader tasks feed it parsed-off-the-wire lines through one event channel
//! and writer tasks drain the per-session outbound queues; neither touches
//! shared state, so handlers run to completion without locks.

use crate::{
    channel::{Channel, JoinDenied},
    client::{Client, SessionId, SessionState},
    config::Config,
    framer::LineFramer,
    message::{Command, Message, Prefix},
    motd::MotdManager,
    numeric::NumericReply,
    service::{service_prefix, VirtualClient},
    utils::string,
    Result,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Size of the per-read stack buffer
const READ_BUFFER_BYTES: usize = 1024;

/// Default messages for commands that allow omitting them
const DEFAULT_QUIT_MESSAGE: &str = "Quit";
const DEFAULT_PART_MESSAGE: &str = "Leaving";
const DEFAULT_KICK_MESSAGE: &str = "No reason given";

/// Dispatch preconditions for a command
struct CommandSpec {
    requires_registration: bool,
    min_params: usize,
}

impl CommandSpec {
    fn new(requires_registration: bool, min_params: usize) -> Self {
        Self {
            requires_registration,
            min_params,
        }
    }
}

/// Command name to dispatch descriptor table
struct CommandRegistry {
    specs: HashMap<Command, CommandSpec>,
}

impl CommandRegistry {
    fn new() -> Self {
        let mut specs = HashMap::new();
        specs.insert(Command::Pass, CommandSpec::new(false, 1));
        specs.insert(Command::Nick, CommandSpec::new(false, 1));
        specs.insert(Command::User, CommandSpec::new(false, 4));
        specs.insert(Command::Oper, CommandSpec::new(true, 2));
        specs.insert(Command::Quit, CommandSpec::new(false, 0));
        specs.insert(Command::Join, CommandSpec::new(true, 1));
        specs.insert(Command::Part, CommandSpec::new(true, 1));
        specs.insert(Command::Mode, CommandSpec::new(true, 1));
        specs.insert(Command::Topic, CommandSpec::new(true, 1));
        specs.insert(Command::Names, CommandSpec::new(true, 0));
        specs.insert(Command::List, CommandSpec::new(true, 0));
        specs.insert(Command::Invite, CommandSpec::new(true, 2));
        specs.insert(Command::Kick, CommandSpec::new(true, 2));
        specs.insert(Command::PrivMsg, CommandSpec::new(true, 2));
        specs.insert(Command::Notice, CommandSpec::new(true, 2));
        specs.insert(Command::Ping, CommandSpec::new(false, 1));
        specs.insert(Command::Pong, CommandSpec::new(false, 0));
        specs.insert(Command::Away, CommandSpec::new(true, 0));
        specs.insert(Command::Who, CommandSpec::new(true, 0));
        specs.insert(Command::Whois, CommandSpec::new(true, 1));
        Self { specs }
    }

    fn get(&self, command: &Command) -> Option<&CommandSpec> {
        self.specs.get(command)
    }
}

/// Events sent by connection reader tasks into the server loop
#[derive(Debug)]
pub enum SessionEvent {
    /// A complete protocol line arrived on a session
    Line(SessionId, String),
    /// The session's socket reached EOF or failed
    Closed(SessionId),
}

/// Handle for stopping a running server from other tasks (signal handlers)
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

impl StopHandle {
    /// Request a graceful shutdown; the current loop cycle completes first
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_one();
    }

    /// Check whether the server loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

enum LoopEvent {
    Accepted(TcpStream, SocketAddr),
    Session(SessionEvent),
    Tick,
    Stop,
}

/// Main IRC server
pub struct Server {
    /// Server configuration
    config: Config,
    /// Connection password required by PASS
    password: String,
    /// Message of the day
    motd: MotdManager,
    /// Sessions by handle
    clients: HashMap<SessionId, Client>,
    /// Lowercased nickname to session handle
    nick_to_id: HashMap<String, SessionId>,
    /// Channels by lowercased name
    channels: HashMap<String, Channel>,
    /// Registered virtual clients
    services: Vec<Box<dyn VirtualClient>>,
    /// Command dispatch table
    registry: CommandRegistry,
    /// Server creation time, reported by 003
    created_at: DateTime<Utc>,
    /// Loop running flag, shared with StopHandle
    running: Arc<AtomicBool>,
    /// Wakes the loop when stop() is called
    stop: Arc<Notify>,
    /// Event channel feeding the loop; tx is cloned into reader tasks
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Reader task handles, aborted on session teardown
    reader_tasks: HashMap<SessionId, JoinHandle<()>>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, password: String) -> Result<Self> {
        let motd = MotdManager::from_config(&config.motd)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            password,
            motd,
            clients: HashMap::new(),
            nick_to_id: HashMap::new(),
            channels: HashMap::new(),
            services: Vec::new(),
            registry: CommandRegistry::new(),
            created_at: Utc::now(),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            event_tx,
            event_rx,
            reader_tasks: HashMap::new(),
        })
    }

    /// Handle for stopping the server from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
            stop: self.stop.clone(),
        }
    }

    /// Check whether the server loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a virtual client; its nickname becomes addressable by PRIVMSG
    pub fn register_service(&mut self, service: Box<dyn VirtualClient>) {
        info!("virtual client registered: {}", service.nick());
        self.services.push(service);
    }

    /// Number of connected sessions
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of live channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Look up a session
    pub fn client(&self, id: SessionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Look up a channel by name (case-insensitive)
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&string::irc_lower(name))
    }

    /// Bind the listening socket and run the event loop until stopped
    pub async fn run(&mut self, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(
            "{} listening on 0.0.0.0:{}",
            self.config.server.name, port
        );
        self.running.store(true, Ordering::SeqCst);

        let mut maintenance = interval(Duration::from_secs(1));
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            let stop = self.stop.clone();
            let event = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => LoopEvent::Accepted(stream, addr),
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                },
                event = self.event_rx.recv() => match event {
                    Some(event) => LoopEvent::Session(event),
                    None => continue,
                },
                _ = stop.notified() => LoopEvent::Stop,
                _ = maintenance.tick() => LoopEvent::Tick,
            };

            match event {
                LoopEvent::Accepted(stream, addr) => self.accept_connection(stream, addr),
                LoopEvent::Session(SessionEvent::Line(id, line)) => {
                    self.handle_line(id, &line).await
                }
                LoopEvent::Session(SessionEvent::Closed(id)) => {
                    self.remove_session(id, Some("Connection closed"))
                }
                LoopEvent::Tick => self.reap_disconnecting(),
                LoopEvent::Stop => break,
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Attach a session backed by an outbound queue sender.
    ///
    /// The accept path calls this with the writer task's queue; tests attach
    /// sessions backed by plain channels.
    pub fn attach_session(&mut self, host: String, sender: mpsc::Sender<String>) -> SessionId {
        let id = Uuid::new_v4();
        self.clients.insert(id, Client::new(id, host, sender));
        id
    }

    fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.clients.len() >= self.config.limits.max_clients {
            warn!("connection limit reached, refusing {}", addr);
            return;
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.limits.outbound_queue_depth);
        let id = self.attach_session(addr.ip().to_string(), outbound_tx);

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(writer_task(write_half, outbound_rx));
        let reader = tokio::spawn(reader_task(id, read_half, self.event_tx.clone()));
        self.reader_tasks.insert(id, reader);

        info!("connection accepted from {}", addr);
    }

    /// Dispatch one protocol line from a session.
    ///
    /// Precondition checks run in the order: password gate, unknown command,
    /// registration, parameter count. When a handler leaves the session
    /// Disconnecting, it is reaped before the next line is processed.
    pub async fn handle_line(&mut self, id: SessionId, line: &str) {
        let state = match self.clients.get_mut(&id) {
            Some(client) if client.state != SessionState::Disconnecting => {
                client.touch();
                client.state
            }
            _ => return,
        };

        let message = match Message::parse(line) {
            Ok(message) => message,
            Err(_) => return,
        };
        debug!("<- {}", message);

        if state == SessionState::AwaitingPassword
            && !matches!(
                message.command,
                Command::Pass | Command::Quit | Command::Ping
            )
        {
            self.send_numeric(id, |n| NumericReply::password_required(n));
            return;
        }

        match self.registry.get(&message.command) {
            None => {
                let command = message.command.to_string();
                self.send_numeric(id, |n| NumericReply::unknown_command(n, &command));
                return;
            }
            Some(spec) => {
                if spec.requires_registration && state != SessionState::Registered {
                    self.send_numeric(id, |n| NumericReply::not_registered(n));
                    return;
                }
                if message.params.len() < spec.min_params {
                    let command = message.command.to_string();
                    self.send_numeric(id, |n| NumericReply::need_more_params(n, &command));
                    return;
                }
            }
        }

        let params = message.params;
        match message.command {
            Command::Pass => self.handle_pass(id, params),
            Command::Nick => self.handle_nick(id, params),
            Command::User => self.handle_user(id, params),
            Command::Oper => self.handle_oper(id, params),
            Command::Quit => self.handle_quit(id, params),
            Command::Join => self.handle_join(id, params),
            Command::Part => self.handle_part(id, params),
            Command::Mode => self.handle_mode(id, params),
            Command::Topic => self.handle_topic(id, params),
            Command::Names => self.handle_names(id, params),
            Command::List => self.handle_list(id, params),
            Command::Invite => self.handle_invite(id, params),
            Command::Kick => self.handle_kick(id, params),
            Command::PrivMsg => self.handle_privmsg(id, params).await,
            Command::Notice => self.handle_notice(id, params),
            Command::Ping => self.handle_ping(id, params),
            Command::Pong => self.handle_pong(id),
            Command::Away => self.handle_away(id, params),
            Command::Who => self.handle_who(id, params),
            Command::Whois => self.handle_whois(id, params),
            Command::Custom(_) => {}
        }

        if self
            .clients
            .get(&id)
            .is_some_and(|c| c.state == SessionState::Disconnecting)
        {
            self.remove_session(id, None);
        }
    }

    /// Tear down a session: evict it from every channel it joined, deleting
    /// channels that become empty, then drop the connection. When `reason`
    /// is given and the session was registered, its neighbors see a QUIT.
    pub fn remove_session(&mut self, id: SessionId, reason: Option<&str>) {
        let announce = match self.clients.get(&id) {
            Some(client) => reason
                .filter(|_| client.is_registered())
                .map(|r| (client.prefix(), r.to_string())),
            None => return,
        };
        if let Some((prefix, reason)) = announce {
            let quit = Message::with_prefix(prefix, Command::Quit, vec![]).trailing(reason);
            self.broadcast_to_neighbors(id, &quit);
        }

        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        if !client.nick.is_empty() {
            self.nick_to_id.remove(&string::irc_lower(&client.nick));
        }
        for chan_key in &client.channels {
            if let Some(channel) = self.channels.get_mut(chan_key) {
                channel.remove_member(&id);
                if channel.is_empty() {
                    info!("channel {} is empty, deleting", channel.name);
                    self.channels.remove(chan_key);
                }
            }
        }
        if let Some(handle) = self.reader_tasks.remove(&id) {
            handle.abort();
        }
        info!("session closed: {}", client.info_string());
        // Dropping the client drops its queue sender; the writer task drains
        // what was already queued, then closes the socket.
    }

    fn reap_disconnecting(&mut self) {
        let stale: Vec<SessionId> = self
            .clients
            .iter()
            .filter(|(_, c)| c.state == SessionState::Disconnecting)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.remove_session(id, Some("Connection closed"));
        }
    }

    fn shutdown(&mut self) {
        info!("server stopping, closing {} sessions", self.clients.len());
        for (_, handle) in self.reader_tasks.drain() {
            handle.abort();
        }
        self.clients.clear();
        self.channels.clear();
        self.nick_to_id.clear();
        self.running.store(false, Ordering::SeqCst);
        info!("server stopped");
    }

    // Send helpers

    fn send_to(&mut self, id: SessionId, message: Message) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.send(message);
        }
    }

    /// Send a numeric reply. The closure receives the session's current
    /// nickname (or `*`) as the reply target; the server prefix is added
    /// here.
    fn send_numeric<F>(&mut self, id: SessionId, build: F)
    where
        F: FnOnce(&str) -> Message,
    {
        let server_name = self.config.server.name.clone();
        if let Some(client) = self.clients.get_mut(&id) {
            let mut message = build(client.nick_or_star());
            message.prefix = Some(Prefix::Server(server_name));
            client.send(message);
        }
    }

    fn channel_member_ids(&self, chan_key: &str) -> Vec<SessionId> {
        self.channels
            .get(chan_key)
            .map(|c| c.member_ids().collect())
            .unwrap_or_default()
    }

    fn broadcast_to_channel(
        &mut self,
        chan_key: &str,
        message: &Message,
        exclude: Option<SessionId>,
    ) {
        for member in self.channel_member_ids(chan_key) {
            if Some(member) == exclude {
                continue;
            }
            self.send_to(member, message.clone());
        }
    }

    /// Everyone sharing at least one channel with the session, deduplicated,
    /// the session itself excluded
    fn neighbor_ids(&self, id: SessionId) -> Vec<SessionId> {
        let mut unique = HashSet::new();
        if let Some(client) = self.clients.get(&id) {
            for chan_key in &client.channels {
                if let Some(channel) = self.channels.get(chan_key) {
                    unique.extend(channel.member_ids());
                }
            }
        }
        unique.remove(&id);
        unique.into_iter().collect()
    }

    fn broadcast_to_neighbors(&mut self, id: SessionId, message: &Message) {
        for neighbor in self.neighbor_ids(id) {
            self.send_to(neighbor, message.clone());
        }
    }

    fn client_prefix(&self, id: SessionId) -> Option<Prefix> {
        self.clients.get(&id).map(|c| c.prefix())
    }

    // Registration commands

    fn handle_pass(&mut self, id: SessionId, params: Vec<String>) {
        let state = match self.clients.get(&id) {
            Some(client) => client.state,
            None => return,
        };
        if state != SessionState::AwaitingPassword {
            self.send_numeric(id, |n| NumericReply::already_registered(n));
            return;
        }
        if params[0] != self.password {
            self.send_numeric(id, |n| NumericReply::password_mismatch(n));
            return;
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.state = SessionState::PasswordAccepted;
            debug!("password accepted for {}", client.info_string());
        }
    }

    fn handle_nick(&mut self, id: SessionId, params: Vec<String>) {
        let new_nick = params[0].clone();
        if !string::is_valid_nickname(&new_nick, self.config.limits.max_nickname_length) {
            self.send_numeric(id, |n| NumericReply::erroneous_nickname(n, &new_nick));
            return;
        }
        let lower = string::irc_lower(&new_nick);
        if let Some(&owner) = self.nick_to_id.get(&lower) {
            if owner != id {
                self.send_numeric(id, |n| NumericReply::nickname_in_use(n, &new_nick));
                return;
            }
        }

        let (old_nick, old_prefix, state, has_user) = match self.clients.get(&id) {
            Some(client) => (
                client.nick.clone(),
                client.prefix(),
                client.state,
                !client.username.is_empty(),
            ),
            None => return,
        };

        if !old_nick.is_empty() {
            self.nick_to_id.remove(&string::irc_lower(&old_nick));
        }
        self.nick_to_id.insert(lower, id);
        if let Some(client) = self.clients.get_mut(&id) {
            client.nick = new_nick.clone();
        }

        if state == SessionState::Registered {
            let change =
                Message::with_prefix(old_prefix, Command::Nick, vec![]).trailing(new_nick.clone());
            self.send_to(id, change.clone());
            self.broadcast_to_neighbors(id, &change);
            info!("{} is now known as {}", old_nick, new_nick);
        } else if state == SessionState::PasswordAccepted && has_user {
            self.complete_registration(id);
        }
    }

    fn handle_user(&mut self, id: SessionId, params: Vec<String>) {
        let (state, has_nick) = match self.clients.get(&id) {
            Some(client) => (client.state, !client.nick.is_empty()),
            None => return,
        };
        if state == SessionState::Registered {
            self.send_numeric(id, |n| NumericReply::already_registered(n));
            return;
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.username = params[0].clone();
            client.realname = params[3].clone();
        }
        if state == SessionState::PasswordAccepted && has_nick {
            self.complete_registration(id);
        }
    }

    /// Emit the welcome block: 001-004, LUSERS counters, MOTD
    fn complete_registration(&mut self, id: SessionId) {
        let (nick, username, host) = match self.clients.get_mut(&id) {
            Some(client) => {
                client.state = SessionState::Registered;
                (
                    client.nick.clone(),
                    client.username.clone(),
                    client.host.clone(),
                )
            }
            None => return,
        };

        let server = self.config.server.name.clone();
        let version = self.config.server.version.clone();
        let created = self.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let users = self.clients.len();
        let opers = self.clients.values().filter(|c| c.is_operator).count();
        let channels = self.channels.len();

        let mut messages = vec![
            NumericReply::welcome(&nick, &nick, &username, &host),
            NumericReply::your_host(&nick, &server, &version),
            NumericReply::created(&nick, &created),
            NumericReply::my_info(&nick, &server, &version),
            NumericReply::luser_client(&nick, users),
            NumericReply::luser_op(&nick, opers),
            NumericReply::luser_channels(&nick, channels),
            NumericReply::luser_me(&nick, users),
        ];
        messages.extend(self.motd.messages(&nick, &server));

        for mut message in messages {
            message.prefix = Some(Prefix::Server(server.clone()));
            self.send_to(id, message);
        }
        info!("{}!{}@{} registered", nick, username, host);
    }

    fn handle_oper(&mut self, id: SessionId, params: Vec<String>) {
        if self.config.find_operator(&params[0], &params[1]).is_none() {
            self.send_numeric(id, |n| NumericReply::password_mismatch(n));
            return;
        }
        let nick = match self.clients.get_mut(&id) {
            Some(client) => {
                client.is_operator = true;
                client.nick.clone()
            }
            None => return,
        };
        self.send_numeric(id, |n| NumericReply::youre_oper(n));
        let server = self.config.server.name.clone();
        let mode = Message::with_prefix(
            Prefix::Server(server),
            Command::Mode,
            vec![nick.clone(), "+o".to_string()],
        );
        self.send_to(id, mode);
        info!("{} is now a server operator", nick);
    }

    fn handle_quit(&mut self, id: SessionId, params: Vec<String>) {
        let reason = params
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_QUIT_MESSAGE.to_string());
        let (prefix, registered, description) = match self.clients.get(&id) {
            Some(client) => (client.prefix(), client.is_registered(), client.info_string()),
            None => return,
        };
        if registered {
            let quit = Message::with_prefix(prefix, Command::Quit, vec![]).trailing(reason.clone());
            self.broadcast_to_neighbors(id, &quit);
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.state = SessionState::Disconnecting;
        }
        info!("{} quit: {}", description, reason);
    }

    // Channel commands

    fn handle_join(&mut self, id: SessionId, params: Vec<String>) {
        let names: Vec<String> = params[0].split(',').map(str::to_string).collect();
        let keys: Vec<String> = params
            .get(1)
            .map(|k| k.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        for (i, name) in names.iter().enumerate() {
            let key = keys.get(i).map(String::as_str).filter(|k| !k.is_empty());
            self.join_channel(id, name, key);
        }
    }

    fn join_channel(&mut self, id: SessionId, name: &str, key: Option<&str>) {
        if !string::is_valid_channel_name(name, self.config.limits.max_channel_name_length) {
            self.send_numeric(id, |n| NumericReply::no_such_channel(n, name));
            return;
        }
        let nick = match self.clients.get(&id) {
            Some(client) => client.nick.clone(),
            None => return,
        };
        let chan_key = string::irc_lower(name);

        match self.channels.get_mut(&chan_key) {
            Some(channel) => {
                if channel.has_member(&id) {
                    // Already on the channel: JOIN is idempotent
                    return;
                }
                if let Err(denied) = channel.can_join(&nick, key) {
                    let channel_name = channel.name.clone();
                    match denied {
                        JoinDenied::InviteOnly => self.send_numeric(id, |n| {
                            NumericReply::invite_only_chan(n, &channel_name)
                        }),
                        JoinDenied::BadKey => self
                            .send_numeric(id, |n| NumericReply::bad_channel_key(n, &channel_name)),
                        JoinDenied::Full => self
                            .send_numeric(id, |n| NumericReply::channel_is_full(n, &channel_name)),
                    }
                    return;
                }
                channel.add_member(id, false);
                channel.remove_invite(&nick);
            }
            None => {
                self.channels
                    .insert(chan_key.clone(), Channel::new(name.to_string(), id));
                info!("channel {} created by {}", name, nick);
            }
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.join_channel(chan_key.clone());
        }

        let (channel_name, topic) = match self.channels.get(&chan_key) {
            Some(channel) => (channel.name.clone(), channel.topic.clone()),
            None => return,
        };
        if let Some(prefix) = self.client_prefix(id) {
            let join =
                Message::with_prefix(prefix, Command::Join, vec![]).trailing(channel_name.clone());
            self.broadcast_to_channel(&chan_key, &join, None);
        }

        if topic.is_empty() {
            self.send_numeric(id, |n| NumericReply::no_topic(n, &channel_name));
        } else {
            self.send_numeric(id, |n| NumericReply::topic(n, &channel_name, &topic));
        }
        self.send_name_replies(id, &chan_key);
        self.send_numeric(id, |n| NumericReply::end_of_names(n, &channel_name));
    }

    fn handle_part(&mut self, id: SessionId, params: Vec<String>) {
        let name = params[0].clone();
        let chan_key = string::irc_lower(&name);
        let channel_name = match self.channels.get(&chan_key) {
            Some(channel) => {
                if !channel.has_member(&id) {
                    let channel_name = channel.name.clone();
                    self.send_numeric(id, |n| NumericReply::not_on_channel(n, &channel_name));
                    return;
                }
                channel.name.clone()
            }
            None => {
                self.send_numeric(id, |n| NumericReply::no_such_channel(n, &name));
                return;
            }
        };

        let reason = params
            .into_iter()
            .nth(1)
            .unwrap_or_else(|| DEFAULT_PART_MESSAGE.to_string());
        if let Some(prefix) = self.client_prefix(id) {
            let part = Message::with_prefix(prefix, Command::Part, vec![channel_name.clone()])
                .trailing(reason);
            self.broadcast_to_channel(&chan_key, &part, None);
        }

        if let Some(channel) = self.channels.get_mut(&chan_key) {
            channel.remove_member(&id);
            if channel.is_empty() {
                info!("channel {} is empty, deleting", channel.name);
                self.channels.remove(&chan_key);
            }
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.part_channel(&chan_key);
        }
    }

    fn handle_mode(&mut self, id: SessionId, params: Vec<String>) {
        let target = params[0].clone();
        if target.starts_with('#') || target.starts_with('&') {
            self.handle_channel_mode(id, &target, params);
        } else {
            self.handle_user_mode(id, &target, params);
        }
    }

    fn handle_channel_mode(&mut self, id: SessionId, target: &str, params: Vec<String>) {
        let chan_key = string::irc_lower(target);
        let (channel_name, is_operator) = match self.channels.get(&chan_key) {
            Some(channel) => (channel.name.clone(), channel.is_operator(&id)),
            None => {
                self.send_numeric(id, |n| NumericReply::no_such_channel(n, target));
                return;
            }
        };

        let modes = params.get(1).cloned().unwrap_or_default();
        if modes.is_empty() {
            let (mode_string, mode_params) = match self.channels.get(&chan_key) {
                Some(channel) => channel.mode_description(),
                None => return,
            };
            self.send_numeric(id, |n| {
                NumericReply::channel_mode_is(n, &channel_name, &mode_string, mode_params.clone())
            });
            return;
        }
        if !is_operator {
            self.send_numeric(id, |n| NumericReply::chanop_privs_needed(n, &channel_name));
            return;
        }

        let mode_params: Vec<String> = params.iter().skip(2).cloned().collect();
        let mut adding = true;
        let mut param_index = 0usize;
        let mut applied = String::new();
        let mut applied_params: Vec<String> = Vec::new();
        let mut last_sign: Option<char> = None;
        let mut changed = false;

        let record = |applied: &mut String, last_sign: &mut Option<char>, add: bool, mode: char| {
            let sign = if add { '+' } else { '-' };
            if *last_sign != Some(sign) {
                applied.push(sign);
                *last_sign = Some(sign);
            }
            applied.push(mode);
        };

        for mode in modes.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                'i' | 't' => {
                    if let Some(channel) = self.channels.get_mut(&chan_key) {
                        channel.set_mode(mode, adding);
                    }
                    record(&mut applied, &mut last_sign, adding, mode);
                    changed = true;
                }
                'k' => {
                    if adding {
                        let Some(key) = mode_params.get(param_index).cloned() else {
                            self.send_numeric(id, |n| NumericReply::need_more_params(n, "MODE"));
                            continue;
                        };
                        param_index += 1;
                        if let Some(channel) = self.channels.get_mut(&chan_key) {
                            channel.set_key(Some(key.clone()));
                        }
                        record(&mut applied, &mut last_sign, true, 'k');
                        applied_params.push(key);
                    } else {
                        if let Some(channel) = self.channels.get_mut(&chan_key) {
                            channel.set_key(None);
                        }
                        record(&mut applied, &mut last_sign, false, 'k');
                    }
                    changed = true;
                }
                'l' => {
                    if adding {
                        let Some(raw) = mode_params.get(param_index).cloned() else {
                            self.send_numeric(id, |n| NumericReply::need_more_params(n, "MODE"));
                            continue;
                        };
                        param_index += 1;
                        let Ok(limit) = raw.parse::<usize>() else {
                            self.send_numeric(id, |n| {
                                NumericReply::umode_unknown_flag(n, "Invalid user limit")
                            });
                            continue;
                        };
                        if limit == 0 {
                            self.send_numeric(id, |n| {
                                NumericReply::umode_unknown_flag(n, "Invalid user limit")
                            });
                            continue;
                        }
                        if let Some(channel) = self.channels.get_mut(&chan_key) {
                            channel.set_user_limit(Some(limit));
                        }
                        record(&mut applied, &mut last_sign, true, 'l');
                        applied_params.push(raw);
                    } else {
                        if let Some(channel) = self.channels.get_mut(&chan_key) {
                            channel.set_user_limit(None);
                        }
                        record(&mut applied, &mut last_sign, false, 'l');
                    }
                    changed = true;
                }
                'o' => {
                    let Some(target_nick) = mode_params.get(param_index).cloned() else {
                        self.send_numeric(id, |n| NumericReply::need_more_params(n, "MODE"));
                        continue;
                    };
                    param_index += 1;
                    let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&target_nick))
                    else {
                        self.send_numeric(id, |n| NumericReply::no_such_nick(n, &target_nick));
                        continue;
                    };
                    let on_channel = self
                        .channels
                        .get(&chan_key)
                        .is_some_and(|c| c.has_member(&target_id));
                    if !on_channel {
                        self.send_numeric(id, |n| {
                            NumericReply::user_not_in_channel(n, &target_nick, &channel_name)
                        });
                        continue;
                    }
                    if let Some(channel) = self.channels.get_mut(&chan_key) {
                        channel.set_operator(&target_id, adding);
                    }
                    record(&mut applied, &mut last_sign, adding, 'o');
                    applied_params.push(target_nick);
                    changed = true;
                }
                'v' => {
                    let Some(target_nick) = mode_params.get(param_index).cloned() else {
                        self.send_numeric(id, |n| NumericReply::need_more_params(n, "MODE"));
                        continue;
                    };
                    param_index += 1;
                    let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&target_nick))
                    else {
                        self.send_numeric(id, |n| NumericReply::no_such_nick(n, &target_nick));
                        continue;
                    };
                    let on_channel = self
                        .channels
                        .get(&chan_key)
                        .is_some_and(|c| c.has_member(&target_id));
                    if !on_channel {
                        self.send_numeric(id, |n| {
                            NumericReply::user_not_in_channel(n, &target_nick, &channel_name)
                        });
                        continue;
                    }
                    if let Some(channel) = self.channels.get_mut(&chan_key) {
                        channel.set_voice(&target_id, adding);
                    }
                    record(&mut applied, &mut last_sign, adding, 'v');
                    applied_params.push(target_nick);
                    changed = true;
                }
                other => {
                    self.send_numeric(id, |n| NumericReply::unknown_mode(n, other));
                }
            }
        }

        if changed {
            if let Some(prefix) = self.client_prefix(id) {
                let mut line_params = vec![channel_name, applied];
                line_params.extend(applied_params);
                let mode = Message::with_prefix(prefix, Command::Mode, line_params);
                self.broadcast_to_channel(&chan_key, &mode, None);
            }
        }
    }

    fn handle_user_mode(&mut self, id: SessionId, target: &str, params: Vec<String>) {
        let (nick, is_operator, prefix) = match self.clients.get(&id) {
            Some(client) => (client.nick.clone(), client.is_operator, client.prefix()),
            None => return,
        };
        if !string::irc_eq(target, &nick) {
            self.send_numeric(id, |n| NumericReply::users_dont_match(n));
            return;
        }

        let modes = params.get(1).cloned().unwrap_or_default();
        if modes.is_empty() {
            let current = if is_operator { "+o" } else { "+" };
            self.send_numeric(id, |n| NumericReply::umode_is(n, current));
            return;
        }

        let mut adding = true;
        for mode in modes.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                'o' if adding => {
                    self.send_numeric(id, |n| {
                        NumericReply::umode_unknown_flag(n, "Cannot set user mode +o")
                    });
                }
                'o' => {
                    if is_operator {
                        if let Some(client) = self.clients.get_mut(&id) {
                            client.is_operator = false;
                        }
                        let change = Message::with_prefix(
                            prefix.clone(),
                            Command::Mode,
                            vec![nick.clone(), "-o".to_string()],
                        );
                        self.send_to(id, change);
                        info!("{} dropped operator status", nick);
                    }
                }
                _ => {
                    self.send_numeric(id, |n| {
                        NumericReply::umode_unknown_flag(n, "Unknown MODE flag")
                    });
                }
            }
        }
    }

    fn handle_topic(&mut self, id: SessionId, params: Vec<String>) {
        let name = params[0].clone();
        let chan_key = string::irc_lower(&name);
        let (channel_name, topic, is_member, may_change) = match self.channels.get(&chan_key) {
            Some(channel) => (
                channel.name.clone(),
                channel.topic.clone(),
                channel.has_member(&id),
                channel.can_change_topic(&id),
            ),
            None => {
                self.send_numeric(id, |n| NumericReply::no_such_channel(n, &name));
                return;
            }
        };
        if !is_member {
            self.send_numeric(id, |n| NumericReply::not_on_channel(n, &channel_name));
            return;
        }

        if params.len() == 1 {
            if topic.is_empty() {
                self.send_numeric(id, |n| NumericReply::no_topic(n, &channel_name));
            } else {
                self.send_numeric(id, |n| NumericReply::topic(n, &channel_name, &topic));
            }
            return;
        }

        if !may_change {
            self.send_numeric(id, |n| NumericReply::chanop_privs_needed(n, &channel_name));
            return;
        }

        let max = self.config.limits.max_topic_length;
        let mut new_topic = params[1].clone();
        if new_topic.chars().count() > max {
            new_topic = new_topic.chars().take(max).collect();
        }
        if let Some(channel) = self.channels.get_mut(&chan_key) {
            channel.topic = new_topic.clone();
        }
        if let Some(prefix) = self.client_prefix(id) {
            let change = Message::with_prefix(prefix, Command::Topic, vec![channel_name])
                .trailing(new_topic);
            self.broadcast_to_channel(&chan_key, &change, None);
        }
    }

    fn handle_kick(&mut self, id: SessionId, params: Vec<String>) {
        let name = params[0].clone();
        let target_nick = params[1].clone();
        let chan_key = string::irc_lower(&name);
        let (channel_name, is_member, is_operator) = match self.channels.get(&chan_key) {
            Some(channel) => (
                channel.name.clone(),
                channel.has_member(&id),
                channel.is_operator(&id),
            ),
            None => {
                self.send_numeric(id, |n| NumericReply::no_such_channel(n, &name));
                return;
            }
        };
        if !is_member {
            self.send_numeric(id, |n| NumericReply::not_on_channel(n, &channel_name));
            return;
        }
        if !is_operator {
            self.send_numeric(id, |n| NumericReply::chanop_privs_needed(n, &channel_name));
            return;
        }

        let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&target_nick)) else {
            self.send_numeric(id, |n| NumericReply::no_such_nick(n, &target_nick));
            return;
        };
        if !self
            .channels
            .get(&chan_key)
            .is_some_and(|c| c.has_member(&target_id))
        {
            self.send_numeric(id, |n| {
                NumericReply::user_not_in_channel(n, &target_nick, &channel_name)
            });
            return;
        }

        let kicker = self
            .clients
            .get(&id)
            .map(|c| c.nick.clone())
            .unwrap_or_default();
        let target_nick = self
            .clients
            .get(&target_id)
            .map(|c| c.nick.clone())
            .unwrap_or(target_nick);
        let reason = params
            .into_iter()
            .nth(2)
            .unwrap_or_else(|| DEFAULT_KICK_MESSAGE.to_string());
        if let Some(prefix) = self.client_prefix(id) {
            let kick = Message::with_prefix(
                prefix,
                Command::Kick,
                vec![channel_name.clone(), target_nick.clone()],
            )
            .trailing(reason);
            self.broadcast_to_channel(&chan_key, &kick, None);
        }

        if let Some(channel) = self.channels.get_mut(&chan_key) {
            channel.remove_member(&target_id);
            if channel.is_empty() {
                info!("channel {} is empty, deleting", channel.name);
                self.channels.remove(&chan_key);
            }
        }
        if let Some(client) = self.clients.get_mut(&target_id) {
            client.part_channel(&chan_key);
        }
        info!("{} kicked from {} by {}", target_nick, channel_name, kicker);
    }

    fn handle_invite(&mut self, id: SessionId, params: Vec<String>) {
        let target_nick = params[0].clone();
        let name = params[1].clone();

        let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&target_nick)) else {
            self.send_numeric(id, |n| NumericReply::no_such_nick(n, &target_nick));
            return;
        };
        let chan_key = string::irc_lower(&name);
        let (channel_name, inviter_on, target_on, invite_only, inviter_op) =
            match self.channels.get(&chan_key) {
                Some(channel) => (
                    channel.name.clone(),
                    channel.has_member(&id),
                    channel.has_member(&target_id),
                    channel.has_mode('i'),
                    channel.is_operator(&id),
                ),
                None => {
                    self.send_numeric(id, |n| NumericReply::no_such_channel(n, &name));
                    return;
                }
            };
        if !inviter_on {
            self.send_numeric(id, |n| NumericReply::not_on_channel(n, &channel_name));
            return;
        }
        let (target_nick, target_away) = match self.clients.get(&target_id) {
            Some(client) => (client.nick.clone(), client.away_message.clone()),
            None => return,
        };
        if target_on {
            self.send_numeric(id, |n| {
                NumericReply::user_on_channel(n, &target_nick, &channel_name)
            });
            return;
        }
        if invite_only && !inviter_op {
            self.send_numeric(id, |n| NumericReply::chanop_privs_needed(n, &channel_name));
            return;
        }

        if let Some(channel) = self.channels.get_mut(&chan_key) {
            channel.invite(&target_nick);
        }
        self.send_numeric(id, |n| {
            NumericReply::inviting(n, &target_nick, &channel_name)
        });
        if let Some(prefix) = self.client_prefix(id) {
            let invite = Message::with_prefix(prefix, Command::Invite, vec![target_nick.clone()])
                .trailing(channel_name.clone());
            self.send_to(target_id, invite);
        }
        if let Some(away) = target_away {
            self.send_numeric(id, |n| NumericReply::away(n, &target_nick, &away));
        }
        info!("{} invited to {}", target_nick, channel_name);
    }

    fn handle_names(&mut self, id: SessionId, params: Vec<String>) {
        if params.is_empty() {
            let mut keys: Vec<String> = self.channels.keys().cloned().collect();
            keys.sort();
            for chan_key in keys {
                self.send_name_replies(id, &chan_key);
            }
            self.send_numeric(id, |n| NumericReply::end_of_names(n, "*"));
            return;
        }

        for name in params[0].split(',') {
            let chan_key = string::irc_lower(name);
            let channel_name = self
                .channels
                .get(&chan_key)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| name.to_string());
            self.send_name_replies(id, &chan_key);
            self.send_numeric(id, |n| NumericReply::end_of_names(n, &channel_name));
        }
    }

    /// Emit the 353 lines for a channel, chunked to stay within the line cap
    fn send_name_replies(&mut self, id: SessionId, chan_key: &str) {
        let Some(channel) = self.channels.get(chan_key) else {
            return;
        };
        let channel_name = channel.name.clone();
        let mut entries = Vec::new();
        for member in channel.members() {
            if let Some(client) = self.clients.get(&member.session) {
                let sigil = if member.is_operator() {
                    "@"
                } else if member.has_voice() {
                    "+"
                } else {
                    ""
                };
                entries.push(format!("{}{}", sigil, client.nick));
            }
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut chunk = String::new();
        for entry in entries {
            if !chunk.is_empty() && chunk.len() + entry.len() + 1 > 400 {
                chunks.push(std::mem::take(&mut chunk));
            }
            if !chunk.is_empty() {
                chunk.push(' ');
            }
            chunk.push_str(&entry);
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        for names in chunks {
            self.send_numeric(id, |n| NumericReply::name_reply(n, &channel_name, &names));
        }
    }

    fn handle_list(&mut self, id: SessionId, params: Vec<String>) {
        self.send_numeric(id, |n| NumericReply::list_start(n));

        let keys: Vec<String> = match params.first() {
            Some(names) => names
                .split(',')
                .map(string::irc_lower)
                .filter(|k| self.channels.contains_key(k))
                .collect(),
            None => {
                let mut keys: Vec<String> = self.channels.keys().cloned().collect();
                keys.sort();
                keys
            }
        };

        for chan_key in keys {
            let entry = self
                .channels
                .get(&chan_key)
                .map(|c| (c.name.clone(), c.member_count(), c.topic.clone()));
            if let Some((channel_name, count, topic)) = entry {
                self.send_numeric(id, |n| {
                    NumericReply::list_entry(n, &channel_name, count, &topic)
                });
            }
        }
        self.send_numeric(id, |n| NumericReply::list_end(n));
    }

    // Messaging commands

    async fn handle_privmsg(&mut self, id: SessionId, params: Vec<String>) {
        let target = params[0].clone();
        let text = params[1].clone();

        if target.starts_with('#') || target.starts_with('&') {
            let chan_key = string::irc_lower(&target);
            let channel_name = match self.channels.get(&chan_key) {
                Some(channel) => {
                    if !channel.has_member(&id) {
                        let channel_name = channel.name.clone();
                        self.send_numeric(id, |n| NumericReply::not_on_channel(n, &channel_name));
                        return;
                    }
                    channel.name.clone()
                }
                None => {
                    self.send_numeric(id, |n| NumericReply::no_such_channel(n, &target));
                    return;
                }
            };
            if let Some(prefix) = self.client_prefix(id) {
                let message = Message::with_prefix(prefix, Command::PrivMsg, vec![channel_name])
                    .trailing(text);
                self.broadcast_to_channel(&chan_key, &message, Some(id));
            }
            return;
        }

        if self.deliver_to_service(id, &target, &text).await {
            return;
        }

        let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&target)) else {
            self.send_numeric(id, |n| NumericReply::no_such_nick(n, &target));
            return;
        };
        let (target_nick, target_away) = match self.clients.get(&target_id) {
            Some(client) => (client.nick.clone(), client.away_message.clone()),
            None => return,
        };
        if let Some(prefix) = self.client_prefix(id) {
            let message = Message::with_prefix(prefix, Command::PrivMsg, vec![target_nick.clone()])
                .trailing(text);
            self.send_to(target_id, message);
        }
        if let Some(away) = target_away {
            self.send_numeric(id, |n| NumericReply::away(n, &target_nick, &away));
        }
    }

    /// Route a PRIVMSG to a virtual client if one answers to the target nick.
    /// Returns true when the target was a virtual client.
    async fn deliver_to_service(&mut self, id: SessionId, target: &str, text: &str) -> bool {
        let Some(index) = self
            .services
            .iter()
            .position(|s| string::irc_eq(s.nick(), target))
        else {
            return false;
        };
        let from_nick = match self.clients.get(&id) {
            Some(client) => client.nick.clone(),
            None => return true,
        };

        let mut services = std::mem::take(&mut self.services);
        let replies = services[index].on_privmsg(&from_nick, text).await;
        let service_nick = services[index].nick().to_string();
        self.services = services;

        let prefix = service_prefix(&service_nick, &self.config.server.name);
        for reply in replies {
            let message =
                Message::with_prefix(prefix.clone(), Command::PrivMsg, vec![from_nick.clone()])
                    .trailing(reply);
            self.send_to(id, message);
        }
        true
    }

    /// NOTICE routes like PRIVMSG but never produces replies on failure
    fn handle_notice(&mut self, id: SessionId, params: Vec<String>) {
        let target = params[0].clone();
        let text = params[1].clone();

        if target.starts_with('#') || target.starts_with('&') {
            let chan_key = string::irc_lower(&target);
            let channel_name = match self.channels.get(&chan_key) {
                Some(channel) if channel.has_member(&id) => channel.name.clone(),
                _ => return,
            };
            if let Some(prefix) = self.client_prefix(id) {
                let message = Message::with_prefix(prefix, Command::Notice, vec![channel_name])
                    .trailing(text);
                self.broadcast_to_channel(&chan_key, &message, Some(id));
            }
            return;
        }

        // Virtual clients only answer PRIVMSG; a NOTICE to one is swallowed
        if self
            .services
            .iter()
            .any(|s| string::irc_eq(s.nick(), &target))
        {
            return;
        }

        let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&target)) else {
            return;
        };
        let target_nick = match self.clients.get(&target_id) {
            Some(client) => client.nick.clone(),
            None => return,
        };
        if let Some(prefix) = self.client_prefix(id) {
            let message =
                Message::with_prefix(prefix, Command::Notice, vec![target_nick]).trailing(text);
            self.send_to(target_id, message);
        }
    }

    // Miscellaneous commands

    fn handle_ping(&mut self, id: SessionId, params: Vec<String>) {
        let server = self.config.server.name.clone();
        let pong = Message::with_prefix(
            Prefix::Server(server.clone()),
            Command::Pong,
            vec![server],
        )
        .trailing(params[0].clone());
        self.send_to(id, pong);
    }

    fn handle_pong(&mut self, id: SessionId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.last_pong = Some(Utc::now());
        }
    }

    fn handle_away(&mut self, id: SessionId, params: Vec<String>) {
        let message = params.into_iter().next().filter(|m| !m.is_empty());
        let going_away = message.is_some();
        if let Some(client) = self.clients.get_mut(&id) {
            client.set_away(message);
        }
        if going_away {
            self.send_numeric(id, |n| NumericReply::now_away(n));
        } else {
            self.send_numeric(id, |n| NumericReply::unaway(n));
        }
    }

    fn handle_who(&mut self, id: SessionId, params: Vec<String>) {
        let mask = params.into_iter().next();
        let server = self.config.server.name.clone();

        match mask.as_deref() {
            Some(name) if name.starts_with('#') || name.starts_with('&') => {
                let chan_key = string::irc_lower(name);
                let rows = self.who_channel_rows(&chan_key);
                for (channel_name, username, host, nick, flags, realname) in rows {
                    self.send_numeric(id, |n| {
                        NumericReply::who_reply(
                            n,
                            &channel_name,
                            &username,
                            &host,
                            &server,
                            &nick,
                            &flags,
                            &realname,
                        )
                    });
                }
                let name = name.to_string();
                self.send_numeric(id, |n| NumericReply::end_of_who(n, &name));
            }
            Some(name) => {
                if let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(name)) {
                    if let Some(row) = self.who_user_row(target_id) {
                        let (username, host, nick, flags, realname) = row;
                        self.send_numeric(id, |n| {
                            NumericReply::who_reply(
                                n, "*", &username, &host, &server, &nick, &flags, &realname,
                            )
                        });
                    }
                }
                let name = name.to_string();
                self.send_numeric(id, |n| NumericReply::end_of_who(n, &name));
            }
            None => {
                let mut ids: Vec<SessionId> = self
                    .clients
                    .iter()
                    .filter(|(_, c)| c.is_registered())
                    .map(|(id, _)| *id)
                    .collect();
                ids.sort_by_key(|target| {
                    self.clients
                        .get(target)
                        .map(|c| c.nick.clone())
                        .unwrap_or_default()
                });
                for target in ids {
                    if let Some((username, host, nick, flags, realname)) =
                        self.who_user_row(target)
                    {
                        self.send_numeric(id, |n| {
                            NumericReply::who_reply(
                                n, "*", &username, &host, &server, &nick, &flags, &realname,
                            )
                        });
                    }
                }
                self.send_numeric(id, |n| NumericReply::end_of_who(n, "*"));
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn who_channel_rows(
        &self,
        chan_key: &str,
    ) -> Vec<(String, String, String, String, String, String)> {
        let Some(channel) = self.channels.get(chan_key) else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        for member in channel.members() {
            if let Some(client) = self.clients.get(&member.session) {
                let mut flags = String::from(if client.is_away() { "G" } else { "H" });
                if member.is_operator() {
                    flags.push('@');
                } else if member.has_voice() {
                    flags.push('+');
                }
                rows.push((
                    channel.name.clone(),
                    client.username.clone(),
                    client.host.clone(),
                    client.nick.clone(),
                    flags,
                    client.realname.clone(),
                ));
            }
        }
        rows
    }

    fn who_user_row(&self, id: SessionId) -> Option<(String, String, String, String, String)> {
        let client = self.clients.get(&id)?;
        let flags = String::from(if client.is_away() { "G" } else { "H" });
        Some((
            client.username.clone(),
            client.host.clone(),
            client.nick.clone(),
            flags,
            client.realname.clone(),
        ))
    }

    fn handle_whois(&mut self, id: SessionId, params: Vec<String>) {
        let mask = params[0]
            .split(',')
            .next()
            .unwrap_or_default()
            .to_string();
        let Some(&target_id) = self.nick_to_id.get(&string::irc_lower(&mask)) else {
            self.send_numeric(id, |n| NumericReply::no_such_nick(n, &mask));
            self.send_numeric(id, |n| NumericReply::end_of_whois(n, &mask));
            return;
        };

        let (nick, username, host, realname, away, is_operator, chan_keys, signon, idle) =
            match self.clients.get(&target_id) {
                Some(client) => (
                    client.nick.clone(),
                    client.username.clone(),
                    client.host.clone(),
                    client.realname.clone(),
                    client.away_message.clone(),
                    client.is_operator,
                    {
                        let mut keys: Vec<String> = client.channels.iter().cloned().collect();
                        keys.sort();
                        keys
                    },
                    client.connected_at.timestamp(),
                    (Utc::now() - client.last_activity).num_seconds().max(0),
                ),
                None => return,
            };

        let server = self.config.server.name.clone();
        let description = self.config.server.description.clone();

        self.send_numeric(id, |n| {
            NumericReply::whois_user(n, &nick, &username, &host, &realname)
        });

        let mut channel_entries = Vec::new();
        for chan_key in &chan_keys {
            if let Some(channel) = self.channels.get(chan_key) {
                let sigil = if channel.is_operator(&target_id) {
                    "@"
                } else if channel.has_voice(&target_id) {
                    "+"
                } else {
                    ""
                };
                channel_entries.push(format!("{}{}", sigil, channel.name));
            }
        }
        if !channel_entries.is_empty() {
            let channels = channel_entries.join(" ");
            self.send_numeric(id, |n| NumericReply::whois_channels(n, &nick, &channels));
        }

        self.send_numeric(id, |n| {
            NumericReply::whois_server(n, &nick, &server, &description)
        });
        if let Some(away) = away {
            self.send_numeric(id, |n| NumericReply::away(n, &nick, &away));
        }
        if is_operator {
            self.send_numeric(id, |n| NumericReply::whois_operator(n, &nick));
        }
        self.send_numeric(id, |n| NumericReply::whois_idle(n, &nick, idle, signon));
        self.send_numeric(id, |n| NumericReply::end_of_whois(n, &nick));
    }
}

/// Drain a session's outbound queue into its socket.
///
/// Runs until the queue's sender is dropped (session teardown) or the
/// socket fails; then shuts the write half down, flushing what the kernel
/// already accepted.
async fn writer_task(mut write_half: OwnedWriteHalf, mut outbound: mpsc::Receiver<String>) {
    while let Some(line) = outbound.recv().await {
        if write_half.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Read a session's socket, reassemble lines and forward them to the server
/// loop. Sends Closed exactly once on EOF or error.
async fn reader_task(
    id: SessionId,
    mut read_half: OwnedReadHalf,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut framer = LineFramer::new();
    let mut buffer = [0u8; READ_BUFFER_BYTES];
    loop {
        match read_half.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                framer.push(&buffer[..n]);
                while let Some(line) = framer.next_line() {
                    if events.send(SessionEvent::Line(id, line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    let _ = events.send(SessionEvent::Closed(id));
}
