//! Channel state and membership

use crate::client::SessionId;
use crate::utils::string;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Why a JOIN was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDenied {
    /// Channel is +i and the nick is not invited
    InviteOnly,
    /// Channel is +k and the key does not match
    BadKey,
    /// Channel is +l and at capacity
    Full,
}

/// A member and their channel-level flags
#[derive(Debug, Clone)]
pub struct ChannelMember {
    /// Session handle of the member
    pub session: SessionId,
    /// Member flags, a subset of {'o', 'v'}
    pub modes: HashSet<char>,
}

impl ChannelMember {
    fn new(session: SessionId) -> Self {
        Self {
            session,
            modes: HashSet::new(),
        }
    }

    /// Check if the member is a channel operator
    pub fn is_operator(&self) -> bool {
        self.modes.contains(&'o')
    }

    /// Check if the member has voice
    pub fn has_voice(&self) -> bool {
        self.modes.contains(&'v')
    }
}

/// A named message fan-out group.
///
/// Members are kept in join order so NAMES and WHO list them the way they
/// arrived. A channel always has at least one member; the server deletes it
/// when the last member leaves.
#[derive(Debug)]
pub struct Channel {
    /// Channel name in its original case
    pub name: String,
    /// Topic; empty when unset
    pub topic: String,
    /// Channel modes, a subset of {'i', 't', 'k', 'l'}
    modes: HashSet<char>,
    /// Channel key, relevant while +k
    key: Option<String>,
    /// Member cap, relevant while +l
    user_limit: Option<usize>,
    /// Members in join order
    members: Vec<ChannelMember>,
    /// Lowercased nicks invited while +i
    invited: HashSet<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Create a channel with its creator as the first member and operator
    pub fn new(name: String, creator: SessionId) -> Self {
        let mut channel = Self {
            name,
            topic: String::new(),
            modes: HashSet::new(),
            key: None,
            user_limit: None,
            members: Vec::new(),
            invited: HashSet::new(),
            created_at: Utc::now(),
        };
        channel.add_member(creator, true);
        channel
    }

    /// Add a member. Returns false if already present.
    pub fn add_member(&mut self, session: SessionId, as_operator: bool) -> bool {
        if self.has_member(&session) {
            return false;
        }
        let mut member = ChannelMember::new(session);
        if as_operator {
            member.modes.insert('o');
        }
        self.members.push(member);
        true
    }

    /// Remove a member. Returns false if not present.
    pub fn remove_member(&mut self, session: &SessionId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.session != *session);
        self.members.len() != before
    }

    /// Check membership
    pub fn has_member(&self, session: &SessionId) -> bool {
        self.members.iter().any(|m| m.session == *session)
    }

    /// Members in join order
    pub fn members(&self) -> &[ChannelMember] {
        &self.members
    }

    /// Member session handles in join order
    pub fn member_ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.members.iter().map(|m| m.session)
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// True when the last member has left
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a member is a channel operator
    pub fn is_operator(&self, session: &SessionId) -> bool {
        self.member(session).is_some_and(|m| m.is_operator())
    }

    /// Check if a member has voice
    pub fn has_voice(&self, session: &SessionId) -> bool {
        self.member(session).is_some_and(|m| m.has_voice())
    }

    /// Grant or revoke channel operator status; no-op for non-members
    pub fn set_operator(&mut self, session: &SessionId, operator: bool) {
        Self::set_member_mode(self.member_mut(session), 'o', operator);
    }

    /// Grant or revoke voice; no-op for non-members
    pub fn set_voice(&mut self, session: &SessionId, voice: bool) {
        Self::set_member_mode(self.member_mut(session), 'v', voice);
    }

    /// Check a channel mode flag
    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.contains(&mode)
    }

    /// Set or clear a channel mode flag
    pub fn set_mode(&mut self, mode: char, enabled: bool) {
        if enabled {
            self.modes.insert(mode);
        } else {
            self.modes.remove(&mode);
        }
    }

    /// Channel key, relevant while +k
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Set or clear the key, toggling +k accordingly
    pub fn set_key(&mut self, key: Option<String>) {
        self.set_mode('k', key.is_some());
        self.key = key;
    }

    /// Member cap, relevant while +l
    pub fn user_limit(&self) -> Option<usize> {
        self.user_limit
    }

    /// Set or clear the member cap, toggling +l accordingly
    pub fn set_user_limit(&mut self, limit: Option<usize>) {
        self.set_mode('l', limit.is_some());
        self.user_limit = limit;
    }

    /// Current modes and their parameters, for RPL_CHANNELMODEIS and MODE
    /// broadcasts. Flags come out in the fixed order i, t, k, l.
    pub fn mode_description(&self) -> (String, Vec<String>) {
        let mut modes = String::from("+");
        let mut params = Vec::new();
        if self.has_mode('i') {
            modes.push('i');
        }
        if self.has_mode('t') {
            modes.push('t');
        }
        if self.has_mode('k') {
            modes.push('k');
            if let Some(ref key) = self.key {
                params.push(key.clone());
            }
        }
        if self.has_mode('l') {
            modes.push('l');
            if let Some(limit) = self.user_limit {
                params.push(limit.to_string());
            }
        }
        (modes, params)
    }

    /// Check whether a client may join, in the order invite, key, limit
    pub fn can_join(&self, nick: &str, key: Option<&str>) -> Result<(), JoinDenied> {
        if self.has_mode('i') && !self.is_invited(nick) {
            return Err(JoinDenied::InviteOnly);
        }
        if self.has_mode('k') && key != self.key.as_deref() {
            return Err(JoinDenied::BadKey);
        }
        if let Some(limit) = self.user_limit {
            if self.has_mode('l') && self.members.len() >= limit {
                return Err(JoinDenied::Full);
            }
        }
        Ok(())
    }

    /// Members may change the topic unless +t reserves it for operators
    pub fn can_change_topic(&self, session: &SessionId) -> bool {
        if !self.has_member(session) {
            return false;
        }
        !self.has_mode('t') || self.is_operator(session)
    }

    /// Record an invitation for a nick (case-insensitive)
    pub fn invite(&mut self, nick: &str) {
        self.invited.insert(string::irc_lower(nick));
    }

    /// Check whether a nick has a pending invitation
    pub fn is_invited(&self, nick: &str) -> bool {
        self.invited.contains(&string::irc_lower(nick))
    }

    /// Consume a pending invitation
    pub fn remove_invite(&mut self, nick: &str) {
        self.invited.remove(&string::irc_lower(nick));
    }

    fn member(&self, session: &SessionId) -> Option<&ChannelMember> {
        self.members.iter().find(|m| m.session == *session)
    }

    fn member_mut(&mut self, session: &SessionId) -> Option<&mut ChannelMember> {
        self.members.iter_mut().find(|m| m.session == *session)
    }

    fn set_member_mode(member: Option<&mut ChannelMember>, mode: char, enabled: bool) {
        if let Some(member) = member {
            if enabled {
                member.modes.insert(mode);
            } else {
                member.modes.remove(&mode);
            }
        }
    }
}
