//! IRC numeric replies as defined in RFC 1459
//!
//! Every reply addresses a target, which is the client's nickname or `*`
//! before a nickname has been chosen. The server prefix is added at send
//! time.

use crate::{Command, Message};

/// IRC numeric reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericReply {
    // Connection registration
    RplWelcome = 1,
    RplYourHost = 2,
    RplCreated = 3,
    RplMyInfo = 4,

    // Command responses
    RplUmodeIs = 221,
    RplLuserClient = 251,
    RplLuserOp = 252,
    RplLuserChannels = 254,
    RplLuserMe = 255,
    RplAway = 301,
    RplUnaway = 305,
    RplNowAway = 306,
    RplWhoisUser = 311,
    RplWhoisServer = 312,
    RplWhoisOperator = 313,
    RplEndOfWho = 315,
    RplWhoisIdle = 317,
    RplEndOfWhois = 318,
    RplWhoisChannels = 319,
    RplListStart = 321,
    RplList = 322,
    RplListEnd = 323,
    RplChannelModeIs = 324,
    RplNoTopic = 331,
    RplTopic = 332,
    RplInviting = 341,
    RplWhoReply = 352,
    RplNameReply = 353,
    RplEndOfNames = 366,
    RplMotd = 372,
    RplMotdStart = 375,
    RplEndOfMotd = 376,
    RplYoureOper = 381,

    // Error replies
    ErrNoSuchNick = 401,
    ErrNoSuchChannel = 403,
    ErrUnknownCommand = 421,
    ErrErroneousNickname = 432,
    ErrNicknameInUse = 433,
    ErrUserNotInChannel = 441,
    ErrNotOnChannel = 442,
    ErrUserOnChannel = 443,
    ErrNotRegistered = 451,
    ErrNeedMoreParams = 461,
    ErrAlreadyRegistered = 462,
    ErrPasswordMismatch = 464,
    ErrChannelIsFull = 471,
    ErrUnknownMode = 472,
    ErrInviteOnlyChan = 473,
    ErrBadChannelKey = 475,
    ErrChanOpPrivsNeeded = 482,
    ErrUmodeUnknownFlag = 501,
    ErrUsersDontMatch = 502,
}

impl NumericReply {
    /// Get the numeric code as a three-digit string
    pub fn code(&self) -> String {
        format!("{:03}", *self as u16)
    }

    /// Create a numeric reply message addressed to `target`
    pub fn reply(&self, target: &str, params: Vec<String>) -> Message {
        let mut all_params = vec![target.to_string()];
        all_params.extend(params);

        Message::new(Command::Custom(self.code()), all_params)
    }
}

/// Registration and command replies
impl NumericReply {
    /// RPL_WELCOME
    pub fn welcome(target: &str, nick: &str, user: &str, host: &str) -> Message {
        Self::RplWelcome.reply(target, vec![]).trailing(format!(
            "Welcome to the Internet Relay Network {}!{}@{}",
            nick, user, host
        ))
    }

    /// RPL_YOURHOST
    pub fn your_host(target: &str, server: &str, version: &str) -> Message {
        Self::RplYourHost
            .reply(target, vec![])
            .trailing(format!("Your host is {}, running version {}", server, version))
    }

    /// RPL_CREATED
    pub fn created(target: &str, date: &str) -> Message {
        Self::RplCreated
            .reply(target, vec![])
            .trailing(format!("This server was created {}", date))
    }

    /// RPL_MYINFO
    pub fn my_info(target: &str, server: &str, version: &str) -> Message {
        Self::RplMyInfo.reply(
            target,
            vec![
                server.to_string(),
                version.to_string(),
                "o".to_string(),
                "itklov".to_string(),
            ],
        )
    }

    /// RPL_LUSERCLIENT
    pub fn luser_client(target: &str, users: usize) -> Message {
        Self::RplLuserClient
            .reply(target, vec![])
            .trailing(format!("There are {} users and 0 invisible on 1 servers", users))
    }

    /// RPL_LUSEROP
    pub fn luser_op(target: &str, opers: usize) -> Message {
        Self::RplLuserOp
            .reply(target, vec![opers.to_string()])
            .trailing("operator(s) online")
    }

    /// RPL_LUSERCHANNELS
    pub fn luser_channels(target: &str, channels: usize) -> Message {
        Self::RplLuserChannels
            .reply(target, vec![channels.to_string()])
            .trailing("channels formed")
    }

    /// RPL_LUSERME
    pub fn luser_me(target: &str, clients: usize) -> Message {
        Self::RplLuserMe
            .reply(target, vec![])
            .trailing(format!("I have {} clients and 1 servers", clients))
    }

    /// RPL_UMODEIS
    pub fn umode_is(target: &str, modes: &str) -> Message {
        Self::RplUmodeIs.reply(target, vec![modes.to_string()])
    }

    /// RPL_AWAY
    pub fn away(target: &str, nick: &str, message: &str) -> Message {
        Self::RplAway
            .reply(target, vec![nick.to_string()])
            .trailing(message)
    }

    /// RPL_UNAWAY
    pub fn unaway(target: &str) -> Message {
        Self::RplUnaway
            .reply(target, vec![])
            .trailing("You are no longer marked as being away")
    }

    /// RPL_NOWAWAY
    pub fn now_away(target: &str) -> Message {
        Self::RplNowAway
            .reply(target, vec![])
            .trailing("You have been marked as being away")
    }

    /// RPL_WHOISUSER
    pub fn whois_user(target: &str, nick: &str, user: &str, host: &str, realname: &str) -> Message {
        Self::RplWhoisUser
            .reply(
                target,
                vec![
                    nick.to_string(),
                    user.to_string(),
                    host.to_string(),
                    "*".to_string(),
                ],
            )
            .trailing(realname)
    }

    /// RPL_WHOISSERVER
    pub fn whois_server(target: &str, nick: &str, server: &str, info: &str) -> Message {
        Self::RplWhoisServer
            .reply(target, vec![nick.to_string(), server.to_string()])
            .trailing(info)
    }

    /// RPL_WHOISOPERATOR
    pub fn whois_operator(target: &str, nick: &str) -> Message {
        Self::RplWhoisOperator
            .reply(target, vec![nick.to_string()])
            .trailing("is an IRC operator")
    }

    /// RPL_WHOISIDLE
    pub fn whois_idle(target: &str, nick: &str, idle_secs: i64, signon: i64) -> Message {
        Self::RplWhoisIdle
            .reply(
                target,
                vec![nick.to_string(), idle_secs.to_string(), signon.to_string()],
            )
            .trailing("seconds idle, signon time")
    }

    /// RPL_ENDOFWHOIS
    pub fn end_of_whois(target: &str, nick: &str) -> Message {
        Self::RplEndOfWhois
            .reply(target, vec![nick.to_string()])
            .trailing("End of WHOIS list")
    }

    /// RPL_WHOISCHANNELS
    pub fn whois_channels(target: &str, nick: &str, channels: &str) -> Message {
        Self::RplWhoisChannels
            .reply(target, vec![nick.to_string()])
            .trailing(channels)
    }

    /// RPL_WHOREPLY
    #[allow(clippy::too_many_arguments)]
    pub fn who_reply(
        target: &str,
        channel: &str,
        user: &str,
        host: &str,
        server: &str,
        nick: &str,
        flags: &str,
        realname: &str,
    ) -> Message {
        Self::RplWhoReply
            .reply(
                target,
                vec![
                    channel.to_string(),
                    user.to_string(),
                    host.to_string(),
                    server.to_string(),
                    nick.to_string(),
                    flags.to_string(),
                ],
            )
            .trailing(format!("0 {}", realname))
    }

    /// RPL_ENDOFWHO
    pub fn end_of_who(target: &str, mask: &str) -> Message {
        Self::RplEndOfWho
            .reply(target, vec![mask.to_string()])
            .trailing("End of WHO list")
    }

    /// RPL_LISTSTART
    pub fn list_start(target: &str) -> Message {
        Self::RplListStart
            .reply(target, vec!["Channel".to_string()])
            .trailing("Users Name")
    }

    /// RPL_LIST
    pub fn list_entry(target: &str, channel: &str, visible: usize, topic: &str) -> Message {
        Self::RplList
            .reply(target, vec![channel.to_string(), visible.to_string()])
            .trailing(topic)
    }

    /// RPL_LISTEND
    pub fn list_end(target: &str) -> Message {
        Self::RplListEnd
            .reply(target, vec![])
            .trailing("End of /LIST")
    }

    /// RPL_CHANNELMODEIS
    pub fn channel_mode_is(target: &str, channel: &str, modes: &str, params: Vec<String>) -> Message {
        let mut all = vec![channel.to_string(), modes.to_string()];
        all.extend(params);
        Self::RplChannelModeIs.reply(target, all)
    }

    /// RPL_NOTOPIC
    pub fn no_topic(target: &str, channel: &str) -> Message {
        Self::RplNoTopic
            .reply(target, vec![channel.to_string()])
            .trailing("No topic is set")
    }

    /// RPL_TOPIC
    pub fn topic(target: &str, channel: &str, topic: &str) -> Message {
        Self::RplTopic
            .reply(target, vec![channel.to_string()])
            .trailing(topic)
    }

    /// RPL_INVITING
    pub fn inviting(target: &str, nick: &str, channel: &str) -> Message {
        Self::RplInviting.reply(target, vec![nick.to_string(), channel.to_string()])
    }

    /// RPL_NAMREPLY
    pub fn name_reply(target: &str, channel: &str, names: &str) -> Message {
        Self::RplNameReply
            .reply(target, vec!["=".to_string(), channel.to_string()])
            .trailing(names)
    }

    /// RPL_ENDOFNAMES
    pub fn end_of_names(target: &str, channel: &str) -> Message {
        Self::RplEndOfNames
            .reply(target, vec![channel.to_string()])
            .trailing("End of /NAMES list")
    }

    /// RPL_MOTDSTART
    pub fn motd_start(target: &str, server: &str) -> Message {
        Self::RplMotdStart
            .reply(target, vec![])
            .trailing(format!("- {} Message of the day - ", server))
    }

    /// RPL_MOTD
    pub fn motd_line(target: &str, line: &str) -> Message {
        Self::RplMotd
            .reply(target, vec![])
            .trailing(format!("- {}", line))
    }

    /// RPL_ENDOFMOTD
    pub fn motd_end(target: &str) -> Message {
        Self::RplEndOfMotd
            .reply(target, vec![])
            .trailing("End of /MOTD command")
    }

    /// RPL_YOUREOPER
    pub fn youre_oper(target: &str) -> Message {
        Self::RplYoureOper
            .reply(target, vec![])
            .trailing("You are now an IRC operator")
    }
}

/// Error replies
impl NumericReply {
    /// ERR_NOSUCHNICK
    pub fn no_such_nick(target: &str, nick: &str) -> Message {
        Self::ErrNoSuchNick
            .reply(target, vec![nick.to_string()])
            .trailing("No such nick/channel")
    }

    /// ERR_NOSUCHCHANNEL
    pub fn no_such_channel(target: &str, channel: &str) -> Message {
        Self::ErrNoSuchChannel
            .reply(target, vec![channel.to_string()])
            .trailing("No such channel")
    }

    /// ERR_UNKNOWNCOMMAND
    pub fn unknown_command(target: &str, command: &str) -> Message {
        Self::ErrUnknownCommand
            .reply(target, vec![command.to_string()])
            .trailing("Unknown command")
    }

    /// ERR_ERRONEUSNICKNAME
    pub fn erroneous_nickname(target: &str, nick: &str) -> Message {
        Self::ErrErroneousNickname
            .reply(target, vec![nick.to_string()])
            .trailing("Erroneous nickname")
    }

    /// ERR_NICKNAMEINUSE
    pub fn nickname_in_use(target: &str, nick: &str) -> Message {
        Self::ErrNicknameInUse
            .reply(target, vec![nick.to_string()])
            .trailing("Nickname is already in use")
    }

    /// ERR_USERNOTINCHANNEL
    pub fn user_not_in_channel(target: &str, nick: &str, channel: &str) -> Message {
        Self::ErrUserNotInChannel
            .reply(target, vec![nick.to_string(), channel.to_string()])
            .trailing("They aren't on that channel")
    }

    /// ERR_NOTONCHANNEL
    pub fn not_on_channel(target: &str, channel: &str) -> Message {
        Self::ErrNotOnChannel
            .reply(target, vec![channel.to_string()])
            .trailing("You're not on that channel")
    }

    /// ERR_USERONCHANNEL
    pub fn user_on_channel(target: &str, nick: &str, channel: &str) -> Message {
        Self::ErrUserOnChannel
            .reply(target, vec![nick.to_string(), channel.to_string()])
            .trailing("is already on channel")
    }

    /// ERR_NOTREGISTERED
    pub fn not_registered(target: &str) -> Message {
        Self::ErrNotRegistered
            .reply(target, vec![])
            .trailing("You have not registered")
    }

    /// ERR_NEEDMOREPARAMS
    pub fn need_more_params(target: &str, command: &str) -> Message {
        Self::ErrNeedMoreParams
            .reply(target, vec![command.to_string()])
            .trailing("Not enough parameters")
    }

    /// ERR_ALREADYREGISTRED
    pub fn already_registered(target: &str) -> Message {
        Self::ErrAlreadyRegistered
            .reply(target, vec![])
            .trailing("You may not reregister")
    }

    /// ERR_PASSWDMISMATCH
    pub fn password_mismatch(target: &str) -> Message {
        Self::ErrPasswordMismatch
            .reply(target, vec![])
            .trailing("Password incorrect")
    }

    /// ERR_PASSWDMISMATCH sent when a command arrives before a valid PASS
    pub fn password_required(target: &str) -> Message {
        Self::ErrPasswordMismatch
            .reply(target, vec![])
            .trailing("You must send a valid PASS first")
    }

    /// ERR_CHANNELISFULL
    pub fn channel_is_full(target: &str, channel: &str) -> Message {
        Self::ErrChannelIsFull
            .reply(target, vec![channel.to_string()])
            .trailing("Cannot join channel (+l)")
    }

    /// ERR_UNKNOWNMODE
    pub fn unknown_mode(target: &str, mode: char) -> Message {
        Self::ErrUnknownMode
            .reply(target, vec![mode.to_string()])
            .trailing("is unknown mode char to me")
    }

    /// ERR_INVITEONLYCHAN
    pub fn invite_only_chan(target: &str, channel: &str) -> Message {
        Self::ErrInviteOnlyChan
            .reply(target, vec![channel.to_string()])
            .trailing("Cannot join channel (+i)")
    }

    /// ERR_BADCHANNELKEY
    pub fn bad_channel_key(target: &str, channel: &str) -> Message {
        Self::ErrBadChannelKey
            .reply(target, vec![channel.to_string()])
            .trailing("Cannot join channel (+k)")
    }

    /// ERR_CHANOPRIVSNEEDED
    pub fn chanop_privs_needed(target: &str, channel: &str) -> Message {
        Self::ErrChanOpPrivsNeeded
            .reply(target, vec![channel.to_string()])
            .trailing("You're not channel operator")
    }

    /// ERR_UMODEUNKNOWNFLAG
    pub fn umode_unknown_flag(target: &str, message: &str) -> Message {
        Self::ErrUmodeUnknownFlag
            .reply(target, vec![])
            .trailing(message)
    }

    /// ERR_USERSDONTMATCH
    pub fn users_dont_match(target: &str) -> Message {
        Self::ErrUsersDontMatch
            .reply(target, vec![])
            .trailing("Cannot change mode for other users")
    }
}
