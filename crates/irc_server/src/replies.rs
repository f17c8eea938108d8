//! Numeric server replies (RFC 2812 section 5). Each variant carries exactly the fields its
//! format string needs; `format` renders the final wire line (without the trailing CRLF, which
//! `message::Message` / the writer task appends).

use crate::constants::*;
use crate::errors::HandlerError;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum IrcReply {
    Welcome { nick: String, user: String, host: String },
    YourHost { nick: String, server_version: String },
    Created { nick: String, date: String },
    MyInfo { nick: String, modes: String },

    UModeIs { nick: String, modes: String },

    WhoisUser { nick: String, target: String, user: String, host: String, realname: String },
    WhoisServer { nick: String, target: String, server: String, info: String },
    WhoisIdle { nick: String, target: String, idle_secs: u64 },
    EndOfWhois { nick: String, target: String },

    WhowasUser { nick: String, target: String, user: String, host: String, realname: String },
    EndOfWhowas { nick: String, target: String },

    List { nick: String, channel: String, visible: usize, topic: String },
    ListEnd { nick: String },

    ChannelModeIs { nick: String, channel: String, modes: String },

    NoTopic { nick: String, channel: String },
    Topic { nick: String, channel: String, topic: String },

    Inviting { nick: String, target: String, channel: String },

    Version { nick: String, version: String },

    WhoReply {
        nick: String,
        channel: String,
        user: String,
        host: String,
        target: String,
        flags: String,
        realname: String,
    },
    EndOfWho { nick: String, mask: String },

    NamReply { nick: String, symbol: char, channel: String, names: Vec<String> },
    EndOfNames { nick: String, channel: String },

    Links { nick: String, mask: String },
    EndOfLinks { nick: String, mask: String },

    StatsLinkInfo { nick: String },
    EndOfStats { nick: String, query: String },

    ErrNoSuchNick { nick: String, target: String },
    ErrNoSuchChannel { nick: String, channel: String },
    ErrWasNoSuchNick { nick: String, target: String },
    ErrUnknownCommand { nick: String, command: String },
    ErrNoNicknameGiven { nick: String },
    ErrNicknameInUse { nick: String, attempted: String },
    ErrUserNotInChannel { nick: String, target: String, channel: String },
    ErrNotOnChannel { nick: String, channel: String },
    ErrNotRegistered { nick: String },
    ErrNeedMoreParams { nick: String, command: String },
    ErrUModeUnknownFlag { nick: String },
    ErrUsersDontMatch { nick: String },
    ErrChanOPrivsNeeded { nick: String, channel: String },
    ErrNoPrivileges { nick: String },
    ErrNoSuchServer { nick: String, server: String },
    ErrPasswdMismatch { nick: String },
    ErrSummonDisabled { nick: String },
    ErrUsersDisabled { nick: String },
    ErrTooManyChannels { nick: String, channel: String },

    Away { nick: String, target: String, message: String },
    UnAway { nick: String },
    NowAway { nick: String },

    UserHost { nick: String, entries: Vec<String> },
    IsOn { nick: String, present: Vec<String> },

    LuserClient { nick: String, users: usize },
    LuserOp { nick: String, ops: usize },
    LuserUnknown { nick: String, unknown: usize },
    LuserChannels { nick: String, channels: usize },
    LuserMe { nick: String, users: usize },

    AdminMe { nick: String, server: String },
    AdminLoc1 { nick: String, text: String },
    AdminLoc2 { nick: String, text: String },
    AdminEmail { nick: String, text: String },

    Info { nick: String, text: String },
    EndOfInfo { nick: String },

    MotdStart { nick: String, server: String },
    Motd { nick: String, line: String },
    EndOfMotd { nick: String },

    YoureOper { nick: String },
    Rehashing { nick: String },

    Time { nick: String, server: String, time: String },

    ServListEnd { nick: String },
}

impl IrcReply {
    pub fn format(&self, server_name: &str) -> String {
        match self {
            IrcReply::Welcome { nick, user, host } => format!(
                ":{server_name} {RPL_WELCOME_NB:03} {nick} :Bienvenido al servidor {nick}!{user}@{host}"
            ),
            IrcReply::YourHost { nick, server_version } => format!(
                ":{server_name} {RPL_YOURHOST_NB:03} {nick} :Tu host es {server_name}, corriendo version {server_version}"
            ),
            IrcReply::Created { nick, date } => format!(
                ":{server_name} {RPL_CREATED_NB:03} {nick} :Este servidor fue creado {date}"
            ),
            IrcReply::MyInfo { nick, modes } => format!(
                ":{server_name} {RPL_MYINFO_NB:03} {nick} {server_name} {SERVER_VERSION} {modes} {CHANNEL_MODES_SUPPORTED}"
            ),

            IrcReply::UModeIs { nick, modes } => {
                format!(":{server_name} {RPL_UMODEIS_NB:03} {nick} :{modes}")
            }

            IrcReply::WhoisUser { nick, target, user, host, realname } => format!(
                ":{server_name} {RPL_WHOISUSER_NB:03} {nick} {target} {user} {host} * :{realname}"
            ),
            IrcReply::WhoisServer { nick, target, server, info } => format!(
                ":{server_name} {RPL_WHOISSERVER_NB:03} {nick} {target} {server} :{info}"
            ),
            IrcReply::WhoisIdle { nick, target, idle_secs } => format!(
                ":{server_name} {RPL_WHOISIDLE_NB:03} {nick} {target} {idle_secs} :seconds idle"
            ),
            IrcReply::EndOfWhois { nick, target } => format!(
                ":{server_name} {RPL_ENDOFWHOIS_NB:03} {nick} {target} :End of WHOIS list"
            ),

            IrcReply::WhowasUser { nick, target, user, host, realname } => format!(
                ":{server_name} {RPL_WHOWASUSER_NB:03} {nick} {target} {user} {host} * :{realname}"
            ),
            IrcReply::EndOfWhowas { nick, target } => format!(
                ":{server_name} {RPL_ENDOFWHOWAS_NB:03} {nick} {target} :End of WHOWAS"
            ),

            IrcReply::List { nick, channel, visible, topic } => format!(
                ":{server_name} {RPL_LIST_NB:03} {nick} {channel} {visible} :{topic}"
            ),
            IrcReply::ListEnd { nick } => {
                format!(":{server_name} {RPL_LISTEND_NB:03} {nick} :End of LIST")
            }

            IrcReply::ChannelModeIs { nick, channel, modes } => format!(
                ":{server_name} {RPL_CHANNELMODEIS_NB:03} {nick} {channel} {modes}"
            ),

            IrcReply::NoTopic { nick, channel } => format!(
                ":{server_name} {RPL_NOTOPIC_NB:03} {nick} {channel} :No topic is set"
            ),
            IrcReply::Topic { nick, channel, topic } => {
                format!(":{server_name} {RPL_TOPIC_NB:03} {nick} {channel} :{topic}")
            }

            IrcReply::Inviting { nick, target, channel } => format!(
                ":{server_name} {RPL_INVITING_NB:03} {nick} {target} {channel}"
            ),

            IrcReply::Version { nick, version } => {
                format!(":{server_name} {RPL_VERSION_NB:03} {nick} {version}.{server_name}")
            }

            IrcReply::WhoReply { nick, channel, user, host, target, flags, realname } => format!(
                ":{server_name} {RPL_WHOREPLY_NB:03} {nick} {channel} {user} {host} {server_name} {target} {flags} :0 {realname}"
            ),
            IrcReply::EndOfWho { nick, mask } => format!(
                ":{server_name} {RPL_ENDOFWHO_NB:03} {nick} {mask} :End of WHO list"
            ),

            IrcReply::NamReply { nick, symbol, channel, names } => {
                let joined = names.join(" ");
                format!(":{server_name} {RPL_NAMREPLY_NB:03} {nick} {symbol} {channel} :{joined}")
            }
            IrcReply::EndOfNames { nick, channel } => format!(
                ":{server_name} {RPL_ENDOFNAMES_NB:03} {nick} {channel} :End of NAMES list"
            ),

            IrcReply::Links { nick, mask } => format!(
                ":{server_name} {RPL_LINKS_NB:03} {nick} {mask} {server_name} :0 {server_name}"
            ),
            IrcReply::EndOfLinks { nick, mask } => format!(
                ":{server_name} {RPL_ENDOFLINKS_NB:03} {nick} {mask} :End of LINKS list"
            ),

            IrcReply::StatsLinkInfo { nick } => format!(
                ":{server_name} {RPL_STATSLINKINFO_NB:03} {nick} :0 0 0 0 0"
            ),
            IrcReply::EndOfStats { nick, query } => format!(
                ":{server_name} {RPL_ENDOFSTATS_NB:03} {nick} {query} :End of STATS report"
            ),

            IrcReply::ErrNoSuchNick { nick, target } => format!(
                ":{server_name} {ERR_NOSUCHNICK_NB:03} {nick} {target} :{ERR_NOSUCHNICK_STR}"
            ),
            IrcReply::ErrNoSuchChannel { nick, channel } => format!(
                ":{server_name} {ERR_NOSUCHCHANNEL_NB:03} {nick} {channel} :{ERR_NOSUCHCHANNEL_STR}"
            ),
            IrcReply::ErrWasNoSuchNick { nick, target } => format!(
                ":{server_name} {ERR_WASNOSUCHNICK_NB:03} {nick} {target} :{ERR_WASNOSUCHNICK_STR}"
            ),
            IrcReply::ErrUnknownCommand { nick, command } => format!(
                ":{server_name} {ERR_UNKNOWNCOMMAND_NB:03} {nick} {command} :{ERR_UNKNOWNCOMMAND_STR}"
            ),
            IrcReply::ErrNoNicknameGiven { nick } => format!(
                ":{server_name} {ERR_NONICKNAMEGIVEN_NB:03} {nick} :{ERR_NONICKNAMEGIVEN_STR}"
            ),
            IrcReply::ErrNicknameInUse { nick, attempted } => format!(
                ":{server_name} {ERR_NICKNAMEINUSE_NB:03} {nick} {attempted} :{ERR_NICKNAMEINUSE_STR}"
            ),
            IrcReply::ErrUserNotInChannel { nick, target, channel } => format!(
                ":{server_name} {ERR_USERNOTINCHANNEL_NB:03} {nick} {target} {channel} :{ERR_USERNOTINCHANNEL_STR}"
            ),
            IrcReply::ErrNotOnChannel { nick, channel } => format!(
                ":{server_name} {ERR_NOTONCHANNEL_NB:03} {nick} {channel} :{ERR_NOTONCHANNEL_STR}"
            ),
            IrcReply::ErrNotRegistered { nick } => format!(
                ":{server_name} {ERR_NOTREGISTERED_NB:03} {nick} :{ERR_NOTREGISTERED_STR}"
            ),
            IrcReply::ErrNeedMoreParams { nick, command } => format!(
                ":{server_name} {ERR_NEEDMOREPARAMS_NB:03} {nick} {command} :{ERR_NEEDMOREPARAMS_STR}"
            ),
            IrcReply::ErrUModeUnknownFlag { nick } => format!(
                ":{server_name} {ERR_UMODEUNKNOWNFLAG_NB:03} {nick} :{ERR_UMODEUNKNOWNFLAG_STR}"
            ),
            IrcReply::ErrUsersDontMatch { nick } => format!(
                ":{server_name} {ERR_USERSDONTMATCH_NB:03} {nick} :{ERR_USERSDONTMATCH_STR}"
            ),
            IrcReply::ErrChanOPrivsNeeded { nick, channel } => format!(
                ":{server_name} {ERR_CHANOPRIVSNEEDED_NB:03} {nick} {channel} :{ERR_CHANOPRIVSNEEDED_STR}"
            ),
            IrcReply::ErrNoPrivileges { nick } => format!(
                ":{server_name} {ERR_NOPRIVILEGES_NB:03} {nick} :{ERR_NOPRIVILEGES_STR}"
            ),
            IrcReply::ErrNoSuchServer { nick, server } => format!(
                ":{server_name} {ERR_NOSUCHSERVER_NB:03} {nick} {server} :{ERR_NOSUCHSERVER_STR}"
            ),
            IrcReply::ErrPasswdMismatch { nick } => format!(
                ":{server_name} {ERR_PASSWDMISMATCH_NB:03} {nick} :{ERR_PASSWDMISMATCH_STR}"
            ),
            IrcReply::ErrSummonDisabled { nick } => format!(
                ":{server_name} {ERR_SUMMONDISABLED_NB:03} {nick} :{ERR_SUMMONDISABLED_STR}"
            ),
            IrcReply::ErrUsersDisabled { nick } => format!(
                ":{server_name} {ERR_USERSDISABLED_NB:03} {nick} :{ERR_USERSDISABLED_STR}"
            ),
            IrcReply::ErrTooManyChannels { nick, channel } => format!(
                ":{server_name} {ERR_TOOMANYCHANNELS_NB:03} {nick} {channel} :{ERR_TOOMANYCHANNELS_STR}"
            ),

            IrcReply::Away { nick, target, message } => format!(
                ":{server_name} {RPL_AWAY_NB:03} {nick} {target} :{message}"
            ),
            IrcReply::UnAway { nick } => format!(
                ":{server_name} {RPL_UNAWAY_NB:03} {nick} :You are no longer marked as being away"
            ),
            IrcReply::NowAway { nick } => format!(
                ":{server_name} {RPL_NOWAWAY_NB:03} {nick} :You have been marked as being away"
            ),

            IrcReply::UserHost { nick, entries } => format!(
                ":{server_name} {RPL_USERHOST_NB:03} {nick} :{}", entries.join(" ")
            ),
            IrcReply::IsOn { nick, present } => format!(
                ":{server_name} {RPL_ISON_NB:03} {nick} :{}", present.join(" ")
            ),

            IrcReply::LuserClient { nick, users } => format!(
                ":{server_name} {RPL_LUSERCLIENT_NB:03} {nick} :There are {users} users on 1 server"
            ),
            IrcReply::LuserOp { nick, ops } => format!(
                ":{server_name} {RPL_LUSEROP_NB:03} {nick} {ops} :operator(s) online"
            ),
            IrcReply::LuserUnknown { nick, unknown } => format!(
                ":{server_name} {RPL_LUSERUNKNOWN_NB:03} {nick} {unknown} :unknown connection(s)"
            ),
            IrcReply::LuserChannels { nick, channels } => format!(
                ":{server_name} {RPL_LUSERCHANNELS_NB:03} {nick} {channels} :channels formed"
            ),
            IrcReply::LuserMe { nick, users } => format!(
                ":{server_name} {RPL_LUSERME_NB:03} {nick} :I have {users} clients and 1 server"
            ),

            IrcReply::AdminMe { nick, server } => format!(
                ":{server_name} {RPL_ADMINME_NB:03} {nick} {server} :Administrative info"
            ),
            IrcReply::AdminLoc1 { nick, text } => format!(
                ":{server_name} {RPL_ADMINLOC1_NB:03} {nick} :{text}"
            ),
            IrcReply::AdminLoc2 { nick, text } => format!(
                ":{server_name} {RPL_ADMINLOC2_NB:03} {nick} :{text}"
            ),
            IrcReply::AdminEmail { nick, text } => format!(
                ":{server_name} {RPL_ADMINEMAIL_NB:03} {nick} :{text}"
            ),

            IrcReply::Info { nick, text } => format!(":{server_name} {RPL_INFO_NB:03} {nick} :{text}"),
            IrcReply::EndOfInfo { nick } => format!(
                ":{server_name} {RPL_ENDOFINFO_NB:03} {nick} :End of INFO list"
            ),

            IrcReply::MotdStart { nick, server } => format!(
                ":{server_name} {RPL_MOTDSTART_NB:03} {nick} :- {server} Message of the day -"
            ),
            IrcReply::Motd { nick, line } => format!(
                ":{server_name} {RPL_MOTD_NB:03} {nick} :- {line}"
            ),
            IrcReply::EndOfMotd { nick } => format!(
                ":{server_name} {RPL_ENDOFMOTD_NB:03} {nick} :End of MOTD command"
            ),

            IrcReply::YoureOper { nick } => format!(
                ":{server_name} {RPL_YOUREOPER_NB:03} {nick} :You are now an IRC operator"
            ),
            IrcReply::Rehashing { nick } => format!(
                ":{server_name} {RPL_REHASHING_NB:03} {nick} ircd.conf :Rehashing"
            ),

            IrcReply::Time { nick, server, time } => format!(
                ":{server_name} {RPL_TIME_NB:03} {nick} {server} :{time}"
            ),

            IrcReply::ServListEnd { nick } => format!(
                ":{server_name} {RPL_SERVLISTEND_NB:03} {nick} * * * * 0 :End of SERVLIST"
            ),
        }
    }
}

impl IrcReply {
    /// Maps a handler's semantic-miss error onto the numeric reply it corresponds to. `nick`
    /// is the client's own nickname (or `*` before registration), which is reply field 1 for
    /// nearly every numeric in the table.
    pub fn from_handler_error(err: &HandlerError, nick: &str) -> IrcReply {
        let nick = nick.to_string();
        match err {
            HandlerError::UnknownCommand(command) => IrcReply::ErrUnknownCommand {
                nick,
                command: command.clone(),
            },
            HandlerError::NeedMoreParams(command) => IrcReply::ErrNeedMoreParams {
                nick,
                command: command.clone(),
            },
            HandlerError::NotRegistered => IrcReply::ErrNotRegistered { nick },
            HandlerError::NoNicknameGiven => IrcReply::ErrNoNicknameGiven { nick },
            HandlerError::NicknameInUse(attempted) => IrcReply::ErrNicknameInUse {
                nick,
                attempted: attempted.clone(),
            },
            HandlerError::NoSuchNick(target) => IrcReply::ErrNoSuchNick {
                nick,
                target: target.clone(),
            },
            HandlerError::NoSuchChannel(channel) => IrcReply::ErrNoSuchChannel {
                nick,
                channel: channel.clone(),
            },
            HandlerError::NotOnChannel(channel) => IrcReply::ErrNotOnChannel {
                nick,
                channel: channel.clone(),
            },
            HandlerError::UserNotInChannel(target, channel) => IrcReply::ErrUserNotInChannel {
                nick,
                target: target.clone(),
                channel: channel.clone(),
            },
            HandlerError::ChanOPrivsNeeded(channel) => IrcReply::ErrChanOPrivsNeeded {
                nick,
                channel: channel.clone(),
            },
            HandlerError::NoPrivileges => IrcReply::ErrNoPrivileges { nick },
            HandlerError::NoSuchWhowas(target) => IrcReply::ErrWasNoSuchNick {
                nick,
                target: target.clone(),
            },
            HandlerError::UModeUnknownFlag => IrcReply::ErrUModeUnknownFlag { nick },
            HandlerError::UsersDontMatch => IrcReply::ErrUsersDontMatch { nick },
            HandlerError::PasswdMismatch => IrcReply::ErrPasswdMismatch { nick },
        }
    }
}

/// Renders the CAP negotiation stub line; the server supports no capabilities, so every CAP
/// LS/LIST/REQ gets an empty list and the client falls back to plain registration.
pub fn cap_reply(nick: &str, subcommand: &str) -> String {
    format!("CAP {nick} {subcommand} :")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_has_correct_numeric() {
        let r = IrcReply::Welcome {
            nick: "alice".into(),
            user: "alice".into(),
            host: "localhost".into(),
        };
        let line = r.format("mock.server");
        assert!(line.starts_with(":mock.server 001 alice"));
    }

    #[test]
    fn nam_reply_joins_names_with_spaces() {
        let r = IrcReply::NamReply {
            nick: "alice".into(),
            symbol: '=',
            channel: "#x".into(),
            names: vec!["alice".into(), "@bob".into()],
        };
        assert_eq!(
            r.format("mock.server"),
            ":mock.server 353 alice = #x :alice @bob"
        );
    }

    #[test]
    fn err_nicknameinuse_matches_rfc_numeric() {
        let r = IrcReply::ErrNicknameInUse {
            nick: "*".into(),
            attempted: "bob".into(),
        };
        assert!(r.format("mock.server").contains(" 433 "));
    }
}
