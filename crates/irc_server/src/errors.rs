use thiserror::Error;

/// Failures from the wire codec (C1). Always non-fatal: the offending line is discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("line exceeds 512 bytes ({0})")]
    LineTooLong(usize),
}

/// Failures that tear a connection down: read EOF, write failure, TLS handshake.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls handshake failed: {0}")]
    Tls(String),
}

/// Semantic-miss and protocol-violation conditions a handler can hit. Each variant carries
/// exactly the fields needed to format the numeric reply it maps to (see `replies::IrcReply`).
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("{0} :Unknown command")]
    UnknownCommand(String),
    #[error("{0} :Not enough parameters")]
    NeedMoreParams(String),
    #[error("You have not registered")]
    NotRegistered,
    #[error("No nickname given")]
    NoNicknameGiven,
    #[error("{0} :Nickname is already in use")]
    NicknameInUse(String),
    #[error("{0} :No such nick/channel")]
    NoSuchNick(String),
    #[error("{0} :No such channel")]
    NoSuchChannel(String),
    #[error("{0} :You're not on that channel")]
    NotOnChannel(String),
    #[error("{0} {1} :They aren't on that channel")]
    UserNotInChannel(String, String),
    #[error("{0} :You're not channel operator")]
    ChanOPrivsNeeded(String),
    #[error("Permission Denied- You're not an IRC operator")]
    NoPrivileges,
    #[error("{0} :There was no such nickname")]
    NoSuchWhowas(String),
    #[error("unknown MODE flag")]
    UModeUnknownFlag,
    #[error("cannot set modes for other users")]
    UsersDontMatch,
    #[error("Password incorrect")]
    PasswdMismatch,
}

/// Startup-fatal configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("tls setup failed: {0}")]
    Tls(String),
}
