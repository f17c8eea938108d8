//! The wire codec (parse/serialize of one CRLF-terminated IRC line).
//!
//! Grammar (RFC 2812 2.3.1):
//! `message = [":" prefix SPACE] command {SPACE param} [SPACE ":" trailing] CRLF`
//!
//! Built on top of the grammar fragments in `parsers` (`middle_parser` already excludes a
//! leading ':' and NUL/CR/LF, which is exactly what a prefix or param token needs).

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::{alpha1, char, space1},
    combinator::{opt, recognize},
    multi::many0,
    sequence::preceded,
};

use crate::errors::CodecError;
use crate::parsers::{middle_parser, trailing_parser};

/// Maximum line length including the trailing CRLF (RFC 2812 2.3).
pub const MAX_LINE_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl Message {
    pub fn new(command: impl Into<String>) -> Self {
        Message {
            prefix: None,
            command: command.into().to_ascii_uppercase(),
            params: Vec::new(),
            trailing: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// Convenience accessor for the common single/dual-argument commands.
    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(&self.command);
        for param in &self.params {
            out.push(' ');
            out.push_str(param);
        }
        if let Some(trailing) = &self.trailing {
            out.push_str(" :");
            out.push_str(trailing);
        }
        out.push_str("\r\n");
        out
    }
}

fn command_parser(input: &str) -> IResult<&str, &str> {
    alt((alpha1, take_while_m_n(3, 3, |c: char| c.is_ascii_digit()))).parse(input)
}

/// A param token is a `middle` per the grammar: never starts with ':' and never contains a
/// bare space (the embedded-colon arm of `middle_parser` only permits ':' after the first char).
fn param_token(input: &str) -> IResult<&str, &str> {
    middle_parser(input)
}

fn parse_fields(input: &str) -> IResult<&str, (Option<&str>, &str, Vec<&str>, Option<&str>)> {
    let (input, prefix) = opt(preceded(char(':'), recognize(middle_parser))).parse(input)?;
    let (input, _) = if prefix.is_some() {
        space1(input)?
    } else {
        (input, "")
    };
    let (input, command) = command_parser(input)?;
    let (input, params) = many0(preceded(space1, param_token)).parse(input)?;
    let (input, trailing) = opt(preceded((space1, char(':')), trailing_parser)).parse(input)?;
    Ok((input, (prefix, command, params, trailing)))
}

/// Parses one already-unframed line (CRLF stripped by the caller's line reader).
pub fn parse_message(line: &str) -> Result<Message, CodecError> {
    if line.len() + 2 > MAX_LINE_LEN {
        return Err(CodecError::LineTooLong(line.len() + 2));
    }
    if line.is_empty() {
        return Err(CodecError::Malformed("empty line".into()));
    }
    let (rest, (prefix, command, params, trailing)) =
        parse_fields(line).map_err(|e| CodecError::Malformed(format!("{e}")))?;
    if !rest.is_empty() {
        return Err(CodecError::Malformed(format!("trailing garbage: {rest:?}")));
    }
    Ok(Message {
        prefix: prefix.map(str::to_string),
        command: command.to_ascii_uppercase(),
        params: params.into_iter().map(str::to_string).collect(),
        trailing: trailing.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_command() {
        let msg = parse_message("NICK alice").unwrap();
        assert_eq!(msg.command, "NICK");
        assert_eq!(msg.params, vec!["alice"]);
        assert_eq!(msg.trailing, None);
    }

    #[test]
    fn parses_prefix_params_and_trailing() {
        let msg = parse_message(":alice!alice@host PRIVMSG #x :hi there").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!alice@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#x"]);
        assert_eq!(msg.trailing.as_deref(), Some("hi there"));
    }

    #[test]
    fn empty_trailing_is_distinct_from_absent() {
        let msg = parse_message("TOPIC #x :").unwrap();
        assert_eq!(msg.trailing.as_deref(), Some(""));
        let msg = parse_message("TOPIC #x").unwrap();
        assert_eq!(msg.trailing, None);
    }

    #[test]
    fn numeric_command_is_accepted() {
        let msg = parse_message(":srv 001 alice :Welcome").unwrap();
        assert_eq!(msg.command, "001");
    }

    #[test]
    fn rejects_overlong_line() {
        let long = "PRIVMSG #x :".to_string() + &"a".repeat(600);
        assert!(matches!(
            parse_message(&long),
            Err(CodecError::LineTooLong(_))
        ));
    }

    #[test]
    fn round_trip_serialize_parse() {
        let msg = Message::new("JOIN")
            .with_prefix("alice!alice@host")
            .with_param("#x");
        let line = msg.serialize();
        let reparsed = parse_message(line.trim_end_matches("\r\n")).unwrap();
        assert_eq!(reparsed.prefix, msg.prefix);
        assert_eq!(reparsed.command, msg.command);
        assert_eq!(reparsed.params, msg.params);
    }

    #[test]
    fn rejects_prefix_without_command() {
        assert!(parse_message(":onlyaprefix").is_err());
    }
}
