//! Command grammar — header parsing into tagged operations.

use crate::message::Message;
use compact_str::CompactString;
use std::time::Duration;

/// A parsed client command.
///
/// Each variant carries the fixed, typed parameter set of its command kind.
/// Gateway names are carried as text; the dispatcher resolves them against
/// the connector registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `ADDUSER <id>` — create a user (asynchronous).
    AddUser { user: i64 },
    /// `DELUSER <id>` — delete a user and cascade its tokens (asynchronous).
    DelUser { user: i64 },
    /// `EXISTS <id>` — does this user exist (synchronous).
    ExistsUser { user: i64 },
    /// `EXISTS <gw>:<token>` — does this token exist on the gateway (synchronous).
    ExistsToken {
        gateway: CompactString,
        token: CompactString,
    },
    /// `SUBSCRIBED <id> <gw>[:<token>]` — subscription query (synchronous).
    ///
    /// With a token, asks for that exact token under the user; without,
    /// asks whether the user has any token on the gateway.
    Subscribed {
        user: i64,
        gateway: CompactString,
        token: Option<CompactString>,
    },
    /// `SUBSCRIBE <id> <gw>:<token>` — register a token (asynchronous).
    Subscribe {
        user: i64,
        gateway: CompactString,
        token: CompactString,
    },
    /// `UNSUBSCRIBE <id> <gw>:<token>` — remove a token (asynchronous).
    Unsubscribe {
        user: i64,
        gateway: CompactString,
        token: CompactString,
    },
    /// `PUSH <id>` with a JSON object body — fan a message out (asynchronous).
    Push { user: i64, message: Message },
    /// `HALT [<seconds>]` — shut the daemon down after an optional delay.
    Halt { delay: Duration },
}

impl Command {
    /// Whether the command is answered before execution (`ACCEPTED`) or
    /// evaluated inline (`YES`/`NO`).
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self,
            Self::ExistsUser { .. } | Self::ExistsToken { .. } | Self::Subscribed { .. }
        )
    }

    /// The gateway name the command addresses, if it addresses one.
    pub fn gateway_name(&self) -> Option<&str> {
        match self {
            Self::ExistsToken { gateway, .. }
            | Self::Subscribed { gateway, .. }
            | Self::Subscribe { gateway, .. }
            | Self::Unsubscribe { gateway, .. } => Some(gateway),
            _ => None,
        }
    }
}

/// A rejection produced by the parser; `message` is sent verbatim to the
/// client after the `REJECTED` status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse one request from its header line and optional body line.
///
/// The body is only meaningful for `PUSH`; a present but malformed body is
/// rejected, an absent body stands for the empty message. Header fields are
/// whitespace-delimited and case-sensitive.
pub fn parse(header: &[u8], body: Option<&[u8]>) -> Result<Command, ParseError> {
    let header = std::str::from_utf8(header)
        .map_err(|_| ParseError::new("Header is not valid UTF-8"))?;
    let fields: Vec<&str> = header.split_ascii_whitespace().collect();

    let Some(&name) = fields.first() else {
        return Err(ParseError::new("Header too short"));
    };

    match name {
        "HALT" => parse_halt(&fields),
        "ADDUSER" | "DELUSER" | "EXISTS" => parse_user_command(name, &fields),
        "SUBSCRIBED" => parse_subscribed(&fields),
        "SUBSCRIBE" | "UNSUBSCRIBE" => parse_subscription(name, &fields),
        "PUSH" => parse_push(&fields, body),
        other => Err(ParseError::new(format!("Unknown request {other}"))),
    }
}

fn parse_halt(fields: &[&str]) -> Result<Command, ParseError> {
    let delay = match fields {
        ["HALT"] => Duration::ZERO,
        ["HALT", arg] => {
            let secs: i64 = arg
                .parse()
                .map_err(|_| ParseError::new(format!("Cannot parse {arg} as an integer")))?;
            // A negative delay behaves as an immediate halt.
            Duration::from_secs(secs.max(0) as u64)
        }
        _ => {
            return Err(ParseError::new(format!(
                "Too many arguments for HALT: {}",
                fields.len()
            )));
        }
    };
    Ok(Command::Halt { delay })
}

fn parse_user_command(name: &str, fields: &[&str]) -> Result<Command, ParseError> {
    if fields.len() != 2 {
        return Err(wrong_arity(name, fields.len()));
    }

    let arg = fields[1];
    match arg.parse::<i64>() {
        Ok(user) => Ok(match name {
            "ADDUSER" => Command::AddUser { user },
            "DELUSER" => Command::DelUser { user },
            _ => Command::ExistsUser { user },
        }),
        // `EXISTS` falls back to the `<gw>:<token>` form when the argument
        // is not an integer; the other two commands only take user IDs.
        Err(_) if name == "EXISTS" => {
            let (gateway, token) = split_target(arg)?;
            Ok(Command::ExistsToken { gateway, token })
        }
        Err(_) => Err(ParseError::new(format!(
            "Cannot parse {arg} as an integer"
        ))),
    }
}

fn parse_subscribed(fields: &[&str]) -> Result<Command, ParseError> {
    if fields.len() != 3 {
        return Err(wrong_arity("SUBSCRIBED", fields.len()));
    }

    let user = parse_user_id(fields[1])?;
    let (gateway, token) = match fields[2].split_once(':') {
        Some((gateway, token)) => (gateway.into(), Some(token.into())),
        None => (fields[2].into(), None),
    };

    Ok(Command::Subscribed {
        user,
        gateway,
        token,
    })
}

fn parse_subscription(name: &str, fields: &[&str]) -> Result<Command, ParseError> {
    if fields.len() != 3 {
        return Err(wrong_arity(name, fields.len()));
    }

    let user = parse_user_id(fields[1])?;
    let (gateway, token) = split_target(fields[2])?;

    Ok(if name == "SUBSCRIBE" {
        Command::Subscribe {
            user,
            gateway,
            token,
        }
    } else {
        Command::Unsubscribe {
            user,
            gateway,
            token,
        }
    })
}

fn parse_push(fields: &[&str], body: Option<&[u8]>) -> Result<Command, ParseError> {
    if fields.len() != 2 {
        return Err(wrong_arity("PUSH", fields.len()));
    }

    let user = parse_user_id(fields[1])?;
    let message = match body {
        None => Message::default(),
        Some(raw) => serde_json::from_slice::<Option<Message>>(raw)
            .map_err(|_| ParseError::new("Malformed json for PUSH request"))?
            .unwrap_or_default(),
    };

    let encoded = serde_json::to_vec(&message)
        .map_err(|_| ParseError::new("Malformed json for PUSH request"))?;
    if encoded.len() > crate::message::MAX_DATA_BYTES {
        return Err(ParseError::new(format!(
            "Message data exceeds {} bytes",
            crate::message::MAX_DATA_BYTES
        )));
    }

    Ok(Command::Push { user, message })
}

fn parse_user_id(arg: &str) -> Result<i64, ParseError> {
    arg.parse()
        .map_err(|_| ParseError::new(format!("Cannot parse {arg} as a signed integer")))
}

/// Split a `<gateway>:<token>` argument at the first colon.
fn split_target(arg: &str) -> Result<(CompactString, CompactString), ParseError> {
    arg.split_once(':')
        .map(|(gateway, token)| (gateway.into(), token.into()))
        .ok_or_else(|| ParseError::new("Malformed request string"))
}

fn wrong_arity(name: &str, got: usize) -> ParseError {
    ParseError::new(format!("Wrong number of arguments for {name}: {got}"))
}
