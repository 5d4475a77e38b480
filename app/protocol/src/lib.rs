//! Wire protocol for the courier push daemon.
//!
//! A request is two newline-terminated ASCII lines: a whitespace-delimited
//! header and a body (empty for every command except `PUSH`). A response is
//! one line: `<STATUS> <message>\n`.

pub mod command;
pub mod message;
pub mod response;

pub use command::{Command, ParseError, parse};
pub use message::{MAX_DATA_BYTES, Message};
pub use response::{Response, Status};
