//! Response statuses and one-line serialization.

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Response status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The command was understood and the mutation will be executed.
    Accepted,
    /// Negative answer to a synchronous query.
    No,
    /// The request was malformed or referenced an unknown entity.
    Rejected,
    /// Positive answer to a synchronous query.
    Yes,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::No => "NO",
            Self::Rejected => "REJECTED",
            Self::Yes => "YES",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-line reply: `<STATUS> <message>\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub message: String,
}

impl Response {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// The reply sent for every accepted command.
    pub fn accepted() -> Self {
        Self::new(Status::Accepted, "Request accepted.")
    }

    /// Positive synchronous answer.
    pub fn yes() -> Self {
        Self::new(Status::Yes, "Exists")
    }

    /// Negative synchronous answer.
    pub fn no() -> Self {
        Self::new(Status::No, "Not existent")
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(Status::Rejected, message)
    }

    /// Serialize into a single buffer and write it in one pass.
    ///
    /// Partial writes surface as the underlying I/O error.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        let mut line = Vec::with_capacity(self.status.as_str().len() + self.message.len() + 2);
        line.extend_from_slice(self.status.as_str().as_bytes());
        line.push(b' ');
        line.extend_from_slice(self.message.as_bytes());
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}
