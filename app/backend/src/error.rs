//! Domain errors for the persistence layer and the push connectors.

use compact_str::CompactString;

/// Errors surfaced by the persistence contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The user already exists.
    DuplicateUser(i64),
    /// The user does not exist.
    UnknownUser(i64),
    /// The user already holds the maximum number of tokens on this gateway.
    TokenCapacity(i64),
    /// The (user, token) pair is already registered.
    DuplicateToken(CompactString),
    /// No token table exists for this gateway name.
    UnknownGateway(CompactString),
    /// Driver-level failure, carried as text.
    Db(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateUser(id) => write!(f, "user {id} already exists"),
            Self::UnknownUser(id) => write!(f, "user {id} does not exist"),
            Self::TokenCapacity(id) => {
                write!(f, "user {id} already holds the maximum number of tokens")
            }
            Self::DuplicateToken(token) => write!(f, "token {token} is already registered"),
            Self::UnknownGateway(name) => write!(f, "no token table for gateway {name}"),
            Self::Db(msg) => write!(f, "database error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors surfaced by a connector push.
#[derive(Debug)]
pub enum PushError {
    /// The user has no registration tokens on this gateway. Fan-out treats
    /// this as "not subscribed", not as a failure.
    NotSubscribed,
    /// The gateway refused our API key.
    Auth,
    /// The gateway kept failing internally until the retry ceiling.
    Internal,
    /// The gateway stayed unavailable until the retry ceiling.
    Timeout,
    /// The serialized `data` object exceeds the gateway's 4096-byte cap.
    TooLarge,
    /// The gateway answered with a status code we have no mapping for.
    UnknownStatus(u16),
    /// Token reconciliation hit a persistence error.
    Store(StoreError),
    /// HTTP transport failure.
    Http(reqwest::Error),
    /// Payload serialization failure.
    Encode(serde_json::Error),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSubscribed => write!(f, "no registration tokens for this user"),
            Self::Auth => write!(f, "the gateway rejected the API key"),
            Self::Internal => write!(f, "gateway internal error, gave up retrying"),
            Self::Timeout => write!(f, "gateway unavailable, gave up retrying"),
            Self::TooLarge => write!(f, "message data exceeds 4096 bytes"),
            Self::UnknownStatus(code) => write!(f, "unknown gateway status {code}"),
            Self::Store(e) => write!(f, "store error during push: {e}"),
            Self::Http(e) => write!(f, "http error: {e}"),
            Self::Encode(e) => write!(f, "payload encoding error: {e}"),
        }
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}
