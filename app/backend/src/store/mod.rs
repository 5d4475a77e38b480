//! Persistence contract and its implementations.
//!
//! The daemon keeps a catalog of users and, per gateway, the registration
//! tokens each user owns. Token namespaces are keyed by gateway name; a
//! store is built with the set of gateways it serves and rejects any other
//! name.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::{PgStore, init_schema};

use crate::error::StoreError;
use compact_str::CompactString;
use std::future::Future;

/// Hard cap on registration tokens per (user, gateway) pair.
pub const MAX_TOKENS_PER_USER: usize = 10;

/// The persistence operations the daemon core relies on.
///
/// Token renames (`token_update`) must be atomic key changes; an update
/// affecting more than one row is a consistency violation and panics.
pub trait Storage: Send + Sync {
    /// Create a user. Fails with [`StoreError::DuplicateUser`] if present.
    fn user_add(&self, id: i64) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a user, cascading to its tokens on every gateway. Fails with
    /// [`StoreError::UnknownUser`] if absent.
    fn user_del(&self, id: i64) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn user_exists(&self, id: i64) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// List every user ID.
    fn users(&self) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Register a token. Fails with [`StoreError::TokenCapacity`] once the
    /// user holds [`MAX_TOKENS_PER_USER`] tokens on the gateway.
    fn token_add(
        &self,
        gateway: &str,
        user: i64,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a token by value alone; silent if absent.
    fn token_del(
        &self,
        gateway: &str,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically rename a token, preserving its user mapping.
    fn token_update(
        &self,
        gateway: &str,
        old: &str,
        new: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All tokens a user holds on the gateway; possibly empty.
    fn tokens_for_user(
        &self,
        gateway: &str,
        user: i64,
    ) -> impl Future<Output = Result<Vec<CompactString>, StoreError>> + Send;

    /// Whether the token exists on the gateway, under any user.
    fn token_exists(
        &self,
        gateway: &str,
        token: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether the user holds any token on the gateway.
    fn user_subscribed(
        &self,
        gateway: &str,
        user: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether the user holds exactly this token on the gateway.
    fn subscription_exists(
        &self,
        gateway: &str,
        user: i64,
        token: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Connection liveness check.
    fn probe(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A persistence backend, cheap to clone and share across workers.
#[derive(Clone)]
pub enum Store {
    Postgres(PgStore),
    Memory(MemStore),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            Store::Postgres($inner) => $call,
            Store::Memory($inner) => $call,
        }
    };
}

impl Storage for Store {
    async fn user_add(&self, id: i64) -> Result<(), StoreError> {
        dispatch!(self, s => s.user_add(id).await)
    }

    async fn user_del(&self, id: i64) -> Result<(), StoreError> {
        dispatch!(self, s => s.user_del(id).await)
    }

    async fn user_exists(&self, id: i64) -> Result<bool, StoreError> {
        dispatch!(self, s => s.user_exists(id).await)
    }

    async fn users(&self) -> Result<Vec<i64>, StoreError> {
        dispatch!(self, s => s.users().await)
    }

    async fn token_add(&self, gateway: &str, user: i64, token: &str) -> Result<(), StoreError> {
        dispatch!(self, s => s.token_add(gateway, user, token).await)
    }

    async fn token_del(&self, gateway: &str, token: &str) -> Result<(), StoreError> {
        dispatch!(self, s => s.token_del(gateway, token).await)
    }

    async fn token_update(&self, gateway: &str, old: &str, new: &str) -> Result<(), StoreError> {
        dispatch!(self, s => s.token_update(gateway, old, new).await)
    }

    async fn tokens_for_user(
        &self,
        gateway: &str,
        user: i64,
    ) -> Result<Vec<CompactString>, StoreError> {
        dispatch!(self, s => s.tokens_for_user(gateway, user).await)
    }

    async fn token_exists(&self, gateway: &str, token: &str) -> Result<bool, StoreError> {
        dispatch!(self, s => s.token_exists(gateway, token).await)
    }

    async fn user_subscribed(&self, gateway: &str, user: i64) -> Result<bool, StoreError> {
        dispatch!(self, s => s.user_subscribed(gateway, user).await)
    }

    async fn subscription_exists(
        &self,
        gateway: &str,
        user: i64,
        token: &str,
    ) -> Result<bool, StoreError> {
        dispatch!(self, s => s.subscription_exists(gateway, user, token).await)
    }

    async fn probe(&self) -> Result<(), StoreError> {
        dispatch!(self, s => s.probe().await)
    }
}

/// Gateway names are matched case-insensitively everywhere.
pub(crate) fn normalize(gateway: &str) -> CompactString {
    gateway.to_ascii_lowercase().into()
}
