//! Gateway connector abstraction — the capability set every outbound
//! delivery channel exposes, the process-wide registry, and push fan-out.

use crate::error::{PushError, StoreError};
use crate::gcm::Gcm;
use compact_str::CompactString;
use protocol::Message;
use std::collections::BTreeMap;
use std::future::Future;

/// The operations a push gateway offers.
pub trait Connector: Send + Sync {
    /// Deliver one message to every device the user owns on this gateway.
    fn push(
        &self,
        user: i64,
        message: &Message,
    ) -> impl Future<Output = Result<(), PushError>> + Send;

    /// Register a token for a user.
    fn register(
        &self,
        user: i64,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a token, whoever owns it.
    fn unregister(&self, token: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether the token is known to this gateway at all.
    fn exists(&self, token: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether the user owns any token on this gateway.
    fn subscribed(&self, user: i64) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether the user owns exactly this token on this gateway.
    fn subscribed_token(
        &self,
        user: i64,
        token: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// A registered gateway instance.
///
/// New gateway kinds add a variant here and a registration in the server
/// bootstrap; everything downstream dispatches through [`Connector`].
#[derive(Clone)]
pub enum Gateway {
    /// The Android push gateway.
    Gcm(Gcm),
}

impl Connector for Gateway {
    async fn push(&self, user: i64, message: &Message) -> Result<(), PushError> {
        match self {
            Self::Gcm(g) => g.push(user, message).await,
        }
    }

    async fn register(&self, user: i64, token: &str) -> Result<(), StoreError> {
        match self {
            Self::Gcm(g) => g.register(user, token).await,
        }
    }

    async fn unregister(&self, token: &str) -> Result<(), StoreError> {
        match self {
            Self::Gcm(g) => g.unregister(token).await,
        }
    }

    async fn exists(&self, token: &str) -> Result<bool, StoreError> {
        match self {
            Self::Gcm(g) => g.exists(token).await,
        }
    }

    async fn subscribed(&self, user: i64) -> Result<bool, StoreError> {
        match self {
            Self::Gcm(g) => g.subscribed(user).await,
        }
    }

    async fn subscribed_token(&self, user: i64, token: &str) -> Result<bool, StoreError> {
        match self {
            Self::Gcm(g) => g.subscribed_token(user, token).await,
        }
    }
}

/// Name → gateway map, built once during server bootstrap and read-only
/// afterwards. Lookups are case-insensitive.
#[derive(Default)]
pub struct Registry {
    connectors: BTreeMap<CompactString, Gateway>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway under a name. Startup-only; replaces any
    /// previous entry with the same name.
    pub fn register(&mut self, name: &str, gateway: Gateway) {
        self.connectors.insert(normalize(name), gateway);
    }

    pub fn get(&self, name: &str) -> Option<&Gateway> {
        self.connectors.get(&normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connectors.contains_key(&normalize(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, &Gateway)> {
        self.connectors.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &CompactString> {
        self.connectors.keys()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

fn normalize(name: &str) -> CompactString {
    name.to_ascii_lowercase().into()
}

/// Broadcast one push through every registered gateway concurrently.
///
/// Spawns one task per connector and joins them all; returns whether any
/// gateway failed plus the per-gateway errors. A gateway on which the user
/// simply has no tokens ([`PushError::NotSubscribed`]) does not count as a
/// failure.
pub async fn push_all(
    registry: &Registry,
    user: i64,
    message: &Message,
) -> (bool, BTreeMap<CompactString, PushError>) {
    let mut deliveries = Vec::with_capacity(registry.len());
    for (name, gateway) in registry.iter() {
        let name = name.clone();
        let gateway = gateway.clone();
        let message = message.clone();
        deliveries.push((
            name,
            tokio::spawn(async move { gateway.push(user, &message).await }),
        ));
    }

    let mut failures = BTreeMap::new();
    for (name, task) in deliveries {
        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => panic!("push task for {name} aborted: {e}"),
        };
        match result {
            Ok(()) | Err(PushError::NotSubscribed) => {}
            Err(e) => {
                failures.insert(name, e);
            }
        }
    }

    (!failures.is_empty(), failures)
}
