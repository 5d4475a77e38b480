//! In-memory store — the persistence contract without a database.
//!
//! Backs tests and enforces the same invariants as the Postgres schema:
//! the per-user token cap, cascade deletion, and the single-row rename
//! guarantee.

use super::{MAX_TOKENS_PER_USER, normalize};
use crate::error::StoreError;
use compact_str::CompactString;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// Rows of a per-gateway token table: `(user, token)` pairs, unique.
type TokenTable = BTreeSet<(i64, CompactString)>;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeSet<i64>,
    tokens: BTreeMap<CompactString, TokenTable>,
}

/// In-memory persistence backend.
///
/// All methods acquire the inner `RwLock`; clones share the same state.
#[derive(Debug, Clone)]
pub struct MemStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemStore {
    /// Create a store serving the given gateway namespaces.
    pub fn new<I, S>(gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = gateways
            .into_iter()
            .map(|name| (normalize(name.as_ref()), TokenTable::new()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(Tables {
                users: BTreeSet::new(),
                tokens,
            })),
        }
    }

    pub async fn user_add(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.inner.write().expect("store lock poisoned");
        if !tables.users.insert(id) {
            return Err(StoreError::DuplicateUser(id));
        }
        Ok(())
    }

    pub async fn user_del(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.inner.write().expect("store lock poisoned");
        if !tables.users.remove(&id) {
            return Err(StoreError::UnknownUser(id));
        }
        // Cascade across every gateway table.
        for table in tables.tokens.values_mut() {
            table.retain(|(user, _)| *user != id);
        }
        Ok(())
    }

    pub async fn user_exists(&self, id: i64) -> Result<bool, StoreError> {
        let tables = self.inner.read().expect("store lock poisoned");
        Ok(tables.users.contains(&id))
    }

    pub async fn users(&self) -> Result<Vec<i64>, StoreError> {
        let tables = self.inner.read().expect("store lock poisoned");
        Ok(tables.users.iter().copied().collect())
    }

    pub async fn token_add(&self, gateway: &str, user: i64, token: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.write().expect("store lock poisoned");
        if !tables.users.contains(&user) {
            return Err(StoreError::UnknownUser(user));
        }
        let table = table_mut(&mut tables, gateway)?;
        // Capacity is checked before uniqueness, matching the order the
        // BEFORE INSERT trigger and the primary key fire in Postgres.
        if table.iter().filter(|(owner, _)| *owner == user).count() >= MAX_TOKENS_PER_USER {
            return Err(StoreError::TokenCapacity(user));
        }
        if table.contains(&(user, token.into())) {
            return Err(StoreError::DuplicateToken(token.into()));
        }
        table.insert((user, token.into()));
        Ok(())
    }

    pub async fn token_del(&self, gateway: &str, token: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.write().expect("store lock poisoned");
        let table = table_mut(&mut tables, gateway)?;
        table.retain(|(_, stored)| stored != token);
        Ok(())
    }

    pub async fn token_update(&self, gateway: &str, old: &str, new: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.write().expect("store lock poisoned");
        let table = table_mut(&mut tables, gateway)?;

        let matches: Vec<(i64, CompactString)> = table
            .iter()
            .filter(|(_, stored)| stored == old)
            .cloned()
            .collect();

        if matches.len() > 1 {
            panic!("token {old} stored for more than one user; refusing to continue");
        }
        let Some((user, _)) = matches.into_iter().next() else {
            return Ok(());
        };
        if table.contains(&(user, new.into())) {
            return Err(StoreError::DuplicateToken(new.into()));
        }

        table.remove(&(user, old.into()));
        table.insert((user, new.into()));
        Ok(())
    }

    pub async fn tokens_for_user(
        &self,
        gateway: &str,
        user: i64,
    ) -> Result<Vec<CompactString>, StoreError> {
        let tables = self.inner.read().expect("store lock poisoned");
        let table = table_ref(&tables, gateway)?;
        Ok(table
            .iter()
            .filter(|(owner, _)| *owner == user)
            .map(|(_, token)| token.clone())
            .collect())
    }

    pub async fn token_exists(&self, gateway: &str, token: &str) -> Result<bool, StoreError> {
        let tables = self.inner.read().expect("store lock poisoned");
        let table = table_ref(&tables, gateway)?;
        Ok(table.iter().any(|(_, stored)| stored == token))
    }

    pub async fn user_subscribed(&self, gateway: &str, user: i64) -> Result<bool, StoreError> {
        let tables = self.inner.read().expect("store lock poisoned");
        let table = table_ref(&tables, gateway)?;
        Ok(table.iter().any(|(owner, _)| *owner == user))
    }

    pub async fn subscription_exists(
        &self,
        gateway: &str,
        user: i64,
        token: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.inner.read().expect("store lock poisoned");
        let table = table_ref(&tables, gateway)?;
        Ok(table.contains(&(user, token.into())))
    }

    pub async fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn table_ref<'a>(tables: &'a Tables, gateway: &str) -> Result<&'a TokenTable, StoreError> {
    tables
        .tokens
        .get(&normalize(gateway))
        .ok_or_else(|| StoreError::UnknownGateway(gateway.into()))
}

fn table_mut<'a>(tables: &'a mut Tables, gateway: &str) -> Result<&'a mut TokenTable, StoreError> {
    tables
        .tokens
        .get_mut(&normalize(gateway))
        .ok_or_else(|| StoreError::UnknownGateway(gateway.into()))
}
