//! Postgres store — prepared statements over `tokio-postgres`.
//!
//! Statements are prepared once at connect time and live for the process
//! lifetime; they are released together with the connection when the last
//! store handle drops on the shutdown path.

use super::{MAX_TOKENS_PER_USER, normalize};
use crate::error::StoreError;
use anyhow::{Context, Result, bail};
use compact_str::CompactString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Statement};

struct UserStatements {
    add: Statement,
    del: Statement,
    exists: Statement,
    list: Statement,
}

struct TokenStatements {
    add: Statement,
    del: Statement,
    update: Statement,
    fetch: Statement,
    exists: Statement,
    subscribed: Statement,
    owned: Statement,
}

struct PgInner {
    client: Client,
    users: UserStatements,
    tokens: BTreeMap<CompactString, TokenStatements>,
}

/// Postgres-backed persistence.
#[derive(Clone)]
pub struct PgStore {
    inner: Arc<PgInner>,
}

impl PgStore {
    /// Connect, spawn the connection driver, probe the link, and prepare
    /// the statement set for every given gateway table.
    pub async fn connect<I, S>(connstr: &str, gateways: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tracing::info!("connecting to postgres");
        let (client, connection) = tokio_postgres::connect(connstr, NoTls)
            .await
            .context("failed to connect to postgres")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("postgres connection error: {e}");
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .context("postgres probe failed")?;

        let users = UserStatements {
            add: client.prepare("INSERT INTO USERS VALUES ($1)").await?,
            del: client.prepare("DELETE FROM USERS WHERE ID = $1").await?,
            exists: client
                .prepare("SELECT COUNT(1) FROM USERS WHERE ID = $1")
                .await?,
            list: client.prepare("SELECT ID FROM USERS").await?,
        };

        let mut tokens = BTreeMap::new();
        for gateway in gateways {
            let name = normalize(gateway.as_ref());
            let table = table_name(&name)?;
            let stmts = TokenStatements {
                add: client
                    .prepare(&format!("INSERT INTO {table} VALUES ($1,$2)"))
                    .await?,
                del: client
                    .prepare(&format!("DELETE FROM {table} WHERE REGID = $1"))
                    .await?,
                update: client
                    .prepare(&format!("UPDATE {table} SET REGID = $2 WHERE REGID = $1"))
                    .await?,
                fetch: client
                    .prepare(&format!("SELECT REGID FROM {table} WHERE USERID = $1"))
                    .await?,
                exists: client
                    .prepare(&format!("SELECT COUNT(1) FROM {table} WHERE REGID = $1"))
                    .await?,
                subscribed: client
                    .prepare(&format!("SELECT COUNT(1) FROM {table} WHERE USERID = $1"))
                    .await?,
                owned: client
                    .prepare(&format!(
                        "SELECT COUNT(1) FROM {table} WHERE USERID = $1 AND REGID = $2"
                    ))
                    .await?,
            };
            tokens.insert(name, stmts);
        }

        Ok(Self {
            inner: Arc::new(PgInner {
                client,
                users,
                tokens,
            }),
        })
    }

    fn tokens(&self, gateway: &str) -> Result<&TokenStatements, StoreError> {
        self.inner
            .tokens
            .get(&normalize(gateway))
            .ok_or_else(|| StoreError::UnknownGateway(gateway.into()))
    }

    pub async fn user_add(&self, id: i64) -> Result<(), StoreError> {
        tracing::debug!(user = id, "adding user");
        self.inner
            .client
            .execute(&self.inner.users.add, &[&id])
            .await
            .map_err(|e| {
                if has_code(&e, &SqlState::UNIQUE_VIOLATION) {
                    StoreError::DuplicateUser(id)
                } else {
                    db(e)
                }
            })?;
        Ok(())
    }

    pub async fn user_del(&self, id: i64) -> Result<(), StoreError> {
        tracing::debug!(user = id, "deleting user");
        let rows = self
            .inner
            .client
            .execute(&self.inner.users.del, &[&id])
            .await
            .map_err(db)?;
        if rows == 0 {
            return Err(StoreError::UnknownUser(id));
        }
        Ok(())
    }

    pub async fn user_exists(&self, id: i64) -> Result<bool, StoreError> {
        let row = self
            .inner
            .client
            .query_one(&self.inner.users.exists, &[&id])
            .await
            .map_err(db)?;
        Ok(row.get::<_, i64>(0) > 0)
    }

    pub async fn users(&self) -> Result<Vec<i64>, StoreError> {
        let rows = self
            .inner
            .client
            .query(&self.inner.users.list, &[])
            .await
            .map_err(db)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    pub async fn token_add(&self, gateway: &str, user: i64, token: &str) -> Result<(), StoreError> {
        tracing::debug!(user, gateway, "adding registration token");
        let stmts = self.tokens(gateway)?;
        self.inner
            .client
            .execute(&stmts.add, &[&user, &token])
            .await
            .map_err(|e| {
                // The BEFORE INSERT trigger raises once the cap is reached.
                if has_code(&e, &SqlState::RAISE_EXCEPTION) {
                    StoreError::TokenCapacity(user)
                } else if has_code(&e, &SqlState::FOREIGN_KEY_VIOLATION) {
                    StoreError::UnknownUser(user)
                } else if has_code(&e, &SqlState::UNIQUE_VIOLATION) {
                    StoreError::DuplicateToken(token.into())
                } else {
                    db(e)
                }
            })?;
        Ok(())
    }

    pub async fn token_del(&self, gateway: &str, token: &str) -> Result<(), StoreError> {
        let stmts = self.tokens(gateway)?;
        self.inner
            .client
            .execute(&stmts.del, &[&token])
            .await
            .map_err(db)?;
        Ok(())
    }

    pub async fn token_update(&self, gateway: &str, old: &str, new: &str) -> Result<(), StoreError> {
        let stmts = self.tokens(gateway)?;
        let rows = self
            .inner
            .client
            .execute(&stmts.update, &[&old, &new])
            .await
            .map_err(|e| {
                if has_code(&e, &SqlState::UNIQUE_VIOLATION) {
                    StoreError::DuplicateToken(new.into())
                } else {
                    db(e)
                }
            })?;
        if rows > 1 {
            panic!("token {old} stored for more than one user; refusing to continue");
        }
        Ok(())
    }

    pub async fn tokens_for_user(
        &self,
        gateway: &str,
        user: i64,
    ) -> Result<Vec<CompactString>, StoreError> {
        let stmts = self.tokens(gateway)?;
        let rows = self
            .inner
            .client
            .query(&stmts.fetch, &[&user])
            .await
            .map_err(db)?;
        Ok(rows
            .iter()
            .map(|row| row.get::<_, String>(0).into())
            .collect())
    }

    pub async fn token_exists(&self, gateway: &str, token: &str) -> Result<bool, StoreError> {
        let stmts = self.tokens(gateway)?;
        let row = self
            .inner
            .client
            .query_one(&stmts.exists, &[&token])
            .await
            .map_err(db)?;
        Ok(row.get::<_, i64>(0) > 0)
    }

    pub async fn user_subscribed(&self, gateway: &str, user: i64) -> Result<bool, StoreError> {
        let stmts = self.tokens(gateway)?;
        let row = self
            .inner
            .client
            .query_one(&stmts.subscribed, &[&user])
            .await
            .map_err(db)?;
        Ok(row.get::<_, i64>(0) > 0)
    }

    pub async fn subscription_exists(
        &self,
        gateway: &str,
        user: i64,
        token: &str,
    ) -> Result<bool, StoreError> {
        let stmts = self.tokens(gateway)?;
        let row = self
            .inner
            .client
            .query_one(&stmts.owned, &[&user, &token])
            .await
            .map_err(db)?;
        Ok(row.get::<_, i64>(0) > 0)
    }

    pub async fn probe(&self) -> Result<(), StoreError> {
        self.inner
            .client
            .simple_query("SELECT 1")
            .await
            .map_err(db)?;
        Ok(())
    }
}

/// Create the schema: the `USERS` table plus, per gateway, a token table
/// with a BEFORE INSERT trigger enforcing the per-user cap.
pub async fn init_schema<I, S>(connstr: &str, gateways: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tracing::info!("connecting to postgres");
    let (client, connection) = tokio_postgres::connect(connstr, NoTls)
        .await
        .context("failed to connect to postgres")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("postgres connection error: {e}");
        }
    });

    tracing::info!("creating table USERS");
    client
        .batch_execute("CREATE TABLE USERS (ID BIGINT PRIMARY KEY CHECK (ID > -1))")
        .await
        .context("failed to create USERS")?;

    for gateway in gateways {
        let name = normalize(gateway.as_ref());
        let table = table_name(&name)?;
        tracing::info!("creating table {table}");
        client
            .batch_execute(&format!(
                "CREATE TABLE {table} (\
                     USERID BIGINT REFERENCES USERS ON DELETE CASCADE, \
                     REGID TEXT, \
                     PRIMARY KEY (USERID, REGID))"
            ))
            .await
            .with_context(|| format!("failed to create {table}"))?;

        client
            .batch_execute(&format!(
                "CREATE FUNCTION {table}_ENFORCE_CAP() RETURNS TRIGGER AS $$ \
                 BEGIN \
                     IF ((SELECT COUNT(REGID) FROM {table} WHERE USERID = NEW.USERID) >= {MAX_TOKENS_PER_USER}) THEN \
                         RAISE EXCEPTION 'user % already holds {MAX_TOKENS_PER_USER} registration tokens', NEW.USERID; \
                     END IF; \
                     RETURN NEW; \
                 END $$ LANGUAGE plpgsql"
            ))
            .await
            .with_context(|| format!("failed to create the cap trigger function for {table}"))?;

        client
            .batch_execute(&format!(
                "CREATE TRIGGER {table}_ENFORCE_CAP BEFORE INSERT ON {table} \
                 FOR EACH ROW EXECUTE PROCEDURE {table}_ENFORCE_CAP()"
            ))
            .await
            .with_context(|| format!("failed to create the cap trigger for {table}"))?;
    }

    tracing::info!("schema created");
    Ok(())
}

/// Token tables are named after the gateway; names must stay plain
/// identifiers since they are interpolated into statements.
fn table_name(gateway: &str) -> Result<String> {
    if gateway.is_empty()
        || !gateway
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || gateway.chars().next().is_some_and(|c| c.is_ascii_digit())
    {
        bail!("gateway name {gateway:?} is not usable as a table name");
    }
    Ok(gateway.to_ascii_uppercase())
}

fn has_code(e: &tokio_postgres::Error, state: &SqlState) -> bool {
    e.code() == Some(state)
}

fn db(e: tokio_postgres::Error) -> StoreError {
    StoreError::Db(e.to_string())
}
