//! Android push gateway client.
//!
//! Owns HTTP delivery to the gateway endpoint, multi-recipient fan-out for
//! a single user, exponential retry on transient failures, and per-result
//! token reconciliation (canonical-ID renames and pruning of dead tokens).

use crate::error::{PushError, StoreError};
use crate::store::{Storage, Store};
use compact_str::CompactString;
use protocol::{MAX_DATA_BYTES, Message};
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The fixed delivery endpoint.
pub const GCM_URL: &str = "https://android.googleapis.com/gcm/send";

const DEFAULT_MAX_IDLE_CONNS: usize = 5;
const DEFAULT_MAX_RETRY_TIME: Duration = Duration::from_secs(8);
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Gateway section of the daemon configuration.
///
/// JSON keys follow the config file contract (`ApiKey`, `MaxTcpConns`,
/// `MaxRetryTime`); zero values select the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GcmConfig {
    /// Mandatory gateway API key.
    pub api_key: String,
    /// Max idle TCP connections per host; 0 selects the default of 5.
    #[serde(default)]
    pub max_tcp_conns: usize,
    /// Retry backoff ceiling in whole seconds; 0 selects the default of 8.
    #[serde(default)]
    pub max_retry_time: u64,
}

impl GcmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            max_tcp_conns: 0,
            max_retry_time: 0,
        }
    }

    fn max_retry_time(&self) -> Duration {
        match self.max_retry_time {
            0 => DEFAULT_MAX_RETRY_TIME,
            secs => Duration::from_secs(secs),
        }
    }

    fn max_tcp_conns(&self) -> usize {
        match self.max_tcp_conns {
            0 => DEFAULT_MAX_IDLE_CONNS,
            conns => conns,
        }
    }
}

/// The Android gateway connector.
#[derive(Clone)]
pub struct Gcm {
    store: Store,
    client: reqwest::Client,
    auth: String,
    endpoint: String,
    max_sleep: Duration,
}

#[derive(Serialize)]
struct Payload<'a> {
    registration_ids: &'a [CompactString],
    data: &'a Message,
}

/// What a completed HTTP exchange asks the push loop to do next.
enum Outcome {
    Done,
    Retry(RetryClass),
}

#[derive(Clone, Copy)]
enum RetryClass {
    Internal,
    Timeout,
}

impl RetryClass {
    fn give_up(self) -> PushError {
        match self {
            Self::Internal => PushError::Internal,
            Self::Timeout => PushError::Timeout,
        }
    }
}

impl Gcm {
    /// Registry name of this connector.
    pub const NAME: &'static str = "gcm";

    pub fn new(config: &GcmConfig, store: Store) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_tcp_conns())
            .build()?;
        Ok(Self {
            store,
            client,
            auth: format!("key={}", config.api_key),
            endpoint: GCM_URL.to_owned(),
            max_sleep: config.max_retry_time(),
        })
    }

    /// Point the client at a different endpoint. Test hook.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn push(&self, user: i64, message: &Message) -> Result<(), PushError> {
        let tokens = self
            .store
            .tokens_for_user(Self::NAME, user)
            .await
            .map_err(PushError::Store)?;
        if tokens.is_empty() {
            return Err(PushError::NotSubscribed);
        }
        self.push_tokens(&tokens, message).await
    }

    pub async fn register(&self, user: i64, token: &str) -> Result<(), StoreError> {
        self.store.token_add(Self::NAME, user, token).await
    }

    pub async fn unregister(&self, token: &str) -> Result<(), StoreError> {
        self.store.token_del(Self::NAME, token).await
    }

    pub async fn exists(&self, token: &str) -> Result<bool, StoreError> {
        self.store.token_exists(Self::NAME, token).await
    }

    pub async fn subscribed(&self, user: i64) -> Result<bool, StoreError> {
        self.store.user_subscribed(Self::NAME, user).await
    }

    pub async fn subscribed_token(&self, user: i64, token: &str) -> Result<bool, StoreError> {
        self.store
            .subscription_exists(Self::NAME, user, token)
            .await
    }

    /// Deliver one payload to a fixed recipient list, retrying transient
    /// failures with exponential backoff up to the configured ceiling.
    ///
    /// Every attempt re-sends the same payload; the token list is not
    /// re-fetched.
    async fn push_tokens(
        &self,
        tokens: &[CompactString],
        message: &Message,
    ) -> Result<(), PushError> {
        let data = serde_json::to_vec(message).map_err(PushError::Encode)?;
        if data.len() > MAX_DATA_BYTES {
            return Err(PushError::TooLarge);
        }

        let payload = Payload {
            registration_ids: tokens,
            data: message,
        };
        let body = serde_json::to_vec(&payload).map_err(PushError::Encode)?;

        let mut delay = INITIAL_RETRY_DELAY;
        loop {
            tracing::trace!(recipients = tokens.len(), "posting to gateway");
            let response = self
                .client
                .post(&self.endpoint)
                .header(header::AUTHORIZATION, self.auth.as_str())
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await
                .map_err(PushError::Http)?;

            let class = match self.eval_response(response, tokens).await? {
                Outcome::Done => return Ok(()),
                Outcome::Retry(class) => class,
            };

            if delay > self.max_sleep {
                return Err(class.give_up());
            }
            let sleep = if delay * 2 > self.max_sleep {
                self.max_sleep
            } else {
                delay
            };
            tracing::debug!(backoff = ?sleep, "transient gateway failure, retrying");
            tokio::time::sleep(sleep).await;
            delay *= 2;
        }
    }

    /// Classify the HTTP status and, on 200, reconcile the result list.
    async fn eval_response(
        &self,
        response: reqwest::Response,
        tokens: &[CompactString],
    ) -> Result<Outcome, PushError> {
        match response.status().as_u16() {
            200 => {}
            400 => panic!(
                "the push gateway rejected our payload as malformed; \
                 this is a bug in the gateway client"
            ),
            401 => return Err(PushError::Auth),
            500 => {
                tracing::warn!("gateway internal server error");
                return Ok(Outcome::Retry(RetryClass::Internal));
            }
            code @ 501..=599 => {
                tracing::warn!(code, "gateway unavailable");
                return Ok(Outcome::Retry(RetryClass::Timeout));
            }
            code => return Err(PushError::UnknownStatus(code)),
        }

        let reply: GatewayReply = match response.json().await {
            Ok(reply) => reply,
            Err(e) => panic!("invalid JSON from the push gateway: {e}"),
        };
        self.eval_reply(reply, tokens).await
    }

    async fn eval_reply(
        &self,
        reply: GatewayReply,
        tokens: &[CompactString],
    ) -> Result<Outcome, PushError> {
        if (reply.failure | reply.canonical_ids) == 0 {
            return Ok(Outcome::Done);
        }

        // The gateway reports per-recipient outcomes in submission order.
        if reply.results.len() != tokens.len() {
            panic!(
                "gateway returned {} results for {} submitted tokens",
                reply.results.len(),
                tokens.len()
            );
        }

        for (token, result) in tokens.iter().zip(&reply.results) {
            if let Some(class) = self.eval_result(token, result).await? {
                return Ok(Outcome::Retry(class));
            }
        }

        Ok(Outcome::Done)
    }

    /// Interpret a single per-recipient result. Returns a retry class when
    /// the whole batch must be re-sent.
    async fn eval_result(
        &self,
        token: &CompactString,
        result: &GatewayResult,
    ) -> Result<Option<RetryClass>, PushError> {
        if result.message_id.is_some() {
            // Delivered; adopt the canonical replacement token if one is given.
            if let Some(canonical) = &result.registration_id {
                self.store
                    .token_update(Self::NAME, token, canonical)
                    .await
                    .map_err(PushError::Store)?;
            }
            return Ok(None);
        }

        let error = match result.error.as_deref() {
            Some(e) if !e.is_empty() => e,
            _ => panic!("gateway result carries neither message_id nor error"),
        };

        match error {
            // The device is gone or the token is garbage: prune it.
            "NotRegistered" | "InvalidRegistration" | "MismatchSenderId" => {
                tracing::info!(%token, error, "pruning rejected registration token");
                if let Err(e) = self.store.token_del(Self::NAME, token).await {
                    tracing::error!(%token, "failed to prune token: {e}");
                }
                Ok(None)
            }
            "InternalServerError" => Ok(Some(RetryClass::Internal)),
            "Unavailable" => Ok(Some(RetryClass::Timeout)),
            "InvalidDataKey" | "InvalidPackageName" => {
                tracing::warn!(%token, error, "gateway refused the message for this recipient");
                Ok(None)
            }
            // We always validate size and recipients before sending, and we
            // never set a TTL; these indicate a bug on our side.
            "MessageTooBig" | "MissingRegistration" | "InvalidTtl" => {
                panic!("gateway reported {error}; this is a bug in the gateway client")
            }
            other => {
                tracing::warn!(%token, error = other, "unknown gateway error, ignoring");
                Ok(None)
            }
        }
    }
}

/// Reply body shape for HTTP 200.
#[derive(Debug, Deserialize)]
struct GatewayReply {
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    canonical_ids: u32,
    #[serde(default)]
    results: Vec<GatewayResult>,
}

#[derive(Debug, Deserialize)]
struct GatewayResult {
    message_id: Option<String>,
    registration_id: Option<String>,
    error: Option<String>,
}
