//! Dispatcher worker pool.
//!
//! A fixed number of workers consume accepted connections from one shared
//! bounded queue. Per dequeue, a worker serves exactly one request (read
//! the two request lines, parse, reply, execute an accepted mutation
//! inline) and then requeues the connection. Long-lived clients thus
//! round-robin through the pool while each connection still sees strictly
//! serial command execution.

use crate::net::Session;
use backend::store::Storage;
use backend::{Backend, Connector, push_all};
use protocol::{Command, Response, parse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};

/// Depth of the shared connection queue. The listener blocks on enqueue
/// when it is full, which throttles acceptance.
pub(crate) const QUEUE_DEPTH: usize = 10;

/// Shared handles to the connection queue.
#[derive(Clone)]
pub(crate) struct Queue {
    pub(crate) tx: mpsc::Sender<Session>,
    rx: Arc<Mutex<mpsc::Receiver<Session>>>,
}

impl Queue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    async fn recv(&self) -> Option<Session> {
        self.rx.lock().await.recv().await
    }
}

/// What to do with the connection after serving one request.
enum Disposition {
    /// The connection is healthy; put it back for its next request.
    Requeue(Session),
    /// The connection is gone or was told to go away.
    Close,
}

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) queue: Queue,
    pub(crate) backend: Backend,
    pub(crate) halt_tx: mpsc::Sender<()>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        loop {
            let session = tokio::select! {
                biased;
                _ = self.shutdown.wait_for(|stop| *stop) => break,
                session = self.queue.recv() => match session {
                    Some(session) => session,
                    None => break,
                },
            };

            match self.serve_one(session).await {
                Disposition::Close => {}
                Disposition::Requeue(session) => {
                    tokio::select! {
                        biased;
                        _ = self.shutdown.wait_for(|stop| *stop) => break,
                        result = self.queue.tx.send(session) => {
                            if result.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!(worker = self.id, "worker drained");
    }

    /// Serve exactly one request on the session.
    async fn serve_one(&mut self, mut session: Session) -> Disposition {
        // Waiting for a request is not in-flight work: give the connection
        // up when shutdown arrives. Once the header is in, the request runs
        // to completion.
        let header = tokio::select! {
            biased;
            _ = self.shutdown.wait_for(|stop| *stop) => return Disposition::Close,
            line = session.read_line() => match line {
                Ok(Some(line)) => line,
                // The client hung up between requests; nothing to log.
                Ok(None) => return Disposition::Close,
                Err(e) => {
                    tracing::error!(worker = self.id, "header read failed: {e}");
                    return Disposition::Close;
                }
            },
        };

        let body = match session.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Disposition::Close,
            Err(e) => {
                tracing::error!(worker = self.id, "body read failed: {e}");
                return Disposition::Close;
            }
        };

        let command = match parse(&header, Some(&body)) {
            Ok(command) => command,
            Err(e) => return self.reply(session, &Response::rejected(e.message)).await,
        };

        // Commands naming a gateway are rejected up front when no such
        // connector is registered; the connection stays healthy.
        if let Some(name) = command.gateway_name() {
            if !self.backend.registry.contains(name) {
                let response = Response::rejected(format!("Connector {name} does not exist"));
                return self.reply(session, &response).await;
            }
        }

        if command.is_synchronous() {
            let response = self.answer_query(&command).await;
            return self.reply(session, &response).await;
        }

        if let Err(e) = session.respond(&Response::accepted()).await {
            tracing::error!(worker = self.id, "response write failed: {e}");
            return Disposition::Close;
        }

        // The accepted reply has already gone out; the mutation runs to
        // completion before the connection is requeued so one client's
        // commands keep their causal order.
        if let Command::Halt { delay } = command {
            self.halt(delay).await;
            return Disposition::Close;
        }
        self.execute(command).await;
        Disposition::Requeue(session)
    }

    async fn reply(&self, mut session: Session, response: &Response) -> Disposition {
        match session.respond(response).await {
            Ok(()) => Disposition::Requeue(session),
            Err(e) => {
                tracing::error!(worker = self.id, "response write failed: {e}");
                Disposition::Close
            }
        }
    }

    /// Evaluate a synchronous query into `YES`/`NO`.
    async fn answer_query(&self, command: &Command) -> Response {
        let connector = command
            .gateway_name()
            .map(|name| self.backend.registry.get(name).expect("checked above"));

        let outcome = match command {
            Command::ExistsUser { user } => self.backend.store.user_exists(*user).await,
            Command::ExistsToken { token, .. } => {
                connector.expect("token form names a gateway").exists(token).await
            }
            Command::Subscribed {
                user,
                token: Some(token),
                ..
            } => {
                connector
                    .expect("subscribed names a gateway")
                    .subscribed_token(*user, token)
                    .await
            }
            Command::Subscribed { user, .. } => {
                connector
                    .expect("subscribed names a gateway")
                    .subscribed(*user)
                    .await
            }
            other => unreachable!("not a synchronous command: {other:?}"),
        };

        match outcome {
            Ok(true) => Response::yes(),
            Ok(false) => Response::no(),
            Err(e) => {
                tracing::error!(worker = self.id, "synchronous query failed: {e}");
                Response::rejected("Internal error")
            }
        }
    }

    /// Execute an accepted mutation. Failures are only observable through
    /// the log; the client has already been told `ACCEPTED`.
    async fn execute(&self, command: Command) {
        match command {
            Command::AddUser { user } => {
                if let Err(e) = self.backend.store.user_add(user).await {
                    tracing::error!(user, "ADDUSER failed: {e}");
                }
            }
            Command::DelUser { user } => {
                if let Err(e) = self.backend.store.user_del(user).await {
                    tracing::error!(user, "DELUSER failed: {e}");
                }
            }
            Command::Subscribe {
                user,
                gateway,
                token,
            } => {
                let connector = self.backend.registry.get(&gateway).expect("checked above");
                if let Err(e) = connector.register(user, &token).await {
                    tracing::error!(user, %gateway, "SUBSCRIBE failed: {e}");
                }
            }
            Command::Unsubscribe { gateway, token, .. } => {
                let connector = self.backend.registry.get(&gateway).expect("checked above");
                if let Err(e) = connector.unregister(&token).await {
                    tracing::error!(%gateway, "UNSUBSCRIBE failed: {e}");
                }
            }
            Command::Push { user, message } => {
                let (failed, failures) = push_all(&self.backend.registry, user, &message).await;
                if failed {
                    for (name, error) in failures {
                        tracing::error!(user, connector = %name, "push failed: {error}");
                    }
                }
            }
            other => unreachable!("not an asynchronous command: {other:?}"),
        }
    }

    /// Sleep out the requested delay, then ask the supervisor to halt.
    ///
    /// The signal is level-triggered: if the channel already holds an
    /// undelivered halt, another one adds nothing.
    async fn halt(&self, delay: Duration) {
        if !delay.is_zero() {
            tracing::info!(delay = ?delay, "halting after delay");
            tokio::time::sleep(delay).await;
        }
        let _ = self.halt_tx.try_send(());
    }
}
