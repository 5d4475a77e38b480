//! Server supervisor — listener, worker pool lifecycle, and the single
//! shutdown select.

use crate::config::Config;
use crate::dispatcher::{Queue, Worker};
use crate::net::{Listener, Session};
use anyhow::{Context, Result};
use backend::{Backend, Gateway, Gcm, Registry, Store};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot, watch};

/// A bound, not-yet-running daemon.
pub struct Server {
    listener: Listener,
    backend: Backend,
    dispatchers: u8,
    socket_path: Option<PathBuf>,
}

impl Server {
    /// Build the connector registry and bind the listen endpoint.
    pub async fn bind(config: &Config, store: Store) -> Result<Self> {
        let mut registry = Registry::new();
        if let Some(gcm) = &config.gcm {
            registry.register(Gcm::NAME, Gateway::Gcm(Gcm::new(gcm, store.clone())?));
            tracing::info!("registered connector '{}'", Gcm::NAME);
        }

        let listener = Listener::bind(&config.listen)
            .await
            .context("failed to bind the listen endpoint")?;
        let socket_path = (!config.listen.socket.is_empty())
            .then(|| PathBuf::from(&config.listen.socket));

        Ok(Self {
            listener,
            backend: Backend::new(store, registry),
            dispatchers: config.dispatchers,
            socket_path,
        })
    }

    /// The bound TCP address, when listening on TCP. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until one of the three shutdown sources fires: the external
    /// `stop` signal, an accepted `HALT`, or a listener failure. Returns
    /// once every worker has drained.
    pub async fn run(self, mut stop: oneshot::Receiver<()>) -> Result<()> {
        tracing::info!("starting server");

        let queue = Queue::new();
        let (halt_tx, mut halt_rx) = mpsc::channel::<()>(1);
        let (failure_tx, failure_rx) = oneshot::channel::<()>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = Vec::with_capacity(self.dispatchers as usize);
        for id in 0..self.dispatchers as usize {
            let worker = Worker {
                id,
                queue: queue.clone(),
                backend: self.backend.clone(),
                halt_tx: halt_tx.clone(),
                shutdown: shutdown_rx.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
        }

        let acceptor = tokio::spawn(accept_loop(
            self.listener,
            queue.tx.clone(),
            failure_tx,
            shutdown_rx,
        ));
        // Workers and the acceptor hold their own queue handles; dropping
        // ours lets the queue close once they are gone.
        drop(queue);
        drop(halt_tx);

        tracing::info!("server is initialized, accepting connections");

        tokio::select! {
            _ = &mut stop => tracing::info!("stop requested"),
            _ = halt_rx.recv() => tracing::info!("halt command received"),
            _ = failure_rx => tracing::error!("listener failed, terminating"),
        }

        tracing::info!("server is halting");
        let _ = shutdown_tx.send(true);

        for worker in workers {
            let _ = worker.await;
        }
        let _ = acceptor.await;

        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

/// Accept connections and feed them to the queue until shutdown.
///
/// The bounded enqueue is the back-pressure point: a full queue blocks
/// acceptance. An accept error reports a listener failure upstream.
async fn accept_loop(
    listener: Listener,
    queue: mpsc::Sender<Session>,
    failure: oneshot::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let session = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            accepted = listener.accept() => match accepted {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!("accept failed: {e}");
                    let _ = failure.send(());
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            sent = queue.send(session) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("accept loop finished");
}

/// Create the database schema named by the configuration and return.
/// Backs the daemon's `--initdb` mode.
pub async fn init_database(config: &Config) -> Result<()> {
    backend::init_schema(&config.postgres, [Gcm::NAME]).await
}
