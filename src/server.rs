//! TCP Server and Lifecycle
//!
//! Wires the pieces together: bind the listener, start the expiration
//! reaper, accept connections behind the connection gate, and orchestrate
//! graceful shutdown.
//!
//! ## Shutdown sequence
//!
//! When the shutdown future completes (SIGINT/SIGTERM in the binary):
//!
//! 1. the accept loop stops taking new connections,
//! 2. the shutdown watch channel flips, which every worker observes at its
//!    loop head or mid-read, and the reaper observes mid-sleep,
//! 3. the controller drains the worker join set and awaits the reaper
//!    before returning.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{start_reaper, Keyspace};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Bounds the number of simultaneously served clients.
///
/// The count is checked and incremented in one critical section so a burst
/// of accepts cannot race past the cap.
#[derive(Debug)]
pub struct ClientGate {
    active: Mutex<usize>,
    limit: usize,
}

impl ClientGate {
    pub fn new(limit: usize) -> Self {
        Self {
            active: Mutex::new(0),
            limit,
        }
    }

    /// Registers a client, or refuses when the cap is reached. The slot is
    /// released when the returned permit drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ClientPermit> {
        let mut active = self.active.lock().unwrap();
        if *active >= self.limit {
            return None;
        }
        *active += 1;
        Some(ClientPermit {
            gate: Arc::clone(self),
        })
    }

    /// The number of currently registered clients.
    pub fn active(&self) -> usize {
        *self.active.lock().unwrap()
    }
}

/// RAII registration of one client against the gate.
#[derive(Debug)]
pub struct ClientPermit {
    gate: Arc<ClientGate>,
}

impl Drop for ClientPermit {
    fn drop(&mut self) {
        *self.gate.active.lock().unwrap() -= 1;
    }
}

/// The server: keyspace, reaper, accept loop, and shutdown orchestration.
pub struct Server {
    config: Config,
    keyspace: Arc<Keyspace>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            keyspace: Arc::new(Keyspace::new()),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// The keyspace served by this instance.
    pub fn keyspace(&self) -> Arc<Keyspace> {
        Arc::clone(&self.keyspace)
    }

    /// Runs the server until `shutdown` completes, then shuts down
    /// gracefully.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        self.serve(listener, shutdown).await
    }

    /// Like [`Server::run`], but with a caller-supplied listener. Useful for
    /// binding to an ephemeral port in tests.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "Listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reaper = start_reaper(
            Arc::clone(&self.keyspace),
            self.config.expiration_check_interval,
            shutdown_rx.clone(),
        );

        let gate = Arc::new(ClientGate::new(self.config.max_connections));
        let mut workers = JoinSet::new();

        tokio::select! {
            _ = shutdown => {
                info!("Shutdown signal received, stopping server");
            }
            _ = accept_loop(
                &listener,
                Arc::clone(&self.keyspace),
                Arc::clone(&self.stats),
                Arc::clone(&gate),
                shutdown_rx,
                &mut workers,
            ) => {}
        }

        // Flipping the channel stops every worker and the reaper; dropping
        // the listener refuses anything still in the backlog.
        let _ = shutdown_tx.send(true);
        drop(listener);

        while workers.join_next().await.is_some() {}
        if let Err(err) = reaper.await {
            error!(error = %err, "Reaper task failed");
        }

        info!(
            accepted = self.stats.accepted.load(Ordering::Relaxed),
            rejected = self.stats.rejected.load(Ordering::Relaxed),
            commands = self.stats.commands.load(Ordering::Relaxed),
            "Server stopped"
        );
        Ok(())
    }
}

async fn accept_loop(
    listener: &TcpListener,
    keyspace: Arc<Keyspace>,
    stats: Arc<ConnectionStats>,
    gate: Arc<ClientGate>,
    shutdown: watch::Receiver<bool>,
    workers: &mut JoinSet<()>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let Some(permit) = gate.try_acquire() else {
                    warn!(client = %addr, active = gate.active(), "Connection cap reached, closing");
                    stats.connection_rejected();
                    continue;
                };

                let commands = CommandHandler::new(Arc::clone(&keyspace));
                let shutdown = shutdown.clone();
                let stats = Arc::clone(&stats);
                workers.spawn(async move {
                    // Held for the whole connection; dropping frees the slot.
                    let _permit = permit;
                    handle_connection(stream, addr, commands, shutdown, stats).await;
                });
            }
            Err(err) => {
                error!(error = %err, "Failed to accept connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    struct RunningServer {
        addr: std::net::SocketAddr,
        stop: oneshot::Sender<()>,
        done: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    async fn start_server(config: Config) -> RunningServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel();

        let server = Server::new(config);
        let done = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        RunningServer { addr, stop, done }
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8], reply_len: usize) -> Vec<u8> {
        client.write_all(request).await.unwrap();
        let mut buf = vec![0u8; reply_len];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[test]
    fn test_gate_enforces_cap() {
        let gate = Arc::new(ClientGate::new(2));

        let first = gate.try_acquire().unwrap();
        let second = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.active(), 2);

        drop(first);
        assert_eq!(gate.active(), 1);
        let _third = gate.try_acquire().unwrap();
        drop(second);
    }

    #[tokio::test]
    async fn test_end_to_end_commands() {
        let server = start_server(Config::default()).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        let reply = roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", 7).await;
        assert_eq!(reply, b"+PONG\r\n");

        let reply = roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n",
            5,
        )
        .await;
        assert_eq!(reply, b"+OK\r\n");

        let reply = roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", 7).await;
        assert_eq!(reply, b"$1\r\nv\r\n");

        drop(client);
        server.stop.send(()).unwrap();
        server.done.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_cap_closes_excess_clients() {
        let config = Config {
            max_connections: 2,
            ..Config::default()
        };
        let server = start_server(config).await;

        let mut first = TcpStream::connect(server.addr).await.unwrap();
        let mut second = TcpStream::connect(server.addr).await.unwrap();

        // Prove both are registered before the third connects.
        let _ = roundtrip(&mut first, b"*1\r\n$4\r\nPING\r\n", 7).await;
        let _ = roundtrip(&mut second, b"*1\r\n$4\r\nPING\r\n", 7).await;

        let mut third = TcpStream::connect(server.addr).await.unwrap();
        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(2), third.read_to_end(&mut buf))
            .await
            .expect("third connection was not closed")
            .unwrap();
        assert_eq!(n, 0, "excess connection must be closed without a reply");

        // Slots free up once a registered client leaves.
        drop(first);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut fourth = TcpStream::connect(server.addr).await.unwrap();
        let reply = roundtrip(&mut fourth, b"*1\r\n$4\r\nPING\r\n", 7).await;
        assert_eq!(reply, b"+PONG\r\n");

        server.stop.send(()).unwrap();
        server.done.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_graceful_shutdown_waits_for_workers() {
        let server = start_server(Config::default()).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();
        let _ = roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", 7).await;

        server.stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), server.done)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();

        // The worker closed our socket on its way out.
        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reaper_runs_against_server_keyspace() {
        let config = Config {
            expiration_check_interval: Duration::from_millis(20),
            ..Config::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(config);
        let keyspace = server.keyspace();
        let (stop, stop_rx) = oneshot::channel();

        keyspace.set(
            bytes::Bytes::from("ephemeral"),
            bytes::Bytes::from("v"),
            Some(Duration::from_millis(30)),
        );

        let done = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Reclaimed by the reaper without any client traffic.
        assert_eq!(keyspace.len(), 0);

        stop.send(()).unwrap();
        done.await.unwrap().unwrap();
    }
}
