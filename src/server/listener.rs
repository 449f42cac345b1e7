//! Canvas server listener
//!
//! Runs the TCP accept loop, upgrades connections on canvas paths to
//! WebSocket sessions, and owns the registry's broadcast loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{decode_path, topic_from_path};
use crate::registry::{BroadcastLoop, EventReceiver, Registry, Topic};
use crate::server::config::ServerConfig;
use crate::session::{Session, SessionEnd};
use crate::stats::HubStats;

/// Canvas broadcast server over registry backend `R`
pub struct CanvasServer<R: Registry> {
    config: Arc<ServerConfig>,
    registry: Arc<R>,
    events: EventReceiver,
    stats: Arc<HubStats>,
}

impl<R: Registry> CanvasServer<R> {
    /// Create a new server and its registry
    pub fn new(config: ServerConfig) -> Self {
        let (registry, events) = R::with_config(config.registry.clone());

        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            events,
            stats: Arc::new(HubStats::new()),
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Hub-wide counters
    pub fn stats(&self) -> &Arc<HubStats> {
        &self.stats
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let token = CancellationToken::new();

        let serve = self.serve(listener, token.clone());
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result,
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                token.cancel();
                serve.await
            }
        }
    }

    /// Serve connections from `listener` until `shutdown` is cancelled
    ///
    /// Returns after every session and the broadcast loop have stopped.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let CanvasServer {
            config,
            registry,
            events,
            stats,
        } = self;

        tracing::info!(
            addr = %listener.local_addr()?,
            topic_mode = ?config.topic_mode,
            delivery = ?config.registry.delivery_mode,
            "Canvas server listening"
        );

        let broadcast = BroadcastLoop::new(registry.clone(), events)
            .with_stats(stats.clone())
            .spawn(shutdown.clone());

        let ticker = config
            .stats_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| spawn_stats_ticker(stats.clone(), interval, shutdown.clone()));

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        let registry = Arc::clone(&registry);
                        let stats = Arc::clone(&stats);
                        let config = Arc::clone(&config);
                        let shutdown = shutdown.clone();

                        sessions.spawn(async move {
                            match handle_connection(socket, peer_addr, config, registry, stats, shutdown).await {
                                Ok(end) => tracing::debug!(peer = %peer_addr, reason = %end, "Connection closed"),
                                Err(e) => tracing::debug!(peer = %peer_addr, error = %e, "Connection error"),
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        drop(listener);
        tracing::info!(sessions = sessions.len(), "Canvas server stopping");

        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task failed");
            }
        }

        if let Err(e) = broadcast.await {
            tracing::error!(error = %e, "Broadcast loop failed");
        }
        if let Some(ticker) = ticker {
            let _ = ticker.await;
        }

        let snapshot = stats.snapshot();
        tracing::info!(
            connections = snapshot.connections_accepted,
            events = snapshot.events_fanned_out,
            deliveries = snapshot.deliveries,
            "Canvas server stopped"
        );

        Ok(())
    }
}

async fn handle_connection<R: Registry>(
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<R>,
    stats: Arc<HubStats>,
    shutdown: CancellationToken,
) -> Result<SessionEnd> {
    tracing::debug!(peer = %peer_addr, "New connection");

    if config.tcp_nodelay {
        socket.set_nodelay(true)?;
    }

    let topic_mode = config.topic_mode;
    let mut topic: Option<Topic> = None;
    let check_path = |request: &Request, response: Response| {
        let matched = decode_path(request.uri().path())
            .and_then(|path| topic_from_path(&path, topic_mode).map(Topic::from));

        match matched {
            Some(matched) => {
                topic = Some(matched);
                Ok(response)
            }
            None => {
                let mut refused = ErrorResponse::new(Some("not found".to_string()));
                *refused.status_mut() = StatusCode::NOT_FOUND;
                Err(refused)
            }
        }
    };

    let handshake = tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::accept_hdr_async(socket, check_path),
    );

    let ws = tokio::select! {
        _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        result = handshake => match result {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                stats.record_handshake_failure();
                return Err(e.into());
            }
            Err(_) => {
                stats.record_handshake_failure();
                return Err(Error::HandshakeTimeout(config.handshake_timeout));
            }
        },
    };

    // The callback accepted the upgrade, so a topic was recorded
    let Some(topic) = topic else {
        return Ok(SessionEnd::ClientClosed);
    };

    let session = Session::open(ws, peer_addr, topic, registry, stats).await?;
    session.run(shutdown).await
}

fn spawn_stats_ticker(
    stats: Arc<HubStats>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = stats.snapshot();
                    tracing::info!(
                        active_sessions = snapshot.active_sessions,
                        connections = snapshot.connections_accepted,
                        rejected = snapshot.connections_rejected,
                        events = snapshot.events_fanned_out,
                        average_fan_out = snapshot.average_fan_out(),
                        dropped = snapshot.dropped,
                        "Hub stats"
                    );
                }
            }
        }
    })
}
