//! TCP feed server.
//!
//! Accepts any number of peers and broadcasts each bar to all of them on a
//! fixed tick cadence. One BarSource cursor is shared by the whole session;
//! every peer sees the same bar at the same logical tick. Fan-out is
//! best-effort: a peer whose socket write fails is dropped from the registry
//! without disturbing the others, and there is no redelivery of missed bars
//! to late joiners.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::adapters::wire::{self, FeedMessage};
use crate::domain::error::TickfeedError;
use crate::ports::bar_source::BarSource;

/// Write halves of connected peers, keyed by connection id. All insertion,
/// broadcast iteration and removal happens under this one lock so a peer is
/// never written to after its handle has been dropped.
type PeerRegistry = Arc<Mutex<HashMap<u64, OwnedWriteHalf>>>;

pub struct FeedServer {
    listener: TcpListener,
}

impl FeedServer {
    pub async fn bind(addr: &str) -> Result<Self, TickfeedError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TickfeedError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(FeedServer { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TickfeedError> {
        Ok(self.listener.local_addr()?)
    }

    /// Replay the whole dataset: one bar broadcast per tick, an explicit
    /// end-of-stream sentinel to every peer at end-of-data, then all
    /// connections are shut down. Returns the number of bars broadcast.
    pub async fn run<S: BarSource>(
        self,
        mut source: S,
        tick_interval: Duration,
    ) -> Result<u64, TickfeedError> {
        let peers: PeerRegistry = Arc::new(Mutex::new(HashMap::new()));
        let first_peer = Arc::new(Notify::new());

        let accept_peers = Arc::clone(&peers);
        let accept_notify = Arc::clone(&first_peer);
        let listener = self.listener;
        let accept_task = tokio::spawn(async move {
            let mut next_id: u64 = 0;
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!(peer = %addr, "client connected");
                        // The feed is one-directional; the read half is
                        // dropped and never polled.
                        let (_read, write) = stream.into_split();
                        accept_peers.lock().await.insert(next_id, write);
                        accept_notify.notify_one();
                        next_id += 1;
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
        });

        // The session runs from the first accepted connection to
        // end-of-data; no ticks fire into an empty registry.
        while peers.lock().await.is_empty() {
            first_peer.notified().await;
        }

        let replay = async {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // An interval's first tick completes immediately; consume it so
            // the first bar goes out one full interval after the session
            // starts.
            ticker.tick().await;

            let mut broadcast_count: u64 = 0;
            while let Some(bar) = source.next_bar()? {
                ticker.tick().await;
                let line = wire::encode_line(&FeedMessage::Bar(bar))?;
                broadcast(&peers, line.as_bytes()).await;
                broadcast_count += 1;
            }
            Ok::<u64, TickfeedError>(broadcast_count)
        }
        .await;
        accept_task.abort();

        let broadcast_count = replay?;

        // End of data: sentinel to every peer, then close them all.
        let sentinel = wire::encode_line(&FeedMessage::EndOfStream)?;
        {
            let mut registry = peers.lock().await;
            for (id, writer) in registry.iter_mut() {
                if let Err(e) = writer.write_all(sentinel.as_bytes()).await {
                    warn!(peer = id, "end-of-stream write failed: {e}");
                }
                let _ = writer.shutdown().await;
            }
            registry.clear();
        }

        info!(bars = broadcast_count, "end of data, session closed");
        Ok(broadcast_count)
    }
}

/// One critical section per tick: write the serialized bar to every peer and
/// evict the ones whose connection has gone away.
async fn broadcast(peers: &PeerRegistry, payload: &[u8]) {
    let mut registry = peers.lock().await;
    let mut dropped: Vec<u64> = Vec::new();

    for (id, writer) in registry.iter_mut() {
        if let Err(e) = writer.write_all(payload).await {
            warn!(peer = id, "dropping disconnected peer: {e}");
            dropped.push(*id);
        }
    }
    for id in dropped {
        registry.remove(&id);
    }
}
