//! Transport service: starts the listener and sender tasks and hands out the command handle.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use wordlink_core::integrity::payload_digest;
use wordlink_core::wire::MAX_PAYLOAD_LEN;
use wordlink_core::{InviteInfo, MessageSend, OutboundAction, PeerAddress, TransportEvent};

use crate::connection::TcpLink;
use crate::context::TransportContext;
use crate::listener::InboundListener;
use crate::sender::{DeadGames, SenderWorker};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("radio is off")]
    RadioOff,
    #[error("binding {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

pub struct TransportService {
    handle: ServiceHandle,
    local_addr: SocketAddr,
    sender: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl TransportService {
    /// Bind the listener and spawn both tasks. Must be called inside a tokio runtime.
    pub async fn start(ctx: Arc<TransportContext>, bind: SocketAddr) -> Result<Self, StartError> {
        if !ctx.adapter.is_enabled() {
            return Err(StartError::RadioOff);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = match InboundListener::bind(ctx.clone(), bind, shutdown_rx.clone()).await {
            Ok(l) => l,
            Err(source) => {
                ctx.post(TransportEvent::ListenerStopped);
                return Err(StartError::Bind { addr: bind, source });
            }
        };
        let local_addr = listener.local_addr().map_err(|source| StartError::Bind {
            addr: bind,
            source,
        })?;
        let shutdown = Arc::new(shutdown_tx);

        let (queue, queue_rx) = mpsc::unbounded_channel();
        let dead_games = Arc::new(DeadGames::default());
        let resend_now = Arc::new(Notify::new());
        let worker = SenderWorker::new(
            ctx.clone(),
            TcpLink::new(ctx.clone()),
            queue_rx,
            dead_games.clone(),
            resend_now.clone(),
            shutdown_rx,
        );
        let sender = tokio::spawn(worker.run());

        // When the listener stops for any reason the whole service goes down with it.
        let listener = {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                listener.run().await;
                ctx.post(TransportEvent::ListenerStopped);
                shutdown.send_replace(true);
            })
        };

        Ok(Self {
            handle: ServiceHandle {
                ctx,
                queue,
                dead_games,
                resend_now,
                shutdown,
            },
            local_addr,
            sender,
            listener,
        })
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for both tasks to finish.
    pub async fn wait(self) {
        if let Err(e) = self.sender.await {
            tracing::error!("sender task: {e}");
        }
        if let Err(e) = self.listener.await {
            tracing::error!("listener task: {e}");
        }
    }
}

/// Cheap, cloneable front door to a running service. Every command only enqueues work.
#[derive(Clone)]
pub struct ServiceHandle {
    ctx: Arc<TransportContext>,
    queue: mpsc::UnboundedSender<OutboundAction>,
    dead_games: Arc<DeadGames>,
    resend_now: Arc<Notify>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServiceHandle {
    fn enqueue(&self, action: OutboundAction) -> bool {
        let kind = action.kind();
        if self.queue.send(action).is_err() {
            tracing::warn!("transport stopped; dropping {kind}");
            return false;
        }
        true
    }

    /// Ping every paired device, then report the known addresses.
    pub fn scan(&self) -> bool {
        self.enqueue(OutboundAction::Scan)
    }

    pub fn ping(&self, peer: PeerAddress, game_id: i32) -> bool {
        self.enqueue(OutboundAction::Ping {
            peer: Some(peer),
            game_id,
        })
    }

    pub fn broadcast_ping(&self) -> bool {
        self.enqueue(OutboundAction::Ping {
            peer: None,
            game_id: 0,
        })
    }

    pub fn invite(&self, peer: PeerAddress, info: InviteInfo) -> bool {
        self.enqueue(OutboundAction::Invite { peer, info })
    }

    /// Queue a game message. Returns the number of bytes queued, or `None` when the payload
    /// is too large for the length field or the service has stopped.
    pub fn send(&self, peer: PeerAddress, game_id: i32, payload: Vec<u8>) -> Option<usize> {
        let len = payload.len();
        if len > MAX_PAYLOAD_LEN {
            tracing::warn!("refusing {len}-byte message for game {game_id:X}: over {MAX_PAYLOAD_LEN}");
            return None;
        }
        self.ctx.address_book.add(&peer);
        tracing::debug!("queueing {len} bytes ({}) for {peer}", payload_digest(&payload));
        self.enqueue(OutboundAction::Send(MessageSend {
            peer,
            game_id,
            payload,
        }))
        .then_some(len)
    }

    /// Forget addresses, then report what is left.
    pub fn clear_addresses(&self, addresses: &[PeerAddress]) {
        self.ctx.address_book.remove(addresses);
        self.ctx.post(TransportEvent::ScanDone {
            addresses: self.ctx.address_book.snapshot(),
        });
    }

    pub fn radio_changed(&self, on: bool) {
        self.ctx.adapter.set_enabled(on);
        if on {
            self.ctx.post(TransportEvent::RadioEnabled);
            self.resend_now.notify_one();
        } else {
            self.ctx.post(TransportEvent::RadioDisabled);
            self.shutdown();
        }
    }

    /// The local game is gone: drop anything still queued for it.
    pub fn game_died(&self, game_id: i32) {
        self.dead_games.insert(game_id);
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    pub fn error_count(&self) -> u32 {
        self.ctx.error_count()
    }

    pub fn known_addresses(&self) -> Vec<PeerAddress> {
        self.ctx.address_book.snapshot()
    }

    /// Resolves once the service has been told to stop.
    pub async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
