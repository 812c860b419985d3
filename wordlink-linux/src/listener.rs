//! Inbound listener: accepts one connection at a time, answers its single request, closes it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use wordlink_core::protocol::NO_GAME;
use wordlink_core::wire;
use wordlink_core::{deliver_message, CreateOutcome, InviteInfo, Reply, Request, TransportEvent};

use crate::adapter::PairedDevice;
use crate::connection::{read_request_body, write_reply, ConnError};
use crate::context::TransportContext;

pub struct InboundListener {
    ctx: Arc<TransportContext>,
    listener: TcpListener,
    shutdown: watch::Receiver<bool>,
}

impl InboundListener {
    pub async fn bind(
        ctx: Arc<TransportContext>,
        addr: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            ctx,
            listener,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn running(&self) -> bool {
        self.ctx.adapter.is_enabled() && !*self.shutdown.borrow()
    }

    /// Accept until shutdown or until the radio goes off.
    pub async fn run(mut self) {
        tracing::info!("listener: accepting on {:?}", self.listener.local_addr());
        while self.running() {
            let accepted = tokio::select! {
                changed = self.shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                r = self.listener.accept() => r,
            };
            let (stream, remote) = match accepted {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!("listener: accept: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let device = self.ctx.adapter.identify(remote);
            self.ctx.address_book.add(&device.address);
            match tokio::time::timeout(self.ctx.timeouts.io, self.handle(stream, &device)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("listener: {} ({remote}): {e}", device.name),
                Err(_) => tracing::warn!("listener: {} ({remote}): timed out", device.name),
            }
        }
        tracing::info!("listener: exiting");
    }

    async fn handle(&self, mut stream: TcpStream, device: &PairedDevice) -> Result<(), ConnError> {
        let version = stream.read_u8().await?;
        if let Err(e) = wire::check_version(version) {
            tracing::info!("listener: {} speaks another protocol: {e}", device.name);
            write_reply(&mut stream, &Reply::BadProto).await?;
            self.ctx.post(TransportEvent::BadProto {
                peer: device.address.clone(),
            });
            return Ok(());
        }
        let cmd = match wire::decode_request_command(stream.read_u8().await?) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!("listener: {}: {e}", device.name);
                return write_reply(&mut stream, &Reply::BadProto).await;
            }
        };
        tracing::debug!("listener: {cmd} from {}", device.name);
        match read_request_body(&mut stream, cmd).await? {
            Request::Ping { game_id } => {
                let reply = self.on_ping(game_id);
                write_reply(&mut stream, &reply).await
            }
            Request::Invite { blob } => {
                let reply = self.on_invite(&blob, device);
                write_reply(&mut stream, &reply).await
            }
            Request::MessageSend { game_id, payload } => {
                let rows = self.ctx.games.rows_for_game(game_id);
                let reply = if rows.is_empty() {
                    Reply::MessageGameGone
                } else {
                    Reply::MessageAccept
                };
                write_reply(&mut stream, &reply).await?;
                // The peer is not kept waiting on the rules engine.
                drop(stream);
                if !rows.is_empty() {
                    deliver_message(
                        self.ctx.feeder.as_ref(),
                        self.ctx.events.as_ref(),
                        game_id,
                        &rows,
                        &payload,
                        &device.address,
                    );
                }
                Ok(())
            }
        }
    }

    fn on_ping(&self, game_id: i32) -> Reply {
        let game_deleted = game_id != NO_GAME && !self.ctx.games.has_game(game_id);
        Reply::Pong { game_deleted }
    }

    fn on_invite(&self, blob: &str, device: &PairedDevice) -> Reply {
        let info = match InviteInfo::from_json(blob) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("listener: bad invite from {}: {e}", device.name);
                return Reply::InviteFailed;
            }
        };
        if self.ctx.games.has_game(info.game_id) {
            tracing::info!("listener: already have game {:X}", info.game_id);
            return Reply::InviteDupId;
        }
        match self.ctx.games.create_game(&info, &device.name, &device.address) {
            CreateOutcome::Created(row) => {
                self.ctx.post(TransportEvent::InviteReceived {
                    game_id: info.game_id,
                    row,
                    sender: device.address.clone(),
                });
                Reply::InviteAccept
            }
            CreateOutcome::Failed => Reply::InviteFailed,
        }
    }
}
