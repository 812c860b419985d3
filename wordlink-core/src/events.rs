//! Status events the transport reports to the UI layer. Fire-and-forget.

use std::time::Duration;

use crate::peer::PeerAddress;
use crate::protocol::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer spoke another protocol version, or answered us with BAD_PROTO.
    BadProto { peer: PeerAddress },
    RadioEnabled,
    RadioDisabled,
    ScanDone { addresses: Vec<PeerAddress> },
    HostPonged { peer: PeerAddress },
    /// The peer no longer has the game we pinged about.
    NoSuchGame { peer: PeerAddress, game_id: i32 },
    NewGameSuccess { game_id: i32 },
    NewGameFailure { game_id: i32, reply: Option<Command> },
    /// Nothing answered an invite: the app is not running on the peer.
    AppNotFound { peer: PeerAddress },
    MessageAccepted { peer: PeerAddress, game_id: i32 },
    MessageRefused { peer: PeerAddress, game_id: i32 },
    MessageNoGame { peer: PeerAddress, game_id: i32 },
    MessageResend {
        peer: PeerAddress,
        retry_in: Duration,
        fail_count: u32,
    },
    /// Gave up after the fail-count ceiling.
    MessageFailout { peer: PeerAddress, game_id: i32 },
    /// Discarded because the local game was deleted.
    MessageDropped { game_id: i32 },
    InviteReceived {
        game_id: i32,
        row: i64,
        sender: PeerAddress,
    },
    MoveReceived {
        game_id: i32,
        row: i64,
        summary: String,
    },
    ConnectFailed { peer: PeerAddress, errors: u32 },
    ListenerStopped,
}

/// Consumer of transport events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn post(&self, event: TransportEvent);
}
