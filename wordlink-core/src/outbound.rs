//! Outbound actions queued for the sender, and the retry wrapper for message sends.

use crate::invite::InviteInfo;
use crate::peer::PeerAddress;

/// One game message bound for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSend {
    pub peer: PeerAddress,
    pub game_id: i32,
    pub payload: Vec<u8>,
}

/// Work for the sender. Immutable once queued; retry state lives in [`PendingSend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Targeted ping when `peer` is set; otherwise ping every paired device not yet known.
    Ping {
        peer: Option<PeerAddress>,
        game_id: i32,
    },
    /// Broadcast ping followed by a scan-done report.
    Scan,
    Invite { peer: PeerAddress, info: InviteInfo },
    Send(MessageSend),
}

impl OutboundAction {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundAction::Ping { peer: Some(_), .. } => "ping",
            OutboundAction::Ping { peer: None, .. } => "ping-all",
            OutboundAction::Scan => "scan",
            OutboundAction::Invite { .. } => "invite",
            OutboundAction::Send(_) => "send",
        }
    }

    pub fn peer(&self) -> Option<&PeerAddress> {
        match self {
            OutboundAction::Ping { peer, .. } => peer.as_ref(),
            OutboundAction::Scan => None,
            OutboundAction::Invite { peer, .. } => Some(peer),
            OutboundAction::Send(send) => Some(&send.peer),
        }
    }
}

/// A message send waiting in the resend ledger, with its failed-attempt count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub send: MessageSend,
    pub fail_count: u32,
}

impl PendingSend {
    pub fn new(send: MessageSend) -> Self {
        Self {
            send,
            fail_count: 0,
        }
    }
}
