//! Game collaborators and the bridge that hands received messages to them.

use crate::events::{EventSink, TransportEvent};
use crate::integrity::payload_digest;
use crate::invite::InviteInfo;
use crate::peer::PeerAddress;

/// Local row id of a stored game.
pub type RowId = i64;

/// Result of materialising a game from an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(RowId),
    Failed,
}

/// Narrow view of the local game database.
pub trait GameStore: Send + Sync {
    fn has_game(&self, game_id: i32) -> bool;
    fn rows_for_game(&self, game_id: i32) -> Vec<RowId>;
    fn create_game(
        &self,
        info: &InviteInfo,
        sender_name: &str,
        sender: &PeerAddress,
    ) -> CreateOutcome;
}

/// Last move applied to a stored game, for the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveSummary {
    pub text: String,
}

/// The rules engine, seen from the transport.
pub trait GameFeeder: Send + Sync {
    /// Offer the message to an open, in-memory instance. True when it consumed it.
    fn feed_live(&self, game_id: i32, payload: &[u8], sender: &PeerAddress) -> bool;

    /// Load the stored game, apply, save. `None` when nothing new was applied.
    fn feed_stored(&self, row: RowId, payload: &[u8], sender: &PeerAddress)
        -> Option<MoveSummary>;
}

/// Deliver a received message to the game(s) with `game_id`. Returns whether anything consumed it.
///
/// A live instance gets the first offer and, when it consumes, stored copies are left alone.
/// Otherwise every local row is offered in turn; each that applies a move posts `MoveReceived`.
pub fn deliver_message(
    feeder: &dyn GameFeeder,
    events: &dyn EventSink,
    game_id: i32,
    rows: &[RowId],
    payload: &[u8],
    sender: &PeerAddress,
) -> bool {
    if feeder.feed_live(game_id, payload, sender) {
        tracing::debug!("game {game_id:X}: live instance took {}", payload_digest(payload));
        return true;
    }
    let mut consumed = false;
    for &row in rows {
        match feeder.feed_stored(row, payload, sender) {
            Some(summary) => {
                consumed = true;
                events.post(TransportEvent::MoveReceived {
                    game_id,
                    row,
                    summary: summary.text,
                });
            }
            None => {
                tracing::debug!("game {game_id:X}: row {row} did not take the message");
            }
        }
    }
    if !consumed {
        tracing::info!(
            "nobody took msg {} for game {game_id:X}",
            payload_digest(payload)
        );
    }
    consumed
}
