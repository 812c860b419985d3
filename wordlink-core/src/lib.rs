//! Wordlink peer transport core.
//! No socket I/O: the host owns connections and tasks; this crate owns the protocol and the state.

pub mod address_book;
pub mod events;
pub mod feeder;
pub mod integrity;
pub mod invite;
pub mod outbound;
pub mod peer;
pub mod protocol;
pub mod resend;
pub mod wire;

pub use address_book::{AddressBook, AddressStore};
pub use events::{EventSink, TransportEvent};
pub use feeder::{deliver_message, CreateOutcome, GameFeeder, GameStore, MoveSummary, RowId};
pub use invite::InviteInfo;
pub use outbound::{MessageSend, OutboundAction, PendingSend};
pub use peer::PeerAddress;
pub use protocol::{Command, MAX_SEND_FAIL, PROTOCOL_VERSION};
pub use resend::{ResendLedger, RetryOutcome};
pub use wire::{FrameDecodeError, FrameEncodeError, Reply, Request};
