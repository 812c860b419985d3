//! Wordlink wire protocol: version byte, command table, transport constants.

use std::time::Duration;

/// The single supported protocol version. Every frame starts with this byte.
pub const PROTOCOL_VERSION: u8 = 0;

/// Failed attempts after which a queued message is abandoned.
pub const MAX_SEND_FAIL: u32 = 3;

/// Interval between resend sweeps while the ledger holds anything.
pub const RESEND_INTERVAL: Duration = Duration::from_secs(5);

/// Watchdog for a ping exchange.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Watchdog for every other exchange.
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Game id meaning "no game".
pub const NO_GAME: i32 = 0;

/// Command byte. Values are assigned explicitly; see [`Command::from_wire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    BadProto,
    Ping,
    Pong,
    Scan,
    Invite,
    InviteAccept,
    InviteDecline,
    InviteDupId,
    InviteFailed,
    MessageSend,
    MessageAccept,
    MessageDecline,
    MessageGameGone,
    RemoveFor,
}

/// Wire value table. Append only: existing values never change meaning.
const COMMAND_TABLE: [(u8, Command); 14] = [
    (0, Command::BadProto),
    (1, Command::Ping),
    (2, Command::Pong),
    (3, Command::Scan),
    (4, Command::Invite),
    (5, Command::InviteAccept),
    (6, Command::InviteDecline),
    (7, Command::InviteDupId),
    (8, Command::InviteFailed),
    (9, Command::MessageSend),
    (10, Command::MessageAccept),
    (11, Command::MessageDecline),
    (12, Command::MessageGameGone),
    (13, Command::RemoveFor),
];

impl Command {
    /// Map a wire byte to a command. Unknown values return `None`; receivers answer BAD_PROTO.
    pub fn from_wire(byte: u8) -> Option<Command> {
        COMMAND_TABLE
            .iter()
            .find(|(value, _)| *value == byte)
            .map(|(_, cmd)| *cmd)
    }

    pub fn to_wire(self) -> u8 {
        COMMAND_TABLE
            .iter()
            .find(|(_, cmd)| *cmd == self)
            .map(|(value, _)| *value)
            .unwrap_or(0)
    }

    /// Commands a peer may open a connection with.
    pub fn is_request(self) -> bool {
        matches!(self, Command::Ping | Command::Invite | Command::MessageSend)
    }

    /// Whether `reply` is a legal answer to this request (BAD_PROTO always is).
    pub fn accepts_reply(self, reply: Command) -> bool {
        if reply == Command::BadProto {
            return true;
        }
        match self {
            Command::Ping => reply == Command::Pong,
            Command::Invite => matches!(
                reply,
                Command::InviteAccept
                    | Command::InviteDecline
                    | Command::InviteDupId
                    | Command::InviteFailed
            ),
            Command::MessageSend => matches!(
                reply,
                Command::MessageAccept | Command::MessageDecline | Command::MessageGameGone
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::BadProto => "BAD_PROTO",
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::Scan => "SCAN",
            Command::Invite => "INVITE",
            Command::InviteAccept => "INVITE_ACCEPT",
            Command::InviteDecline => "INVITE_DECLINE",
            Command::InviteDupId => "INVITE_DUP_ID",
            Command::InviteFailed => "INVITE_FAILED",
            Command::MessageSend => "MESSAGE_SEND",
            Command::MessageAccept => "MESSAGE_ACCEPT",
            Command::MessageDecline => "MESSAGE_DECLINE",
            Command::MessageGameGone => "MESSAGE_GAME_GONE",
            Command::RemoveFor => "REMOVE_FOR",
        };
        f.write_str(name)
    }
}
