//! Framing: version byte + command byte + command-specific body, big-endian integers.
//! One request and one reply per connection.

use crate::protocol::{Command, PROTOCOL_VERSION};

const HEADER_SIZE: usize = 2;
const GAME_ID_SIZE: usize = 4;
const MSG_LEN_SIZE: usize = 2;
const UTF_LEN_SIZE: usize = 2;

/// Largest MESSAGE_SEND payload: the length field is a signed 16-bit value.
pub const MAX_PAYLOAD_LEN: usize = i16::MAX as usize;

/// Largest INVITE blob: the length field is an unsigned 16-bit value.
pub const MAX_INVITE_LEN: usize = u16::MAX as usize;

/// A frame that opens a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping { game_id: i32 },
    /// Serialized [`InviteInfo`](crate::invite::InviteInfo); parsed by the receiver.
    Invite { blob: String },
    MessageSend { game_id: i32, payload: Vec<u8> },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::Ping { .. } => Command::Ping,
            Request::Invite { .. } => Command::Invite,
            Request::MessageSend { .. } => Command::MessageSend,
        }
    }
}

/// The single frame written back before the connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    BadProto,
    Pong { game_deleted: bool },
    InviteAccept,
    InviteDecline,
    InviteDupId,
    InviteFailed,
    MessageAccept,
    MessageDecline,
    MessageGameGone,
}

impl Reply {
    pub fn command(&self) -> Command {
        match self {
            Reply::BadProto => Command::BadProto,
            Reply::Pong { .. } => Command::Pong,
            Reply::InviteAccept => Command::InviteAccept,
            Reply::InviteDecline => Command::InviteDecline,
            Reply::InviteDupId => Command::InviteDupId,
            Reply::InviteFailed => Command::InviteFailed,
            Reply::MessageAccept => Command::MessageAccept,
            Reply::MessageDecline => Command::MessageDecline,
            Reply::MessageGameGone => Command::MessageGameGone,
        }
    }
}

/// Version + command bytes that start every request.
pub fn encode_header(cmd: Command) -> [u8; HEADER_SIZE] {
    [PROTOCOL_VERSION, cmd.to_wire()]
}

/// Body of a request, without the header.
pub fn encode_request_body(req: &Request) -> Result<Vec<u8>, FrameEncodeError> {
    let mut out = Vec::new();
    match req {
        Request::Ping { game_id } => {
            out.extend_from_slice(&game_id.to_be_bytes());
        }
        Request::Invite { blob } => {
            let bytes = blob.as_bytes();
            if bytes.len() > MAX_INVITE_LEN {
                return Err(FrameEncodeError::TooLarge(bytes.len()));
            }
            out.reserve(UTF_LEN_SIZE + bytes.len());
            out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Request::MessageSend { game_id, payload } => {
            if payload.len() > MAX_PAYLOAD_LEN {
                return Err(FrameEncodeError::TooLarge(payload.len()));
            }
            out.reserve(GAME_ID_SIZE + MSG_LEN_SIZE + payload.len());
            out.extend_from_slice(&game_id.to_be_bytes());
            out.extend_from_slice(&(payload.len() as i16).to_be_bytes());
            out.extend_from_slice(payload);
        }
    }
    Ok(out)
}

/// Complete request frame: header + body.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, FrameEncodeError> {
    let body = encode_request_body(req)?;
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&encode_header(req.command()));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Reply frame: one command byte, plus the deleted flag for PONG.
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut out = vec![reply.command().to_wire()];
    if let Reply::Pong { game_deleted } = reply {
        out.push(u8::from(*game_deleted));
    }
    out
}

/// Error encoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("body of {0} bytes does not fit the length field")]
    TooLarge(usize),
}

/// Reject any version byte other than [`PROTOCOL_VERSION`].
pub fn check_version(byte: u8) -> Result<(), FrameDecodeError> {
    if byte == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(FrameDecodeError::BadVersion(byte))
    }
}

/// Map a command byte that must open a connection.
pub fn decode_request_command(byte: u8) -> Result<Command, FrameDecodeError> {
    let cmd = Command::from_wire(byte).ok_or(FrameDecodeError::UnknownCommand(byte))?;
    if !cmd.is_request() {
        return Err(FrameDecodeError::NotARequest(cmd));
    }
    Ok(cmd)
}

/// Decode a request body from the front of `bytes`. Returns the request and the bytes consumed,
/// or `NeedMore` when the buffer is short (caller reads more and tries again).
pub fn decode_request_body(cmd: Command, bytes: &[u8]) -> Result<(Request, usize), FrameDecodeError> {
    match cmd {
        Command::Ping => {
            let game_id = read_i32(bytes, 0)?;
            Ok((Request::Ping { game_id }, GAME_ID_SIZE))
        }
        Command::Invite => {
            let len = read_u16(bytes, 0)? as usize;
            let end = UTF_LEN_SIZE + len;
            if bytes.len() < end {
                return Err(FrameDecodeError::NeedMore);
            }
            let blob = std::str::from_utf8(&bytes[UTF_LEN_SIZE..end])
                .map_err(|_| FrameDecodeError::BadUtf8)?
                .to_owned();
            Ok((Request::Invite { blob }, end))
        }
        Command::MessageSend => {
            let game_id = read_i32(bytes, 0)?;
            let len = read_i16(bytes, GAME_ID_SIZE)?;
            if len < 0 {
                return Err(FrameDecodeError::BadLength(len));
            }
            let start = GAME_ID_SIZE + MSG_LEN_SIZE;
            let end = start + len as usize;
            if bytes.len() < end {
                return Err(FrameDecodeError::NeedMore);
            }
            let payload = bytes[start..end].to_vec();
            Ok((Request::MessageSend { game_id, payload }, end))
        }
        other => Err(FrameDecodeError::NotARequest(other)),
    }
}

/// Decode a complete request frame (header + body).
pub fn decode_request(bytes: &[u8]) -> Result<(Request, usize), FrameDecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    check_version(bytes[0])?;
    let cmd = decode_request_command(bytes[1])?;
    let (req, n) = decode_request_body(cmd, &bytes[HEADER_SIZE..])?;
    Ok((req, HEADER_SIZE + n))
}

/// Decode the reply to a request of kind `request`.
pub fn decode_reply(request: Command, bytes: &[u8]) -> Result<(Reply, usize), FrameDecodeError> {
    let Some(&first) = bytes.first() else {
        return Err(FrameDecodeError::NeedMore);
    };
    let cmd = Command::from_wire(first).ok_or(FrameDecodeError::UnknownCommand(first))?;
    if !request.accepts_reply(cmd) {
        return Err(FrameDecodeError::UnexpectedReply { request, reply: cmd });
    }
    let reply = match cmd {
        Command::BadProto => Reply::BadProto,
        Command::Pong => {
            let Some(&flag) = bytes.get(1) else {
                return Err(FrameDecodeError::NeedMore);
            };
            return Ok((Reply::Pong { game_deleted: flag != 0 }, 2));
        }
        Command::InviteAccept => Reply::InviteAccept,
        Command::InviteDecline => Reply::InviteDecline,
        Command::InviteDupId => Reply::InviteDupId,
        Command::InviteFailed => Reply::InviteFailed,
        Command::MessageAccept => Reply::MessageAccept,
        Command::MessageDecline => Reply::MessageDecline,
        Command::MessageGameGone => Reply::MessageGameGone,
        other => return Err(FrameDecodeError::UnexpectedReply { request, reply: other }),
    };
    Ok((reply, 1))
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32, FrameDecodeError> {
    let b = bytes.get(at..at + 4).ok_or(FrameDecodeError::NeedMore)?;
    Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_i16(bytes: &[u8], at: usize) -> Result<i16, FrameDecodeError> {
    let b = bytes.get(at..at + 2).ok_or(FrameDecodeError::NeedMore)?;
    Ok(i16::from_be_bytes([b[0], b[1]]))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, FrameDecodeError> {
    let b = bytes.get(at..at + 2).ok_or(FrameDecodeError::NeedMore)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

/// Error decoding a frame. Anything but `NeedMore` abandons the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("unknown command byte {0}")]
    UnknownCommand(u8),
    #[error("{0} cannot open a connection")]
    NotARequest(Command),
    #[error("{reply} is not a reply to {request}")]
    UnexpectedReply { request: Command, reply: Command },
    #[error("negative payload length {0}")]
    BadLength(i16),
    #[error("invite blob is not valid UTF-8")]
    BadUtf8,
}
