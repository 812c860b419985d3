//! Line commands on stdin, one per line. The daemon's stand-in for the app calling the service.
//!
//! ```text
//! scan | pingall | ping <peer> [game] | status | games | quit
//! invite <peer> <game> <lang> <dict> <total> <here> [name...]
//! send <peer> <game> <hex payload>
//! clear <peer>... | radio on|off | new <game> [name...] | gone <game>
//! ```
//! Game ids are decimal or `0x` hex.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use wordlink_core::{InviteInfo, PeerAddress};

use crate::games::InMemoryGames;
use crate::service::ServiceHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Scan,
    PingAll,
    Ping { peer: PeerAddress, game_id: i32 },
    Invite { peer: PeerAddress, info: InviteInfo },
    Send {
        peer: PeerAddress,
        game_id: i32,
        payload: Vec<u8>,
    },
    Clear(Vec<PeerAddress>),
    Radio(bool),
    New { game_id: i32, name: String },
    Gone(i32),
    Games,
    Status,
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("empty line")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("bad {what}: {value:?}")]
    BadValue { what: &'static str, value: String },
    #[error("bad payload: {0}")]
    BadHex(#[from] hex::FromHexError),
}

pub fn parse(line: &str) -> Result<ControlCommand, ControlError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(ControlError::Empty)?;
    let cmd = match verb {
        "scan" => ControlCommand::Scan,
        "pingall" => ControlCommand::PingAll,
        "ping" => ControlCommand::Ping {
            peer: peer(&mut words)?,
            game_id: match words.next() {
                Some(g) => game_id(g)?,
                None => 0,
            },
        },
        "invite" => {
            let peer = peer(&mut words)?;
            let game = game_id(next(&mut words, "game")?)?;
            let lang = number(next(&mut words, "lang")?, "lang")?;
            let dict = next(&mut words, "dict")?;
            let total = number(next(&mut words, "total")?, "total")?;
            let here = number(next(&mut words, "here")?, "here")?;
            let mut info = InviteInfo::new(game, lang, dict, total, here);
            let name = rest(words);
            if !name.is_empty() {
                info = info.with_name(name);
            }
            ControlCommand::Invite { peer, info }
        }
        "send" => ControlCommand::Send {
            peer: peer(&mut words)?,
            game_id: game_id(next(&mut words, "game")?)?,
            payload: hex::decode(next(&mut words, "payload")?)?,
        },
        "clear" => {
            let peers: Vec<PeerAddress> = words.map(PeerAddress::from).collect();
            if peers.is_empty() {
                return Err(ControlError::Missing("peer"));
            }
            ControlCommand::Clear(peers)
        }
        "radio" => match next(&mut words, "on|off")? {
            "on" => ControlCommand::Radio(true),
            "off" => ControlCommand::Radio(false),
            other => {
                return Err(ControlError::BadValue {
                    what: "radio state",
                    value: other.to_owned(),
                })
            }
        },
        "new" => {
            let game_id = game_id(next(&mut words, "game")?)?;
            let name = rest(words);
            ControlCommand::New {
                name: if name.is_empty() {
                    format!("Game {game_id:X}")
                } else {
                    name
                },
                game_id,
            }
        }
        "gone" => ControlCommand::Gone(game_id(next(&mut words, "game")?)?),
        "games" => ControlCommand::Games,
        "status" => ControlCommand::Status,
        "quit" | "exit" => ControlCommand::Quit,
        other => return Err(ControlError::Unknown(other.to_owned())),
    };
    Ok(cmd)
}

fn next<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    what: &'static str,
) -> Result<&'a str, ControlError> {
    words.next().ok_or(ControlError::Missing(what))
}

fn peer<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<PeerAddress, ControlError> {
    next(words, "peer").map(PeerAddress::from)
}

fn rest<'a>(words: impl Iterator<Item = &'a str>) -> String {
    words.collect::<Vec<_>>().join(" ")
}

fn number<T: std::str::FromStr>(s: &str, what: &'static str) -> Result<T, ControlError> {
    s.parse().map_err(|_| ControlError::BadValue {
        what,
        value: s.to_owned(),
    })
}

/// Decimal, or `0x` hex covering the full 32 bits.
fn game_id(s: &str) -> Result<i32, ControlError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => u32::from_str_radix(h, 16).map(|v| v as i32).ok(),
        None => s.parse::<i32>().ok(),
    };
    parsed.ok_or_else(|| ControlError::BadValue {
        what: "game id",
        value: s.to_owned(),
    })
}

/// Carry out one command. Returns false on quit.
pub fn apply(cmd: ControlCommand, handle: &ServiceHandle, games: &InMemoryGames) -> bool {
    match cmd {
        ControlCommand::Scan => {
            handle.scan();
        }
        ControlCommand::PingAll => {
            handle.broadcast_ping();
        }
        ControlCommand::Ping { peer, game_id } => {
            handle.ping(peer, game_id);
        }
        ControlCommand::Invite { peer, info } => {
            handle.invite(peer, info);
        }
        ControlCommand::Send {
            peer,
            game_id,
            payload,
        } => {
            if let Some(n) = handle.send(peer, game_id, payload) {
                println!("queued {n} bytes");
            }
        }
        ControlCommand::Clear(peers) => handle.clear_addresses(&peers),
        ControlCommand::Radio(on) => handle.radio_changed(on),
        ControlCommand::New { game_id, name } => {
            let row = games.insert(game_id, &name, PeerAddress::new(""));
            println!("row {row}: game {game_id:X} {name}");
        }
        ControlCommand::Gone(game_id) => {
            games.delete(game_id);
            handle.game_died(game_id);
        }
        ControlCommand::Games => {
            for (row, g) in games.list() {
                println!(
                    "row {row}: game {:X} {:?} dict={} host={} moves={}",
                    g.game_id,
                    g.name,
                    g.dict,
                    g.host,
                    g.moves.len()
                );
            }
        }
        ControlCommand::Status => {
            println!(
                "running={} errors={} known={:?}",
                handle.is_running(),
                handle.error_count(),
                handle.known_addresses()
            );
        }
        ControlCommand::Quit => {
            handle.shutdown();
            return false;
        }
    }
    true
}

/// Read commands from stdin until EOF or quit.
pub async fn run(handle: ServiceHandle, games: Arc<InMemoryGames>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("control: reading stdin: {e}");
                break;
            }
        };
        match parse(&line) {
            Ok(cmd) => {
                if !apply(cmd, &handle, &games) {
                    break;
                }
            }
            Err(ControlError::Empty) => {}
            Err(e) => eprintln!("{e}"),
        }
    }
    tracing::debug!("control: stdin closed");
}
