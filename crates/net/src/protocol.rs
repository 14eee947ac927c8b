//! Binary packet codec
//!
//! Every packet is a single [`PacketType`] ordinal byte followed by its
//! payload. All fields are single bytes except strings (1-byte length plus
//! ASCII bytes) and points (u32, big-endian).
//!
//! | ord | packet | payload |
//! |-----|--------|---------|
//! | 0 | ClientInfo | connection u8, human count u8, count u8, {name str, ai u8}* |
//! | 1 | ServerInfo | connection u8, ready u8, columns u8, rows u8, count u8, {player u8, name str, level u8, points u32, ai u8, current u8, next u8}* |
//! | 2 | StartGame | - |
//! | 3 | StartBlock | connection u8, count u8, {current u8, next u8}* |
//! | 4 | Input | player u8, move u8, next u8 |
//! | 5 | Tetris | player u8, count u8, block u8* |
//! | 6 | Ready | connection u8, ready u8 |
//! | 7 | PlayerLevel | player u8, level u8 |
//! | 8 | PlayerName | player u8, name str |
//! | 9 | Pause | - |

use thiserror::Error;

use net_tetris_types::{BlockType, ConnectionId, Move, PacketType, PlayerId};

/// Fatal protocol violation raised while dispatching a packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{packet:?} from connection {sender} is not accepted from that sender")]
    WrongSender {
        packet: PacketType,
        sender: ConnectionId,
    },

    #[error("{packet:?} is not allowed {state}")]
    IllegalState {
        packet: PacketType,
        state: &'static str,
    },

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Lobby entry sent by a client for each of its local players
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPlayer {
    pub name: String,
    pub ai: bool,
}

/// Roster entry broadcast by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterPlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub level: u8,
    pub points: u32,
    pub ai: bool,
    pub current: BlockType,
    pub next: BlockType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ClientInfo {
        connection_id: ConnectionId,
        human_count: u8,
        players: Vec<ClientPlayer>,
    },
    ServerInfo {
        connection_id: ConnectionId,
        ready: bool,
        columns: u8,
        rows: u8,
        players: Vec<RosterPlayer>,
    },
    StartGame,
    StartBlock {
        connection_id: ConnectionId,
        /// (current, next) per player, in connection order
        blocks: Vec<(BlockType, BlockType)>,
    },
    Input {
        player_id: PlayerId,
        mv: Move,
        next: BlockType,
    },
    Tetris {
        player_id: PlayerId,
        /// Whole garbage rows, top-left cell first
        blocks: Vec<BlockType>,
    },
    Ready {
        connection_id: ConnectionId,
        ready: bool,
    },
    PlayerLevel {
        player_id: PlayerId,
        level: u8,
    },
    PlayerName {
        player_id: PlayerId,
        name: String,
    },
    Pause,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ClientInfo { .. } => PacketType::ClientInfo,
            Packet::ServerInfo { .. } => PacketType::ServerInfo,
            Packet::StartGame => PacketType::StartGame,
            Packet::StartBlock { .. } => PacketType::StartBlock,
            Packet::Input { .. } => PacketType::Input,
            Packet::Tetris { .. } => PacketType::Tetris,
            Packet::Ready { .. } => PacketType::Ready,
            Packet::PlayerLevel { .. } => PacketType::PlayerLevel,
            Packet::PlayerName { .. } => PacketType::PlayerName,
            Packet::Pause => PacketType::Pause,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(16);
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Append the encoded packet to `buf`
    ///
    /// A repeated field with more than 255 entries has no wire form and is
    /// refused; `buf` is left as it was. Strings are cut to 255 bytes.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let start = buf.len();
        let result = self.write_payload(buf);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    fn write_payload(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        buf.push(self.packet_type().as_u8());
        match self {
            Packet::ClientInfo {
                connection_id,
                human_count,
                players,
            } => {
                buf.push(*connection_id);
                buf.push(*human_count);
                buf.push(self.count(players.len())?);
                for player in players {
                    write_str(buf, &player.name);
                    buf.push(player.ai as u8);
                }
            }
            Packet::ServerInfo {
                connection_id,
                ready,
                columns,
                rows,
                players,
            } => {
                buf.extend_from_slice(&[*connection_id, *ready as u8, *columns, *rows]);
                buf.push(self.count(players.len())?);
                for player in players {
                    buf.push(player.player_id);
                    write_str(buf, &player.name);
                    buf.push(player.level);
                    buf.extend_from_slice(&player.points.to_be_bytes());
                    buf.push(player.ai as u8);
                    buf.push(player.current.as_u8());
                    buf.push(player.next.as_u8());
                }
            }
            Packet::StartGame | Packet::Pause => {}
            Packet::StartBlock {
                connection_id,
                blocks,
            } => {
                buf.push(*connection_id);
                buf.push(self.count(blocks.len())?);
                for (current, next) in blocks {
                    buf.push(current.as_u8());
                    buf.push(next.as_u8());
                }
            }
            Packet::Input { player_id, mv, next } => {
                buf.extend_from_slice(&[*player_id, mv.as_u8(), next.as_u8()]);
            }
            Packet::Tetris { player_id, blocks } => {
                buf.push(*player_id);
                buf.push(self.count(blocks.len())?);
                buf.extend(blocks.iter().map(|b| b.as_u8()));
            }
            Packet::Ready {
                connection_id,
                ready,
            } => {
                buf.extend_from_slice(&[*connection_id, *ready as u8]);
            }
            Packet::PlayerLevel { player_id, level } => {
                buf.extend_from_slice(&[*player_id, *level]);
            }
            Packet::PlayerName { player_id, name } => {
                buf.push(*player_id);
                write_str(buf, name);
            }
        }
        Ok(())
    }

    fn count(&self, len: usize) -> Result<u8, ProtocolError> {
        u8::try_from(len).map_err(|_| {
            ProtocolError::MalformedPacket(format!(
                "{:?}: {} entries do not fit a count byte",
                self.packet_type(),
                len
            ))
        })
    }

    /// Decode one packet; trailing bytes are a length error
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = bytes
            .split_first()
            .ok_or_else(|| ProtocolError::MalformedPacket("empty packet".to_string()))?;
        let packet_type = PacketType::from_u8(tag).ok_or(ProtocolError::UnknownPacketType(tag))?;
        let mut r = Reader::new(packet_type, payload);

        let packet = match packet_type {
            PacketType::ClientInfo => {
                let connection_id = r.u8()?;
                let human_count = r.u8()?;
                let count = r.u8()?;
                let mut players = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = r.string()?;
                    let ai = r.flag()?;
                    players.push(ClientPlayer { name, ai });
                }
                Packet::ClientInfo {
                    connection_id,
                    human_count,
                    players,
                }
            }
            PacketType::ServerInfo => {
                let connection_id = r.u8()?;
                let ready = r.flag()?;
                let columns = r.u8()?;
                let rows = r.u8()?;
                let count = r.u8()?;
                let mut players = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    players.push(RosterPlayer {
                        player_id: r.u8()?,
                        name: r.string()?,
                        level: r.u8()?,
                        points: r.u32()?,
                        ai: r.flag()?,
                        current: r.block_type()?,
                        next: r.block_type()?,
                    });
                }
                Packet::ServerInfo {
                    connection_id,
                    ready,
                    columns,
                    rows,
                    players,
                }
            }
            PacketType::StartGame => Packet::StartGame,
            PacketType::StartBlock => {
                let connection_id = r.u8()?;
                let count = r.u8()?;
                let mut blocks = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    blocks.push((r.block_type()?, r.block_type()?));
                }
                Packet::StartBlock {
                    connection_id,
                    blocks,
                }
            }
            PacketType::Input => Packet::Input {
                player_id: r.u8()?,
                mv: r.mv()?,
                next: r.block_type()?,
            },
            PacketType::Tetris => {
                let player_id = r.u8()?;
                let count = r.u8()?;
                let mut blocks = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    blocks.push(r.block_type()?);
                }
                Packet::Tetris { player_id, blocks }
            }
            PacketType::Ready => Packet::Ready {
                connection_id: r.u8()?,
                ready: r.flag()?,
            },
            PacketType::PlayerLevel => Packet::PlayerLevel {
                player_id: r.u8()?,
                level: r.u8()?,
            },
            PacketType::PlayerName => Packet::PlayerName {
                player_id: r.u8()?,
                name: r.string()?,
            },
            PacketType::Pause => Packet::Pause,
        };

        r.finish()?;
        Ok(packet)
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(u8::MAX as usize)
        .collect();
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(&bytes);
}

/// Bounds-checked payload cursor
struct Reader<'a> {
    packet_type: PacketType,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(packet_type: PacketType, bytes: &'a [u8]) -> Self {
        Self {
            packet_type,
            bytes,
            pos: 0,
        }
    }

    fn malformed(&self, what: &str) -> ProtocolError {
        ProtocolError::MalformedPacket(format!(
            "{:?}: {} at offset {} of {}",
            self.packet_type,
            what,
            self.pos,
            self.bytes.len()
        ))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.bytes.len() - self.pos < n {
            return Err(self.malformed("payload too short"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn flag(&mut self) -> Result<bool, ProtocolError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(self.malformed("flag is neither 0 nor 1")),
        }
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        if !bytes.is_ascii() {
            return Err(self.malformed("string is not ascii"));
        }
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    fn block_type(&mut self) -> Result<BlockType, ProtocolError> {
        let value = self.u8()?;
        BlockType::from_u8(value).ok_or_else(|| self.malformed("unknown block type"))
    }

    fn mv(&mut self) -> Result<Move, ProtocolError> {
        let value = self.u8()?;
        Move::from_u8(value).ok_or_else(|| self.malformed("unknown move"))
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        if self.pos != self.bytes.len() {
            return Err(self.malformed("trailing bytes"));
        }
        Ok(())
    }
}
