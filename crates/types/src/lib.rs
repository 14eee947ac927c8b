//! Core types module - shared data structures and constants
//!
//! This crate defines the fundamental value types used by the board simulation
//! and by the multiplayer protocol. Every enum that travels over the wire is
//! encoded as a single byte holding its declaration ordinal, so the order of
//! the variants below is part of the wire format and must never change.
//!
//! # Board Dimensions
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `DEFAULT_COLUMNS` | 10 | Playfield width |
//! | `DEFAULT_ROWS` | 24 | Playable rows |
//! | `SPAWN_BUFFER_ROWS` | 4 | Hidden rows stored above the playfield |
//! | `MIN_COLUMNS`..`MAX_COLUMNS` | 4..127 | Accepted board widths |
//!
//! Row 0 is the bottom of the board; rows grow upwards.
//!
//! # Timing Constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `FIXED_STEP_MS` | 16 | Simulation step (~60 FPS) |
//! | `MAX_FRAME_MS` | 250 | Clamp for a stalled frame |
//!
//! # Examples
//!
//! ```
//! use net_tetris_types::{BlockType, Move, PacketType};
//!
//! assert_eq!(BlockType::from_u8(6), Some(BlockType::Z));
//! assert_eq!(Move::RotateLeft.as_u8(), 0);
//! assert_eq!(PacketType::from_u8(4), Some(PacketType::Input));
//! assert!(BlockType::T.is_piece());
//! assert!(!BlockType::Empty.is_piece());
//! ```

/// Board width in cells for a default game
pub const DEFAULT_COLUMNS: usize = 10;

/// Playable board height for a default game
pub const DEFAULT_ROWS: usize = 24;

/// Narrowest board a block can spawn on
pub const MIN_COLUMNS: usize = 4;

/// Widest board whose four row garbage still fits one TETRIS count byte
pub const MAX_COLUMNS: usize = u8::MAX as usize / GARBAGE_ROWS_PER_TETRIS as usize;

/// Tallest board the roster's row byte can describe
pub const MAX_ROWS: usize = u8::MAX as usize;

/// Rows stored above the playable area where new blocks spawn
pub const SPAWN_BUFFER_ROWS: usize = 4;

/// Level cap for a default game
pub const DEFAULT_MAX_LEVEL: u32 = 40;

/// Cleared rows needed to advance one level
pub const ROWS_PER_LEVEL: u32 = 10;

/// Garbage rows sent to every opponent on a four row clear
pub const GARBAGE_ROWS_PER_TETRIS: u32 = 2;

/// Fixed simulation step in milliseconds
pub const FIXED_STEP_MS: u32 = 16;

/// Accumulated frame time is clamped to this value
pub const MAX_FRAME_MS: u32 = 250;

/// Gravity intervals by level (milliseconds per row)
///
/// Index 0 = Level 1. Levels past the table keep shrinking down to
/// `GRAVITY_INTERVAL_MIN_MS`.
pub const GRAVITY_INTERVALS_MS: [u32; 9] = [1000, 800, 650, 500, 400, 320, 250, 200, 160];

/// Absolute minimum gravity interval
pub const GRAVITY_INTERVAL_MIN_MS: u32 = 50;

/// Identifier of a player, unique within one session
pub type PlayerId = u8;

/// Identifier of a connection (one participating machine)
pub type ConnectionId = u8;

/// Connection id of the authoritative side. A local game is its own server.
pub const SERVER_ID: ConnectionId = 0;

/// The content of a board cell, also used to name tetromino kinds
///
/// `Wall` is returned for queries outside the grid and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    I,
    J,
    L,
    O,
    S,
    T,
    Z,
    Empty,
    Wall,
}

impl BlockType {
    /// The seven playable tetromino kinds
    pub const PIECES: [BlockType; 7] = [
        BlockType::I,
        BlockType::J,
        BlockType::L,
        BlockType::O,
        BlockType::S,
        BlockType::T,
        BlockType::Z,
    ];

    /// Decode a wire ordinal
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BlockType::I),
            1 => Some(BlockType::J),
            2 => Some(BlockType::L),
            3 => Some(BlockType::O),
            4 => Some(BlockType::S),
            5 => Some(BlockType::T),
            6 => Some(BlockType::Z),
            7 => Some(BlockType::Empty),
            8 => Some(BlockType::Wall),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// True for the seven tetromino kinds
    pub fn is_piece(&self) -> bool {
        !matches!(self, BlockType::Empty | BlockType::Wall)
    }

    /// Parse a block type from string (case-insensitive)
    ///
    /// ```
    /// use net_tetris_types::BlockType;
    ///
    /// assert_eq!(BlockType::from_str("i"), Some(BlockType::I));
    /// assert_eq!(BlockType::from_str("Empty"), Some(BlockType::Empty));
    /// assert_eq!(BlockType::from_str("x"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i" => Some(BlockType::I),
            "j" => Some(BlockType::J),
            "l" => Some(BlockType::L),
            "o" => Some(BlockType::O),
            "s" => Some(BlockType::S),
            "t" => Some(BlockType::T),
            "z" => Some(BlockType::Z),
            "empty" => Some(BlockType::Empty),
            "wall" => Some(BlockType::Wall),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::I => "i",
            BlockType::J => "j",
            BlockType::L => "l",
            BlockType::O => "o",
            BlockType::S => "s",
            BlockType::T => "t",
            BlockType::Z => "z",
            BlockType::Empty => "empty",
            BlockType::Wall => "wall",
        }
    }
}

/// A move requested by a device or received from the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    RotateLeft,
    RotateRight,
    Left,
    Right,
    /// Player soft drop; rejected on collision like any other move
    Down,
    /// Gravity tick; a collision places the block
    DownGravity,
    /// Forces the board into the game over state
    GameOver,
}

impl Move {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Move::RotateLeft),
            1 => Some(Move::RotateRight),
            2 => Some(Move::Left),
            3 => Some(Move::Right),
            4 => Some(Move::Down),
            5 => Some(Move::DownGravity),
            6 => Some(Move::GameOver),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Move::RotateLeft => "rotateLeft",
            Move::RotateRight => "rotateRight",
            Move::Left => "left",
            Move::Right => "right",
            Move::Down => "down",
            Move::DownGravity => "downGravity",
            Move::GameOver => "gameOver",
        }
    }
}

/// Result of a board update, queued on the board and drained by the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameEvent {
    CurrentBlockUpdated,
    NextBlockUpdated,
    ExternalRowsAdded,
    PlayerRotatesBlock,
    PlayerMovesBlockLeft,
    PlayerMovesBlockRight,
    PlayerMovesBlockDown,
    GravityMovesBlock,
    BlockCollision,
    RowToBeRemoved,
    OneRowRemoved,
    TwoRowRemoved,
    ThreeRowRemoved,
    FourRowRemoved,
    Restarted,
    GameOver,
}

impl GameEvent {
    /// The summary event for a placement that removed `rows` rows
    ///
    /// ```
    /// use net_tetris_types::GameEvent;
    ///
    /// assert_eq!(GameEvent::rows_removed(4), Some(GameEvent::FourRowRemoved));
    /// assert_eq!(GameEvent::rows_removed(0), None);
    /// ```
    pub fn rows_removed(rows: u32) -> Option<Self> {
        match rows {
            1 => Some(GameEvent::OneRowRemoved),
            2 => Some(GameEvent::TwoRowRemoved),
            3 => Some(GameEvent::ThreeRowRemoved),
            4 => Some(GameEvent::FourRowRemoved),
            _ => None,
        }
    }

    /// Number of rows removed if this is a row removal summary, else 0
    pub fn removed_rows(&self) -> u32 {
        match self {
            GameEvent::OneRowRemoved => 1,
            GameEvent::TwoRowRemoved => 2,
            GameEvent::ThreeRowRemoved => 3,
            GameEvent::FourRowRemoved => 4,
            _ => 0,
        }
    }
}

/// Leading type byte of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    ClientInfo,
    ServerInfo,
    StartGame,
    StartBlock,
    Input,
    Tetris,
    Ready,
    PlayerLevel,
    PlayerName,
    Pause,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketType::ClientInfo),
            1 => Some(PacketType::ServerInfo),
            2 => Some(PacketType::StartGame),
            3 => Some(PacketType::StartBlock),
            4 => Some(PacketType::Input),
            5 => Some(PacketType::Tetris),
            6 => Some(PacketType::Ready),
            7 => Some(PacketType::PlayerLevel),
            8 => Some(PacketType::PlayerName),
            9 => Some(PacketType::Pause),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ordinals_are_stable() {
        assert_eq!(BlockType::I.as_u8(), 0);
        assert_eq!(BlockType::Z.as_u8(), 6);
        assert_eq!(BlockType::Empty.as_u8(), 7);
        assert_eq!(BlockType::Wall.as_u8(), 8);
        assert_eq!(Move::GameOver.as_u8(), 6);
        assert_eq!(PacketType::Pause.as_u8(), 9);
    }

    #[test]
    fn ordinals_decode_back() {
        for value in 0..=8u8 {
            assert_eq!(BlockType::from_u8(value).map(|b| b.as_u8()), Some(value));
        }
        for value in 0..=6u8 {
            assert_eq!(Move::from_u8(value).map(|m| m.as_u8()), Some(value));
        }
        assert_eq!(BlockType::from_u8(9), None);
        assert_eq!(Move::from_u8(7), None);
        assert_eq!(PacketType::from_u8(10), None);
    }

    #[test]
    fn removed_rows_matches_summary_events() {
        for rows in 1..=4 {
            let event = GameEvent::rows_removed(rows).unwrap();
            assert_eq!(event.removed_rows(), rows);
        }
        assert_eq!(GameEvent::BlockCollision.removed_rows(), 0);
    }

    #[test]
    fn pieces_exclude_sentinels() {
        assert_eq!(BlockType::PIECES.len(), 7);
        assert!(BlockType::PIECES.iter().all(|b| b.is_piece()));
        assert!(!BlockType::Wall.is_piece());
    }
}
