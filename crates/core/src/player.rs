//! Player module - a board plus identity and score

use crate::board::Board;
use net_tetris_types::{PlayerId, GRAVITY_INTERVALS_MS, GRAVITY_INTERVAL_MIN_MS};

/// Gravity interval for a level (1-based)
pub fn gravity_interval_ms(level: u32) -> u32 {
    let level = level.max(1) as usize;
    if level <= GRAVITY_INTERVALS_MS.len() {
        return GRAVITY_INTERVALS_MS[level - 1];
    }
    let past_table = (level - GRAVITY_INTERVALS_MS.len()) as u32;
    let last = GRAVITY_INTERVALS_MS[GRAVITY_INTERVALS_MS.len() - 1];
    last.saturating_sub(past_table * 5).max(GRAVITY_INTERVAL_MIN_MS)
}

/// One participant in a round
///
/// The id is assigned once by the session and never reused while the owning
/// connection is alive.
#[derive(Debug, Clone)]
pub struct Player {
    pub(crate) id: PlayerId,
    pub(crate) name: String,
    pub(crate) ai: bool,
    pub(crate) level: u32,
    pub(crate) points: u32,
    pub(crate) cleared_rows: u32,
    pub(crate) level_up_counter: u32,
    /// Finish rank, 0 while still playing
    pub(crate) last_position: u32,
    pub(crate) board: Board,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, ai: bool, board: Board) -> Self {
        Self {
            id,
            name: name.into(),
            ai,
            level: 1,
            points: 0,
            cleared_rows: 0,
            level_up_counter: 0,
            last_position: 0,
            board,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn set_id(&mut self, id: PlayerId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_ai(&self) -> bool {
        self.ai
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = level.max(1);
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn set_points(&mut self, points: u32) {
        self.points = points;
    }

    pub fn cleared_rows(&self) -> u32 {
        self.cleared_rows
    }

    pub fn level_up_counter(&self) -> u32 {
        self.level_up_counter
    }

    pub fn last_position(&self) -> u32 {
        self.last_position
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn is_game_over(&self) -> bool {
        self.board.is_game_over()
    }

    /// Reset score keeping for a new round
    pub fn reset_stats(&mut self) {
        self.level = 1;
        self.points = 0;
        self.cleared_rows = 0;
        self.level_up_counter = 0;
        self.last_position = 0;
    }
}
