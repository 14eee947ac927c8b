//! Move sources for local players

use std::collections::VecDeque;

use net_tetris_core::{Board, SimpleRng};
use net_tetris_types::Move;

/// Something that steers one local player
///
/// Polled once per simulation step; returning `None` declines to move. Gravity
/// is applied by the session, not by devices.
pub trait Device {
    fn poll_move(&mut self, board: &Board) -> Option<Move>;

    fn name(&self) -> &str;

    fn is_ai(&self) -> bool;
}

/// Computer player that makes a random move every few steps
#[derive(Debug, Clone)]
pub struct RandomDevice {
    name: String,
    rng: SimpleRng,
    every: u32,
    steps: u32,
}

impl RandomDevice {
    const MOVES: [Move; 5] = [
        Move::RotateLeft,
        Move::RotateRight,
        Move::Left,
        Move::Right,
        Move::Down,
    ];

    pub fn new(name: impl Into<String>, seed: u32) -> Self {
        Self {
            name: name.into(),
            rng: SimpleRng::new(seed),
            every: 8,
            steps: 0,
        }
    }

    /// Move once every `steps` polls
    pub fn with_pace(mut self, steps: u32) -> Self {
        self.every = steps.max(1);
        self
    }
}

impl Device for RandomDevice {
    fn poll_move(&mut self, _board: &Board) -> Option<Move> {
        self.steps += 1;
        if self.steps < self.every {
            return None;
        }
        self.steps = 0;
        let i = self.rng.next_range(Self::MOVES.len() as u32) as usize;
        Some(Self::MOVES[i])
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_ai(&self) -> bool {
        true
    }
}

/// Replays a fixed list of moves, one per poll, then stays idle
#[derive(Debug, Clone, Default)]
pub struct ScriptedDevice {
    name: String,
    moves: VecDeque<Move>,
}

impl ScriptedDevice {
    pub fn new(name: impl Into<String>, moves: impl IntoIterator<Item = Move>) -> Self {
        Self {
            name: name.into(),
            moves: moves.into_iter().collect(),
        }
    }

    /// A human slot that never moves on its own
    pub fn idle(name: impl Into<String>) -> Self {
        Self::new(name, [])
    }
}

impl Device for ScriptedDevice {
    fn poll_move(&mut self, _board: &Board) -> Option<Move> {
        self.moves.pop_front()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_ai(&self) -> bool {
        false
    }
}
