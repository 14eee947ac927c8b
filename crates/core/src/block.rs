//! Block module - tetromino squares and pivot rotation
//!
//! A block is four squares plus a pivot. Rotation turns the squares 90° about
//! the pivot square with integer arithmetic. Pieces with fewer than four
//! distinct orientations (O, I, S, Z) undo their rotation instead of going past
//! their last state, which gives the classic 1/2/4 state rotation sets without
//! any wall kicks. Whether a rotated block fits is decided by the board.

use net_tetris_types::BlockType;

/// A single cell position, row 0 is the bottom of the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    pub row: i32,
    pub column: i32,
}

impl Square {
    pub const fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }
}

/// Shape offsets as (column, row) relative to the spawn point, plus pivot index
/// and the number of extra rotation states.
fn shape(block_type: BlockType) -> ([(i32, i32); 4], usize, u8) {
    match block_type {
        BlockType::I => ([(-1, 0), (0, 0), (1, 0), (2, 0)], 1, 1),
        BlockType::J => ([(-1, 1), (-1, 0), (0, 0), (1, 0)], 2, 3),
        BlockType::L => ([(-1, 0), (0, 0), (1, 0), (1, 1)], 1, 3),
        BlockType::O => ([(0, 0), (1, 0), (0, 1), (1, 1)], 0, 0),
        BlockType::S => ([(-1, 0), (0, 0), (0, 1), (1, 1)], 1, 1),
        BlockType::T => ([(-1, 0), (0, 0), (1, 0), (0, 1)], 1, 3),
        BlockType::Z => ([(-1, 1), (0, 1), (0, 0), (1, 0)], 2, 1),
        // Sentinels have no shape; keep them as a degenerate single cell.
        BlockType::Empty | BlockType::Wall => ([(0, 0); 4], 0, 0),
    }
}

/// A tetromino with its current squares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    block_type: BlockType,
    squares: [Square; 4],
    pivot: usize,
    current_rotation: u8,
    max_rotations: u8,
}

impl Block {
    /// Create a block of `block_type` anchored at (`column`, `row`)
    pub fn new(block_type: BlockType, column: i32, row: i32) -> Self {
        let (offsets, pivot, max_rotations) = shape(block_type);
        let squares = offsets.map(|(dc, dr)| Square::new(row + dr, column + dc));
        Self {
            block_type,
            squares,
            pivot,
            current_rotation: 0,
            max_rotations,
        }
    }

    /// Create a block and rotate it left `rotation` times
    pub fn with_rotation(block_type: BlockType, column: i32, row: i32, rotation: u8) -> Self {
        let mut block = Self::new(block_type, column, row);
        for _ in 0..rotation {
            block.rotate_left();
        }
        block
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn squares(&self) -> &[Square; 4] {
        &self.squares
    }

    pub fn current_rotation(&self) -> u8 {
        self.current_rotation
    }

    pub fn max_rotations(&self) -> u8 {
        self.max_rotations
    }

    pub fn pivot(&self) -> Square {
        self.squares[self.pivot]
    }

    pub fn lowest_row(&self) -> i32 {
        self.squares.iter().map(|sq| sq.row).min().unwrap_or(0)
    }

    pub fn move_left(&mut self) {
        self.translate(-1, 0);
    }

    pub fn move_right(&mut self) {
        self.translate(1, 0);
    }

    pub fn move_up(&mut self) {
        self.translate(0, 1);
    }

    pub fn move_down(&mut self) {
        self.translate(0, -1);
    }

    fn translate(&mut self, dc: i32, dr: i32) {
        for sq in &mut self.squares {
            sq.column += dc;
            sq.row += dr;
        }
    }

    /// Rotate counter-clockwise, or undo back to state 0 past the last state
    pub fn rotate_left(&mut self) {
        if self.max_rotations == 0 {
            return;
        }
        if self.current_rotation + 1 > self.max_rotations {
            for _ in 0..self.max_rotations {
                self.turn_clockwise();
            }
            self.current_rotation = 0;
        } else {
            self.turn_counter_clockwise();
            self.current_rotation += 1;
        }
    }

    /// Rotate clockwise, or wrap to the last state from state 0
    pub fn rotate_right(&mut self) {
        if self.max_rotations == 0 {
            return;
        }
        if self.current_rotation == 0 {
            for _ in 0..self.max_rotations {
                self.turn_counter_clockwise();
            }
            self.current_rotation = self.max_rotations;
        } else {
            self.turn_clockwise();
            self.current_rotation -= 1;
        }
    }

    // (c, r) -> (pc + pr - r, pr + c - pc)
    fn turn_counter_clockwise(&mut self) {
        let p = self.squares[self.pivot];
        for sq in &mut self.squares {
            let (c, r) = (sq.column, sq.row);
            sq.column = p.column + p.row - r;
            sq.row = p.row + c - p.column;
        }
    }

    // (c, r) -> (pc - pr + r, pr - c + pc)
    fn turn_clockwise(&mut self) {
        let p = self.squares[self.pivot];
        for sq in &mut self.squares {
            let (c, r) = (sq.column, sq.row);
            sq.column = p.column - p.row + r;
            sq.row = p.row - c + p.column;
        }
    }
}
