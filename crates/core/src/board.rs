//! Board module - one player's grid and move state machine
//!
//! The grid is a flat vector of `columns * (rows + 4)` cells in row-major order
//! (`row * columns + column`), with row 0 at the bottom. The four rows above
//! the playable area are the spawn buffer.
//!
//! `update` never fails: a move that would collide is simply rejected and the
//! board stays untouched. Every accepted change pushes one or more
//! [`GameEvent`]s onto an owned queue that the owner drains with
//! [`Board::poll_game_event`].

use std::collections::VecDeque;

use arrayvec::ArrayVec;
use log::warn;

use crate::block::Block;
use net_tetris_types::{BlockType, GameEvent, Move, SPAWN_BUFFER_ROWS};

/// Maximum number of rows a single placement can clear
pub const MAX_ROWS_PER_PLACEMENT: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    grid: Vec<BlockType>,
    columns: usize,
    rows: usize,
    current: Block,
    next: BlockType,
    game_over: bool,
    /// Garbage waiting for the next placement, whole rows, top row first
    external_rows: Vec<BlockType>,
    nbr_external_rows_added: u32,
    events: VecDeque<GameEvent>,
}

impl Board {
    /// Create an empty board with `current` spawned and `next` queued
    pub fn new(columns: usize, rows: usize, current: BlockType, next: BlockType) -> Self {
        let mut board = Self {
            grid: vec![BlockType::Empty; columns * (rows + SPAWN_BUFFER_ROWS)],
            columns,
            rows,
            current: Block::new(current, 0, 0),
            next,
            game_over: false,
            external_rows: Vec::new(),
            nbr_external_rows_added: 0,
            events: VecDeque::new(),
        };
        board.current = board.spawn_block(current);
        board
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Playable rows, excluding the spawn buffer
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn current_block(&self) -> &Block {
        &self.current
    }

    pub fn next_block_type(&self) -> BlockType {
        self.next
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Total garbage rows inserted since the last restart
    pub fn nbr_external_rows_added(&self) -> u32 {
        self.nbr_external_rows_added
    }

    /// Garbage rows enqueued but not yet inserted
    pub fn pending_external_rows(&self) -> usize {
        self.external_rows.len() / self.columns.max(1)
    }

    pub fn grid(&self) -> &[BlockType] {
        &self.grid
    }

    fn storage_rows(&self) -> usize {
        self.rows + SPAWN_BUFFER_ROWS
    }

    #[inline(always)]
    fn index(&self, row: i32, column: i32) -> Option<usize> {
        if row < 0 || column < 0 || column as usize >= self.columns {
            return None;
        }
        let row = row as usize;
        if row >= self.storage_rows() {
            return None;
        }
        Some(row * self.columns + column as usize)
    }

    /// Cell content at (`row`, `column`)
    ///
    /// Returns `Wall` left, right or below the grid and `Empty` above it.
    pub fn block_type(&self, row: i32, column: i32) -> BlockType {
        if row < 0 || column < 0 || column as usize >= self.columns {
            return BlockType::Wall;
        }
        match self.index(row, column) {
            Some(idx) => self.grid[idx],
            None => BlockType::Empty,
        }
    }

    /// Overwrite a single cell
    /// Returns false if out of bounds or if `block_type` is `Wall`
    pub fn set_block_type(&mut self, row: i32, column: i32, block_type: BlockType) -> bool {
        if block_type == BlockType::Wall {
            return false;
        }
        match self.index(row, column) {
            Some(idx) => {
                self.grid[idx] = block_type;
                true
            }
            None => false,
        }
    }

    /// True if any square is outside the walls, below the floor, or on a filled cell
    pub fn collision(&self, block: &Block) -> bool {
        block
            .squares()
            .iter()
            .any(|sq| self.block_type(sq.row, sq.column) != BlockType::Empty)
    }

    /// Take the oldest pending event
    pub fn poll_game_event(&mut self) -> Option<GameEvent> {
        self.events.pop_front()
    }

    fn trigger(&mut self, event: GameEvent) {
        self.events.push_back(event);
    }

    fn spawn_block(&self, block_type: BlockType) -> Block {
        let column = (self.columns / 2) as i32 - 1;
        let row = self.rows as i32 - SPAWN_BUFFER_ROWS as i32;
        Block::new(block_type, column, row)
    }

    /// Replace the queued next block type
    pub fn set_next_block_type(&mut self, next: BlockType) {
        self.next = next;
        self.trigger(GameEvent::NextBlockUpdated);
    }

    /// Enqueue garbage rows; they are inserted at the bottom on the next placement
    ///
    /// `rows` holds whole rows, top row first. A trailing partial row is dropped.
    pub fn add_rows(&mut self, rows: &[BlockType]) {
        if self.columns == 0 {
            return;
        }
        let whole = rows.len() - rows.len() % self.columns;
        if whole != rows.len() {
            warn!(
                "dropping {} trailing cells of a garbage row (columns = {})",
                rows.len() - whole,
                self.columns
            );
        }
        self.external_rows.extend(rows[..whole].iter().map(|&b| match b {
            BlockType::Wall => BlockType::Empty,
            other => other,
        }));
    }

    /// Clear the grid and start over with the given blocks
    pub fn restart(&mut self, current: BlockType, next: BlockType) {
        self.grid.fill(BlockType::Empty);
        self.game_over = false;
        self.external_rows.clear();
        self.nbr_external_rows_added = 0;
        self.events.clear();
        self.current = self.spawn_block(current);
        self.next = next;
        self.trigger(GameEvent::Restarted);
    }

    /// Apply one move to the current block
    pub fn update(&mut self, mv: Move) {
        if self.game_over {
            return;
        }

        // A freshly spawned block that already overlaps ends the game one update late.
        if self.collision(&self.current) {
            self.end_game();
            return;
        }

        let mut block = self.current;
        let event = match mv {
            Move::GameOver => {
                self.end_game();
                return;
            }
            Move::RotateLeft => {
                block.rotate_left();
                GameEvent::PlayerRotatesBlock
            }
            Move::RotateRight => {
                block.rotate_right();
                GameEvent::PlayerRotatesBlock
            }
            Move::Left => {
                block.move_left();
                GameEvent::PlayerMovesBlockLeft
            }
            Move::Right => {
                block.move_right();
                GameEvent::PlayerMovesBlockRight
            }
            Move::Down => {
                block.move_down();
                GameEvent::PlayerMovesBlockDown
            }
            Move::DownGravity => {
                block.move_down();
                GameEvent::GravityMovesBlock
            }
        };

        if !self.collision(&block) {
            self.current = block;
            self.trigger(event);
        } else if mv == Move::DownGravity {
            self.place_current();
        }
    }

    fn end_game(&mut self) {
        self.game_over = true;
        self.trigger(GameEvent::GameOver);
    }

    fn place_current(&mut self) {
        self.trigger(GameEvent::BlockCollision);

        let current = self.current;
        for sq in current.squares() {
            if let Some(idx) = self.index(sq.row, sq.column) {
                self.grid[idx] = current.block_type();
            }
        }

        let removed = self.remove_filled_rows(current.lowest_row());
        if let Some(event) = GameEvent::rows_removed(removed.len() as u32) {
            self.trigger(event);
        }

        // Garbage goes in after our own clears so a clear cannot cancel it.
        self.insert_external_rows();

        self.current = self.spawn_block(self.next);
        self.trigger(GameEvent::CurrentBlockUpdated);
    }

    /// Remove filled rows among the four rows starting at `lowest_row`
    ///
    /// Each removal shifts everything above down by exactly one row and adds an
    /// empty row at the top of the storage. Returns the removed row indices as
    /// seen at the moment of removal.
    pub fn remove_filled_rows(&mut self, lowest_row: i32) -> ArrayVec<i32, MAX_ROWS_PER_PLACEMENT> {
        let mut removed = ArrayVec::new();
        let mut row = lowest_row.max(0);

        for _ in 0..MAX_ROWS_PER_PLACEMENT {
            if row as usize >= self.storage_rows() {
                break;
            }
            if self.is_row_filled(row) {
                self.trigger(GameEvent::RowToBeRemoved);
                self.erase_row(row);
                removed.push(row);
            } else {
                row += 1;
            }
        }

        removed
    }

    pub fn is_row_filled(&self, row: i32) -> bool {
        let Some(start) = self.index(row, 0) else {
            return false;
        };
        self.grid[start..start + self.columns]
            .iter()
            .all(|&b| b != BlockType::Empty)
    }

    fn erase_row(&mut self, row: i32) {
        let start = row as usize * self.columns;
        self.grid.drain(start..start + self.columns);
        self.grid
            .extend(std::iter::repeat(BlockType::Empty).take(self.columns));
    }

    fn insert_external_rows(&mut self) {
        if self.external_rows.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.external_rows);
        let count = pending.len() / self.columns;
        let kept = self.grid.len().saturating_sub(pending.len());

        let mut grid = Vec::with_capacity(self.grid.len());
        for row in pending.chunks(self.columns).rev() {
            grid.extend_from_slice(row);
        }
        grid.extend_from_slice(&self.grid[..kept]);
        grid.truncate(self.grid.len());
        self.grid = grid;

        self.nbr_external_rows_added += count as u32;
        self.trigger(GameEvent::ExternalRowsAdded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_tetris_types::{DEFAULT_COLUMNS, DEFAULT_ROWS};

    fn drain(board: &mut Board) -> Vec<GameEvent> {
        std::iter::from_fn(|| board.poll_game_event()).collect()
    }

    fn fill_row_except(board: &mut Board, row: i32, hole: i32) {
        for column in 0..board.columns() as i32 {
            if column != hole {
                board.set_block_type(row, column, BlockType::L);
            }
        }
    }

    fn drop_to_bottom(board: &mut Board) -> Vec<GameEvent> {
        let mut events = Vec::new();
        loop {
            board.update(Move::DownGravity);
            let step = drain(board);
            let placed = step.contains(&GameEvent::BlockCollision);
            events.extend(step);
            if placed || board.is_game_over() {
                return events;
            }
        }
    }

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new(DEFAULT_COLUMNS, DEFAULT_ROWS, BlockType::T, BlockType::I);
        assert_eq!(board.grid().len(), DEFAULT_COLUMNS * (DEFAULT_ROWS + 4));
        assert!(board.grid().iter().all(|&b| b == BlockType::Empty));
        assert_eq!(board.current_block().block_type(), BlockType::T);
        assert_eq!(board.next_block_type(), BlockType::I);
        assert!(!board.is_game_over());
    }

    #[test]
    fn test_spawn_position() {
        let board = Board::new(10, 20, BlockType::O, BlockType::I);
        let first = board.current_block().squares()[0];
        assert_eq!(first.column, 4);
        assert_eq!(first.row, 16);
    }

    #[test]
    fn test_block_type_outside_grid() {
        let board = Board::new(10, 20, BlockType::O, BlockType::I);
        assert_eq!(board.block_type(-1, 0), BlockType::Wall);
        assert_eq!(board.block_type(0, -1), BlockType::Wall);
        assert_eq!(board.block_type(0, 10), BlockType::Wall);
        assert_eq!(board.block_type(500, 3), BlockType::Empty);
    }

    #[test]
    fn test_set_block_type_rejects_wall() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        assert!(!board.set_block_type(0, 0, BlockType::Wall));
        assert!(!board.set_block_type(-1, 0, BlockType::I));
        assert!(board.set_block_type(0, 0, BlockType::I));
        assert_eq!(board.block_type(0, 0), BlockType::I);
    }

    #[test]
    fn test_collision_with_walls_ignores_grid() {
        let board = Board::new(10, 20, BlockType::O, BlockType::I);
        let mut block = Block::new(BlockType::I, 0, 5);
        assert!(board.collision(&block), "square at column -1");
        block.move_right();
        assert!(!board.collision(&block));

        let right = Block::new(BlockType::I, 8, 5);
        assert!(board.collision(&right), "square at column 10");

        let floor = Block::new(BlockType::O, 4, -1);
        assert!(board.collision(&floor), "square at row -1");
    }

    #[test]
    fn test_collision_with_filled_cell() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        let block = Block::new(BlockType::O, 4, 0);
        assert!(!board.collision(&block));
        board.set_block_type(1, 5, BlockType::Z);
        assert!(board.collision(&block));
    }

    #[test]
    fn test_rejected_move_leaves_board_untouched() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        for _ in 0..10 {
            board.update(Move::Left);
        }
        drain(&mut board);
        let before = board.clone();
        board.update(Move::Left);
        assert_eq!(board, before);
        assert!(drain(&mut board).is_empty());
    }

    #[test]
    fn test_accepted_moves_emit_events() {
        let mut board = Board::new(10, 20, BlockType::T, BlockType::I);
        board.update(Move::Left);
        board.update(Move::Right);
        board.update(Move::RotateLeft);
        board.update(Move::Down);
        board.update(Move::DownGravity);
        assert_eq!(
            drain(&mut board),
            vec![
                GameEvent::PlayerMovesBlockLeft,
                GameEvent::PlayerMovesBlockRight,
                GameEvent::PlayerRotatesBlock,
                GameEvent::PlayerMovesBlockDown,
                GameEvent::GravityMovesBlock,
            ]
        );
    }

    #[test]
    fn test_down_collision_is_rejected_not_placed() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        for _ in 0..30 {
            board.update(Move::Down);
        }
        drain(&mut board);
        assert_eq!(board.current_block().lowest_row(), 0);
        assert!(board.grid().iter().all(|&b| b == BlockType::Empty));
    }

    #[test]
    fn test_gravity_collision_places_and_spawns_next() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        let events = drop_to_bottom(&mut board);
        let tail = &events[events.len() - 2..];
        assert_eq!(tail, &[GameEvent::BlockCollision, GameEvent::CurrentBlockUpdated]);
        assert_eq!(board.block_type(0, 4), BlockType::O);
        assert_eq!(board.block_type(1, 5), BlockType::O);
        assert_eq!(board.current_block().block_type(), BlockType::I);
    }

    #[test]
    fn test_single_row_clear_event_order() {
        let mut board = Board::new(10, 20, BlockType::I, BlockType::T);
        // Bottom row filled except columns 3..=6 where the I lands.
        for column in [0, 1, 2, 7, 8, 9] {
            board.set_block_type(0, column, BlockType::S);
        }
        board.set_block_type(1, 0, BlockType::S);

        let events = drop_to_bottom(&mut board);
        let tail = &events[events.len() - 4..];
        assert_eq!(
            tail,
            &[
                GameEvent::BlockCollision,
                GameEvent::RowToBeRemoved,
                GameEvent::OneRowRemoved,
                GameEvent::CurrentBlockUpdated,
            ]
        );
        // Row 1 shifted down into row 0.
        assert_eq!(board.block_type(0, 0), BlockType::S);
        assert_eq!(board.block_type(0, 1), BlockType::Empty);
    }

    #[test]
    fn test_four_row_clear_with_vertical_i() {
        let mut board = Board::new(10, 20, BlockType::I, BlockType::O);
        for row in 0..4 {
            fill_row_except(&mut board, row, 9);
        }
        board.set_block_type(4, 2, BlockType::J);

        board.update(Move::RotateLeft);
        for _ in 0..10 {
            board.update(Move::Right);
        }
        drain(&mut board);
        assert!(board.current_block().squares().iter().all(|sq| sq.column == 9));

        let events = drop_to_bottom(&mut board);
        let removals = events.iter().filter(|&&e| e == GameEvent::RowToBeRemoved).count();
        assert_eq!(removals, 4);
        assert!(events.contains(&GameEvent::FourRowRemoved));
        assert_eq!(board.block_type(0, 2), BlockType::J);
        assert_eq!(board.grid().len(), 10 * 24);
    }

    #[test]
    fn test_remove_filled_rows_shifts_by_removed_count_below() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        // Rows 0 and 2 full, row 1 and 3 marked.
        fill_row_except(&mut board, 0, -1);
        board.set_block_type(1, 4, BlockType::T);
        fill_row_except(&mut board, 2, -1);
        board.set_block_type(3, 7, BlockType::Z);

        let removed = board.remove_filled_rows(0);
        assert_eq!(removed.as_slice(), &[0, 1]);
        // Row 1 lost one row below it, row 3 lost two.
        assert_eq!(board.block_type(0, 4), BlockType::T);
        assert_eq!(board.block_type(1, 7), BlockType::Z);
        assert_eq!(board.block_type(2, 7), BlockType::Empty);
        assert_eq!(board.grid().len(), 10 * 24);
        let top = (23 * 10)..(24 * 10);
        assert!(board.grid()[top].iter().all(|&b| b == BlockType::Empty));
    }

    #[test]
    fn test_remove_filled_rows_scans_at_most_four_rows() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        for row in 0..6 {
            fill_row_except(&mut board, row, -1);
        }
        let removed = board.remove_filled_rows(0);
        assert_eq!(removed.len(), 4);
        assert!(board.is_row_filled(0));
        assert!(board.is_row_filled(1));
        assert!(!board.is_row_filled(2));
    }

    #[test]
    fn test_external_rows_wait_for_next_placement() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        let mut garbage = vec![BlockType::Z; 20];
        garbage[3] = BlockType::Empty;
        garbage[15] = BlockType::Empty;
        board.add_rows(&garbage);

        assert_eq!(board.pending_external_rows(), 2);
        assert_eq!(board.block_type(0, 0), BlockType::Empty);
        board.update(Move::DownGravity);
        board.update(Move::Left);
        assert_eq!(board.block_type(0, 0), BlockType::Empty);
        assert_eq!(board.nbr_external_rows_added(), 0);

        let events = drop_to_bottom(&mut board);
        assert!(events.contains(&GameEvent::ExternalRowsAdded));
        assert_eq!(board.nbr_external_rows_added(), 2);
        // Top garbage row lands in row 1, bottom one in row 0.
        assert_eq!(board.block_type(1, 3), BlockType::Empty);
        assert_eq!(board.block_type(0, 5), BlockType::Empty);
        assert_eq!(board.block_type(0, 3), BlockType::Z);
        // The placed O was lifted by two rows.
        assert_eq!(board.block_type(2, 3), BlockType::O);
    }

    #[test]
    fn test_self_clear_does_not_cancel_garbage() {
        let mut board = Board::new(10, 20, BlockType::I, BlockType::O);
        for column in [0, 1, 2, 7, 8, 9] {
            board.set_block_type(0, column, BlockType::S);
        }
        board.add_rows(&[BlockType::J; 10]);

        let events = drop_to_bottom(&mut board);
        let clear = events.iter().position(|&e| e == GameEvent::OneRowRemoved).unwrap();
        let garbage = events.iter().position(|&e| e == GameEvent::ExternalRowsAdded).unwrap();
        assert!(clear < garbage);
        assert!(board.is_row_filled(0));
        assert_eq!(board.nbr_external_rows_added(), 1);
    }

    #[test]
    fn test_partial_garbage_row_is_dropped() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
        board.add_rows(&[BlockType::T; 15]);
        assert_eq!(board.pending_external_rows(), 1);
    }

    #[test]
    fn test_game_over_is_detected_on_next_update_and_idempotent() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::O);
        // Block the spawn area.
        board.set_block_type(16, 4, BlockType::T);
        assert!(!board.is_game_over());

        board.update(Move::DownGravity);
        assert!(board.is_game_over());
        assert_eq!(drain(&mut board), vec![GameEvent::GameOver]);

        for mv in [Move::DownGravity, Move::Left, Move::GameOver] {
            board.update(mv);
        }
        assert!(drain(&mut board).is_empty());
    }

    #[test]
    fn test_spawn_collision_has_one_update_latency() {
        let mut board = Board::new(10, 20, BlockType::O, BlockType::O);
        // Stack under the spawn point so the next O spawns into a filled cell.
        for row in 0..16 {
            board.set_block_type(row, 4, BlockType::L);
        }
        let events = drop_to_bottom(&mut board);
        assert_eq!(events.last(), Some(&GameEvent::CurrentBlockUpdated));
        assert!(!board.is_game_over());

        board.update(Move::Left);
        assert!(board.is_game_over());
        assert_eq!(drain(&mut board), vec![GameEvent::GameOver]);
    }

    #[test]
    fn test_forced_game_over() {
        let mut board = Board::new(10, 20, BlockType::T, BlockType::I);
        board.update(Move::GameOver);
        assert!(board.is_game_over());
        assert_eq!(drain(&mut board), vec![GameEvent::GameOver]);
    }

    #[test]
    fn test_restart_resets_everything() {
        let mut board = Board::new(10, 20, BlockType::T, BlockType::I);
        board.set_block_type(0, 0, BlockType::S);
        board.add_rows(&[BlockType::S; 10]);
        board.update(Move::GameOver);

        board.restart(BlockType::J, BlockType::L);
        assert!(!board.is_game_over());
        assert!(board.grid().iter().all(|&b| b == BlockType::Empty));
        assert_eq!(board.pending_external_rows(), 0);
        assert_eq!(board.current_block().block_type(), BlockType::J);
        assert_eq!(board.next_block_type(), BlockType::L);
        assert_eq!(drain(&mut board), vec![GameEvent::Restarted]);
    }

    #[test]
    fn test_set_next_block_type() {
        let mut board = Board::new(10, 20, BlockType::T, BlockType::I);
        board.set_next_block_type(BlockType::Z);
        assert_eq!(board.next_block_type(), BlockType::Z);
        assert_eq!(drain(&mut board), vec![GameEvent::NextBlockUpdated]);
    }
}
