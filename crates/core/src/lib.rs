//! Core game logic module - pure, deterministic, and testable
//!
//! This crate contains the board simulation and the cross-player rules. It has
//! **no dependencies** on networking, timing or I/O, so the same code drives
//! the local player, the server's authoritative copy and every mirrored
//! remote board.
//!
//! # Module Structure
//!
//! - [`block`]: tetromino squares and pivot rotation
//! - [`board`]: per-player grid, moves, row removal and garbage insertion
//! - [`player`]: a board plus identity, level and score
//! - [`rng`]: seeded 7-bag block generator and garbage rows
//! - [`rules`]: scoring, level progression, garbage and elimination
//!
//! # Game Rules
//!
//! - **Rotation**: integer rotation about a pivot square, no wall kicks
//! - **Gravity**: a `DownGravity` move that collides places the block
//! - **Row removal**: up to four rows per placement, scanned from the lowest
//!   row of the placed block
//! - **Garbage**: a four row clear sends two rows to every opponent, inserted
//!   at the bottom after the receiver's next placement
//! - **Game over**: a spawned block that overlaps is detected on the next update
//!
//! # Example
//!
//! ```
//! use net_tetris_core::Board;
//! use net_tetris_types::{BlockType, GameEvent, Move};
//!
//! let mut board = Board::new(10, 20, BlockType::O, BlockType::I);
//! board.update(Move::Left);
//! assert_eq!(board.poll_game_event(), Some(GameEvent::PlayerMovesBlockLeft));
//! assert_eq!(board.poll_game_event(), None);
//! ```

pub mod block;
pub mod board;
pub mod player;
pub mod rng;
pub mod rules;

pub use net_tetris_types as types;

// Re-export commonly used types for convenience
pub use block::{Block, Square};
pub use board::Board;
pub use player::{gravity_interval_ms, Player};
pub use rng::{BlockBag, SimpleRng};
pub use rules::{PlayerInteraction, Rules};
