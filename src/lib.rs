//! Net Tetris (workspace facade crate).
//!
//! Re-exports the board simulation, the multiplayer layer and the shared
//! vocabulary types from the crates under `crates/`.

pub use net_tetris_core as core;
pub use net_tetris_net as net;
pub use net_tetris_types as types;
