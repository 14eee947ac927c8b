//! RNG module - seeded block generation
//!
//! Block types and garbage rows are only ever rolled by the side that owns a
//! player; every other machine receives the rolled values over the wire. The
//! generator is therefore an explicit value owned by the session instead of a
//! process-wide engine, and it is fully deterministic for a given seed.

use net_tetris_types::BlockType;

/// Simple LCG (Linear Congruential Generator) RNG
/// Uses constants from Numerical Recipes
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u32,
}

impl SimpleRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Generate random value in range [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        // High bits of an LCG are far better distributed than the low ones.
        (self.next_u32() >> 16) % max.max(1)
    }

    /// Shuffle a slice using Fisher-Yates
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_range((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }
}

/// 7-bag block generator
///
/// Every run of seven draws contains each tetromino exactly once.
#[derive(Debug, Clone)]
pub struct BlockBag {
    bag: [BlockType; 7],
    bag_index: usize,
    rng: SimpleRng,
}

impl BlockBag {
    pub fn new(seed: u32) -> Self {
        let mut bag = Self {
            bag: BlockType::PIECES,
            bag_index: 0,
            rng: SimpleRng::new(seed),
        };
        bag.refill();
        bag
    }

    fn refill(&mut self) {
        self.bag = BlockType::PIECES;
        self.rng.shuffle(&mut self.bag);
        self.bag_index = 0;
    }

    /// Draw the next block type
    pub fn draw(&mut self) -> BlockType {
        if self.bag_index >= self.bag.len() {
            self.refill();
        }
        let block = self.bag[self.bag_index];
        self.bag_index += 1;
        block
    }

    /// Build `count` garbage rows of `columns` cells, top row first
    ///
    /// Each row is filled with random pieces except for one empty hole.
    pub fn garbage_rows(&mut self, count: u32, columns: usize) -> Vec<BlockType> {
        let mut rows = Vec::with_capacity(count as usize * columns);
        for _ in 0..count {
            let hole = self.rng.next_range(columns as u32) as usize;
            for column in 0..columns {
                if column == hole {
                    rows.push(BlockType::Empty);
                } else {
                    let kind = self.rng.next_range(BlockType::PIECES.len() as u32) as usize;
                    rows.push(BlockType::PIECES[kind]);
                }
            }
        }
        rows
    }

    #[cfg(test)]
    pub fn remaining(&self) -> &[BlockType] {
        &self.bag[self.bag_index..]
    }
}

impl Default for BlockBag {
    fn default() -> Self {
        Self::new(1)
    }
}
