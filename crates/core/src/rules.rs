//! Rules module - cross-player scoring, levels, garbage and elimination
//!
//! Rules turn one player's [`GameEvent`] into updates of every player's score
//! keeping. Score fields are written directly on the roster; anything that has
//! to reach another board or leave the simulation goes through the narrow
//! [`PlayerInteraction`] capability so the caller decides how to carry it out
//! (locally, over the network, or not at all for mirrored players).

use log::debug;

use crate::player::Player;
use net_tetris_types::{
    GameEvent, PlayerId, DEFAULT_COLUMNS, DEFAULT_MAX_LEVEL, DEFAULT_ROWS,
    GARBAGE_ROWS_PER_TETRIS, ROWS_PER_LEVEL,
};

/// Side effects the rules may request
pub trait PlayerInteraction {
    /// Send `rows` garbage rows to `player_id`
    fn add_rows(&mut self, player_id: PlayerId, rows: u32);

    /// End the round for `player_id`
    fn force_game_over(&mut self, player_id: PlayerId);

    /// A default single-player game ended with `points`; check the high score list
    fn game_is_over(&mut self, points: u32);

    /// `player_id` reached a new level
    fn set_level(&mut self, player_id: PlayerId, level: u32);
}

#[derive(Debug, Clone)]
pub struct Rules {
    max_level: u32,
    nbr_players: u32,
    alive_players: u32,
}

impl Rules {
    pub fn new(max_level: u32) -> Self {
        Self {
            max_level: max_level.max(1),
            nbr_players: 0,
            alive_players: 0,
        }
    }

    /// Start a round with `nbr_players` alive
    pub fn reset(&mut self, nbr_players: u32) {
        self.nbr_players = nbr_players;
        self.alive_players = nbr_players;
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    pub fn nbr_players(&self) -> u32 {
        self.nbr_players
    }

    pub fn alive_players(&self) -> u32 {
        self.alive_players
    }

    fn is_multiplayer(&self) -> bool {
        self.nbr_players > 1
    }

    fn level_for(&self, counter: u32) -> u32 {
        (counter / ROWS_PER_LEVEL + 1).min(self.max_level)
    }

    /// Apply `event` emitted by `players[index]`
    pub fn apply(
        &mut self,
        players: &mut [&mut Player],
        index: usize,
        event: GameEvent,
        interaction: &mut impl PlayerInteraction,
    ) {
        if index >= players.len() {
            return;
        }

        let rows = event.removed_rows();
        if rows > 0 {
            self.apply_row_clear(players, index, rows, interaction);
        } else if event == GameEvent::GameOver {
            self.apply_game_over(players, index, interaction);
        }
    }

    fn apply_row_clear(
        &mut self,
        players: &mut [&mut Player],
        index: usize,
        rows: u32,
        interaction: &mut impl PlayerInteraction,
    ) {
        let source = &mut players[index];
        source.points += source.level * rows * rows;
        source.cleared_rows += rows;
        let source_id = source.id;

        if !self.is_multiplayer() {
            source.level_up_counter += rows;
            let level = self.level_for(source.level_up_counter);
            if level != source.level {
                source.level = level;
                interaction.set_level(source_id, level);
            }
            return;
        }

        for (i, other) in players.iter_mut().enumerate() {
            if i == index {
                continue;
            }
            other.level_up_counter += rows;
            let level = self.level_for(other.level_up_counter);
            if level != other.level {
                other.level = level;
                interaction.set_level(other.id, level);
            }
        }

        if rows == 4 {
            for (i, other) in players.iter().enumerate() {
                if i != index && !other.is_game_over() {
                    debug!(
                        "player {} sends {} rows to player {}",
                        source_id, GARBAGE_ROWS_PER_TETRIS, other.id
                    );
                    interaction.add_rows(other.id, GARBAGE_ROWS_PER_TETRIS);
                }
            }
        }
    }

    fn apply_game_over(
        &mut self,
        players: &mut [&mut Player],
        index: usize,
        interaction: &mut impl PlayerInteraction,
    ) {
        self.alive_players = self.alive_players.saturating_sub(1);
        players[index].last_position = self.alive_players + 1;

        if self.is_multiplayer() {
            if self.alive_players == 1 {
                let survivor = players
                    .iter()
                    .enumerate()
                    .find(|(i, p)| *i != index && !p.is_game_over())
                    .map(|(_, p)| p.id);
                if let Some(id) = survivor {
                    interaction.force_game_over(id);
                }
            }
            return;
        }

        let player = &players[index];
        let board = player.board();
        let default_game = board.columns() == DEFAULT_COLUMNS
            && board.rows() == DEFAULT_ROWS
            && !player.is_ai()
            && self.max_level == DEFAULT_MAX_LEVEL;
        if default_game {
            interaction.game_is_over(player.points);
        }
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use net_tetris_types::{BlockType, Move};

    #[derive(Default)]
    struct Recorder {
        add_rows: Vec<(PlayerId, u32)>,
        forced: Vec<PlayerId>,
        game_over: Vec<u32>,
        levels: Vec<(PlayerId, u32)>,
    }

    impl PlayerInteraction for Recorder {
        fn add_rows(&mut self, player_id: PlayerId, rows: u32) {
            self.add_rows.push((player_id, rows));
        }

        fn force_game_over(&mut self, player_id: PlayerId) {
            self.forced.push(player_id);
        }

        fn game_is_over(&mut self, points: u32) {
            self.game_over.push(points);
        }

        fn set_level(&mut self, player_id: PlayerId, level: u32) {
            self.levels.push((player_id, level));
        }
    }

    fn player(id: PlayerId, columns: usize, rows: usize, ai: bool) -> Player {
        Player::new(id, format!("p{}", id), ai, Board::new(columns, rows, BlockType::I, BlockType::O))
    }

    fn roster(n: u8) -> Vec<Player> {
        (0..n).map(|id| player(id, 10, 24, false)).collect()
    }

    #[test]
    fn test_row_clear_scoring() {
        let mut players = roster(1);
        players[0].level = 3;
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(1);
        let mut rec = Recorder::default();

        rules.apply(&mut refs, 0, GameEvent::TwoRowRemoved, &mut rec);
        assert_eq!(refs[0].points(), 3 * 4);
        assert_eq!(refs[0].cleared_rows(), 2);
    }

    #[test]
    fn test_single_player_level_up() {
        let mut players = roster(1);
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(1);
        let mut rec = Recorder::default();

        for _ in 0..2 {
            rules.apply(&mut refs, 0, GameEvent::FourRowRemoved, &mut rec);
        }
        assert_eq!(refs[0].level(), 1);
        rules.apply(&mut refs, 0, GameEvent::TwoRowRemoved, &mut rec);
        assert_eq!(refs[0].level_up_counter(), 10);
        assert_eq!(refs[0].level(), 2);
        assert_eq!(rec.levels, vec![(0, 2)]);
        assert!(rec.add_rows.is_empty());
    }

    #[test]
    fn test_level_is_capped() {
        let mut players = roster(1);
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::new(2);
        rules.reset(1);
        let mut rec = Recorder::default();
        for _ in 0..20 {
            rules.apply(&mut refs, 0, GameEvent::FourRowRemoved, &mut rec);
        }
        assert_eq!(refs[0].level(), 2);
    }

    #[test]
    fn test_multiplayer_clear_levels_up_opponents() {
        let mut players = roster(3);
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(3);
        let mut rec = Recorder::default();

        for _ in 0..10 {
            rules.apply(&mut refs, 0, GameEvent::OneRowRemoved, &mut rec);
        }
        assert_eq!(refs[0].level_up_counter(), 0);
        assert_eq!(refs[0].level(), 1);
        assert_eq!(refs[1].level(), 2);
        assert_eq!(refs[2].level(), 2);
        assert_eq!(rec.levels, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_tetris_sends_two_rows_to_each_opponent() {
        let mut players = roster(3);
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(3);
        let mut rec = Recorder::default();

        rules.apply(&mut refs, 1, GameEvent::FourRowRemoved, &mut rec);
        assert_eq!(rec.add_rows, vec![(0, 2), (2, 2)]);

        rules.apply(&mut refs, 1, GameEvent::ThreeRowRemoved, &mut rec);
        assert_eq!(rec.add_rows.len(), 2);
    }

    #[test]
    fn test_single_player_tetris_sends_nothing() {
        let mut players = roster(1);
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(1);
        let mut rec = Recorder::default();
        rules.apply(&mut refs, 0, GameEvent::FourRowRemoved, &mut rec);
        assert!(rec.add_rows.is_empty());
    }

    #[test]
    fn test_elimination_order_and_forced_game_over() {
        let mut players = roster(3);
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(3);
        let mut rec = Recorder::default();

        refs[2].board_mut().update(Move::GameOver);
        rules.apply(&mut refs, 2, GameEvent::GameOver, &mut rec);
        assert_eq!(refs[2].last_position(), 3);
        assert!(rec.forced.is_empty());

        refs[0].board_mut().update(Move::GameOver);
        rules.apply(&mut refs, 0, GameEvent::GameOver, &mut rec);
        assert_eq!(refs[0].last_position(), 2);
        assert_eq!(rec.forced, vec![1]);

        refs[1].board_mut().update(Move::GameOver);
        rules.apply(&mut refs, 1, GameEvent::GameOver, &mut rec);
        assert_eq!(refs[1].last_position(), 1);
        assert_eq!(rules.alive_players(), 0);
        assert!(rec.game_over.is_empty());
    }

    #[test]
    fn test_default_single_player_game_over_checks_highscore() {
        let mut players = roster(1);
        players[0].points = 77;
        let mut refs: Vec<&mut Player> = players.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(1);
        let mut rec = Recorder::default();
        rules.apply(&mut refs, 0, GameEvent::GameOver, &mut rec);
        assert_eq!(rec.game_over, vec![77]);
        assert_eq!(refs[0].last_position(), 1);
    }

    #[test]
    fn test_non_default_games_skip_highscore() {
        let mut rec = Recorder::default();

        let mut small = vec![player(0, 10, 20, false)];
        let mut refs: Vec<&mut Player> = small.iter_mut().collect();
        let mut rules = Rules::default();
        rules.reset(1);
        rules.apply(&mut refs, 0, GameEvent::GameOver, &mut rec);

        let mut ai = vec![player(0, 10, 24, true)];
        let mut refs: Vec<&mut Player> = ai.iter_mut().collect();
        rules.reset(1);
        rules.apply(&mut refs, 0, GameEvent::GameOver, &mut rec);

        let mut capped = roster(1);
        let mut refs: Vec<&mut Player> = capped.iter_mut().collect();
        let mut rules = Rules::new(20);
        rules.reset(1);
        rules.apply(&mut refs, 0, GameEvent::GameOver, &mut rec);

        assert!(rec.game_over.is_empty());
    }
}
