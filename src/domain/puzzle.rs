//! Puzzle catalogue: a start position with a single expected move in SAN.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Puzzle {
    pub id: u32,
    pub fen: String,
    /// The one accepted answer, compared verbatim against the SAN of the played move
    pub solution_san: String,
    #[serde(default)]
    pub hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleStatus {
    Solving,
    Correct,
    Wrong,
}

/// The puzzles shipped with the trainer
pub fn default_puzzles() -> Vec<Puzzle> {
    let puzzle = |id, fen: &str, solution_san: &str, hint: &str| Puzzle {
        id,
        fen: fen.to_string(),
        solution_san: solution_san.to_string(),
        hint: hint.to_string(),
    };

    vec![
        puzzle(
            1,
            "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4",
            "Qxf7#",
            "Target the f7 square!",
        ),
        puzzle(
            2,
            "6k1/5ppp/8/8/8/8/5PPP/4R1K1 w - - 0 1",
            "Re8#",
            "The King is trapped on the back rank.",
        ),
        puzzle(
            3,
            "7k/8/6K1/8/8/8/8/1Q6 w - - 0 1",
            "Qb8#",
            "Queen and King mate.",
        ),
        // Kxh8 Qxh6+ Kg8 Qg7#
        puzzle(
            4,
            "4R3/2p2p1k/p4Ppp/1p6/5Q2/2P4P/PP3PPK/3r4 w - - 0 32",
            "Rh8+",
            "Sacrifice the Rook to open the h-file!",
        ),
    ]
}

/// A list of puzzles with the one currently being solved
#[derive(Debug, Clone)]
pub struct PuzzleSet {
    puzzles: Vec<Puzzle>,
    index: usize,
}

impl PuzzleSet {
    /// Returns `None` for an empty list
    pub fn new(puzzles: Vec<Puzzle>) -> Option<Self> {
        if puzzles.is_empty() {
            None
        } else {
            Some(Self { puzzles, index: 0 })
        }
    }

    pub fn current(&self) -> &Puzzle {
        &self.puzzles[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.puzzles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puzzles.is_empty()
    }

    /// Select a puzzle by position in the list
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.puzzles.len() {
            self.index = index;
            true
        } else {
            false
        }
    }

    /// Advance to the next puzzle, wrapping to the first after the last.
    /// Returns true when the set wrapped around (all puzzles completed).
    pub fn advance(&mut self) -> bool {
        self.index += 1;
        if self.index == self.puzzles.len() {
            self.index = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules;

    #[test]
    fn test_default_puzzles_load() {
        for puzzle in default_puzzles() {
            let position = rules::new_game(Some(&puzzle.fen));
            assert!(position.is_ok(), "puzzle {} has a bad FEN", puzzle.id);
            let solved = rules::apply_san(&position.unwrap(), &puzzle.solution_san);
            assert!(solved.is_ok(), "puzzle {} has an illegal solution", puzzle.id);
            assert_eq!(solved.unwrap().san, puzzle.solution_san);
        }
    }

    #[test]
    fn test_advance_wraps() {
        let mut set = PuzzleSet::new(default_puzzles()).unwrap();
        assert_eq!(set.current().id, 1);
        assert!(!set.advance());
        assert!(!set.advance());
        assert!(!set.advance());
        assert_eq!(set.current().id, 4);
        assert!(set.advance());
        assert_eq!(set.index(), 0);
    }

    #[test]
    fn test_empty_set() {
        assert!(PuzzleSet::new(Vec::new()).is_none());
    }

    #[test]
    fn test_select() {
        let mut set = PuzzleSet::new(default_puzzles()).unwrap();
        assert!(set.select(2));
        assert_eq!(set.current().solution_san, "Qb8#");
        assert!(!set.select(9));
    }
}
