//! Domain layer: chess types, the rules oracle, the engine wire protocol,
//! game records and puzzles. Nothing in here spawns processes.

pub mod chess;
pub mod puzzle;
pub mod record;
pub mod rules;
pub mod uci;

pub use chess::{MoveRequest, ParseMoveError, PieceColor, Promotion};
pub use puzzle::{Puzzle, PuzzleSet, PuzzleStatus};
pub use record::{GameRecord, Ply, RecordError};
pub use rules::{DrawReason, GameStatus, MoveRejected, RulesError};
pub use uci::{EngineEvent, Score, UciCommand};
