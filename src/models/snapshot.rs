//! Read-only view of a coordinator, prepared for whatever presents it.
//!
//! These types are DTOs: they carry display-ready state out of the models
//! layer and are never fed back in.

use serde::Serialize;

use crate::domain::chess::PieceColor;
use crate::domain::puzzle::PuzzleStatus;
use crate::domain::rules::GameStatus;

/// Whose move the coordinator is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingHuman,
    AwaitingEngine,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    BotPlay,
    CoachPlay,
    Puzzle,
    Analysis,
}

/// How the coach judged the human's last move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Best,
    Inaccuracy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoachFeedback {
    pub grade: Option<Grade>,
    pub message: String,
    /// Accent color for the message, as a CSS hex string
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PuzzleView {
    pub id: u32,
    pub index: usize,
    pub total: usize,
    pub status: PuzzleStatus,
    pub hint: String,
}

/// Everything a front-end needs to draw the current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub mode: ModeKind,
    pub fen: String,
    pub side_to_move: PieceColor,
    pub phase: Phase,
    pub status: GameStatus,
    pub status_text: &'static str,
    /// SAN of every ply
    pub history: Vec<String>,
    /// Displayed ply; `None` is the initial position
    pub cursor: Option<usize>,
    /// Evaluation from white's view ("+0.35", "M3"), "..." while searching
    pub evaluation: Option<String>,
    /// Engine's preferred move in the displayed position, as a UCI token
    pub best_move: Option<String>,
    pub coach: Option<CoachFeedback>,
    pub puzzle: Option<PuzzleView>,
}

impl Snapshot {
    /// Move list as "1. e4 e5 2. Nf3", with the displayed ply in brackets
    pub fn move_list(&self) -> String {
        let mut out = String::new();
        for (i, san) in self.history.iter().enumerate() {
            if i % 2 == 0 {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&format!("{}.", i / 2 + 1));
            }
            out.push(' ');
            if self.cursor == Some(i) {
                out.push_str(&format!("[{}]", san));
            } else {
                out.push_str(san);
            }
        }
        out
    }
}
