//! UCI (Universal Chess Interface) protocol types and the output parser.
//!
//! This module handles the textual side of engine communication: rendering
//! commands and decoding output lines into [`EngineEvent`]s. It does not
//! handle process spawning (that's done in the models layer).

use std::fmt;
use std::num::NonZeroU32;

use crate::domain::chess::{MoveRequest, PieceColor};

/// Tokens `bestmove` may carry when the engine has no legal move to play
const NO_MOVE_SENTINELS: [&str; 2] = ["(none)", "0000"];

/// UCI commands that can be sent to an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    /// Initialize UCI mode (the handshake)
    Uci,
    /// Check if engine is ready
    IsReady,
    /// Announce that following positions belong to a new game
    UciNewGame,
    /// Set an engine option
    SetOption { name: String, value: String },
    /// Set the position to search
    Position { fen: String },
    /// Start a search limited to the given depth
    GoDepth(NonZeroU32),
    /// Stop the current search
    Stop,
    /// Quit the engine
    Quit,
}

impl UciCommand {
    /// Convert command to UCI protocol string
    pub fn to_uci_string(&self) -> String {
        match self {
            UciCommand::Uci => "uci".to_string(),
            UciCommand::IsReady => "isready".to_string(),
            UciCommand::UciNewGame => "ucinewgame".to_string(),
            UciCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            UciCommand::Position { fen } => format!("position fen {}", fen),
            UciCommand::GoDepth(d) => format!("go depth {}", d),
            UciCommand::Stop => "stop".to_string(),
            UciCommand::Quit => "quit".to_string(),
        }
    }
}

/// Coarse categorization of a raw output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciOutputKind<'a> {
    /// "uciok" - handshake acknowledged
    UciOk,
    /// "readyok" - engine is ready
    ReadyOk,
    /// "info ..." - analysis information (payload after the keyword)
    Info(&'a str),
    /// "bestmove ..." - search finished (payload after the keyword)
    BestMove(&'a str),
    /// Anything else
    Other,
}

impl<'a> UciOutputKind<'a> {
    /// Categorize a raw UCI output line
    pub fn categorize(line: &'a str) -> Self {
        let line = line.trim();
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim_start()))
            .unwrap_or((line, ""));

        match keyword {
            "uciok" => UciOutputKind::UciOk,
            "readyok" => UciOutputKind::ReadyOk,
            "info" => UciOutputKind::Info(rest),
            "bestmove" => UciOutputKind::BestMove(rest),
            _ => UciOutputKind::Other,
        }
    }
}

/// Engine evaluation score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawn score
    Centipawns(i32),
    /// Mate in N moves (sign tells which side mates)
    Mate(i32),
}

/// "+0.35", "-1.25", "M3", "-M2"
impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::Centipawns(cp) => {
                let sign = if cp < 0 { '-' } else { '+' };
                let cp = cp.unsigned_abs();
                write!(f, "{}{}.{:02}", sign, cp / 100, cp % 100)
            }
            Score::Mate(moves) if moves < 0 => write!(f, "-M{}", moves.unsigned_abs()),
            Score::Mate(moves) => write!(f, "M{}", moves),
        }
    }
}

/// A decoded engine output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Centipawn evaluation of the searched position
    ScoreUpdate { centipawns: i32 },
    /// Forced mate in `moves` full moves; negative when the mating side is the opponent
    MateUpdate { moves: i32 },
    /// Search finished; `None` means the position has no legal move
    BestMove { mv: Option<MoveRequest> },
}

impl EngineEvent {
    /// The score carried by this event, if any
    pub fn score(&self) -> Option<Score> {
        match self {
            EngineEvent::ScoreUpdate { centipawns } => Some(Score::Centipawns(*centipawns)),
            EngineEvent::MateUpdate { moves } => Some(Score::Mate(*moves)),
            EngineEvent::BestMove { .. } => None,
        }
    }

    /// Re-express a side-to-move relative score so that positive favors white.
    ///
    /// UCI engines report scores from the point of view of the side to move.
    pub fn from_white_view(self, side_to_move: PieceColor) -> Self {
        if side_to_move == PieceColor::White {
            return self;
        }
        match self {
            EngineEvent::ScoreUpdate { centipawns } => EngineEvent::ScoreUpdate {
                centipawns: centipawns.saturating_neg(),
            },
            EngineEvent::MateUpdate { moves } => EngineEvent::MateUpdate {
                moves: moves.saturating_neg(),
            },
            best @ EngineEvent::BestMove { .. } => best,
        }
    }
}

/// Decode one line of engine output.
///
/// Scores are returned exactly as emitted (relative to the side to move).
/// Unrecognized lines, including secondary MultiPV lines, yield `None`.
pub fn parse(line: &str) -> Option<EngineEvent> {
    match UciOutputKind::categorize(line) {
        UciOutputKind::Info(rest) => {
            let info = UciInfo::parse(rest);
            if info.multipv.is_some_and(|n| n > 1) {
                return None;
            }
            info.score.map(|score| match score {
                Score::Centipawns(centipawns) => EngineEvent::ScoreUpdate { centipawns },
                Score::Mate(moves) => EngineEvent::MateUpdate { moves },
            })
        }
        UciOutputKind::BestMove(rest) => {
            let token = rest.split_whitespace().next()?;
            if NO_MOVE_SENTINELS.contains(&token) {
                return Some(EngineEvent::BestMove { mv: None });
            }
            token
                .parse::<MoveRequest>()
                .ok()
                .map(|mv| EngineEvent::BestMove { mv: Some(mv) })
        }
        _ => None,
    }
}

/// The fields of an info line the parser cares about
#[derive(Debug, Clone, Default)]
struct UciInfo {
    /// Multi-PV line number (1-indexed)
    multipv: Option<u32>,
    score: Option<Score>,
}

impl UciInfo {
    /// Parse a UCI info string (the part after "info ")
    fn parse(info_str: &str) -> Self {
        let mut info = UciInfo::default();
        let tokens: Vec<&str> = info_str.split_whitespace().collect();
        let mut i = 0;

        while i < tokens.len() {
            match tokens[i] {
                "multipv" => {
                    info.multipv = tokens.get(i + 1).and_then(|t| t.parse().ok());
                    i += 2;
                }
                "score" => {
                    // score cp <x> or score mate <x>
                    let value = tokens.get(i + 2).and_then(|t| t.parse::<i32>().ok());
                    match (tokens.get(i + 1).copied(), value) {
                        (Some("cp"), Some(cp)) => info.score = Some(Score::Centipawns(cp)),
                        (Some("mate"), Some(m)) => info.score = Some(Score::Mate(m)),
                        _ => {}
                    }
                    i += 3;
                }
                // everything after these keywords is free-form
                "pv" | "string" => break,
                _ => i += 1,
            }
        }

        info
    }
}
