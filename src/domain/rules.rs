//! Rules oracle backed by `shakmaty`.
//!
//! Everything that needs to know the rules of chess goes through here:
//! loading positions, matching a [`MoveRequest`] against the legal moves,
//! producing SAN, and deciding whether a position is terminal.

use serde::Serialize;
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, EnPassantMode, File, Move, Position, Role, Square};
use thiserror::Error;

use crate::domain::chess::{MoveRequest, PieceColor, Promotion};

/// Half-moves without capture or pawn move after which the game is drawn
const FIFTY_MOVE_HALFMOVES: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },
    #[error("{san:?} is not a legal move in this position")]
    IllegalSan { san: String },
}

/// A human or engine move the oracle refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("move {0} is not legal in this position")]
pub struct MoveRejected(pub MoveRequest);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
}

/// Terminal state of a game as far as the oracle is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameStatus {
    Ongoing,
    Checkmate { winner: PieceColor },
    Draw { reason: DrawReason },
    /// The engine answered with a move the rules do not allow
    Aborted,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }

    /// Short status line for the game-over banner
    pub fn status_text(&self) -> &'static str {
        match self {
            GameStatus::Ongoing => "",
            GameStatus::Checkmate { .. } => "Checkmate!",
            GameStatus::Draw { .. } => "Draw",
            GameStatus::Aborted => "Aborted",
        }
    }
}

/// Result of playing a move: the new position plus its notations
#[derive(Debug, Clone)]
pub struct AppliedMove {
    pub position: Chess,
    /// SAN including the check/mate suffix, e.g. "Qxf7#"
    pub san: String,
    pub uci: String,
}

/// Start position, or the position described by `fen`
pub fn new_game(fen: Option<&str>) -> Result<Chess, RulesError> {
    let Some(text) = fen else {
        return Ok(Chess::default());
    };

    let invalid = |reason: String| RulesError::InvalidFen {
        fen: text.to_string(),
        reason,
    };
    let parsed: Fen = text.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| invalid(format!("{}", e)))
}

/// Full FEN of a position
pub fn fen_of(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal).to_string()
}

/// Placement, side to move, castling rights and en passant square; the part
/// of the FEN that decides whether two positions repeat
pub fn position_key(position: &Chess) -> String {
    fen_of(position)
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn side_to_move(position: &Chess) -> PieceColor {
    position.turn().into()
}

/// Origin and destination squares of a legal move as a user would drag it.
///
/// Castling is expressed as the king moving two files (e1g1), which is also
/// how UCI engines write it in standard chess.
fn drag_squares(m: &Move) -> Option<(Square, Square)> {
    match m {
        Move::Normal { from, to, .. } => Some((*from, *to)),
        Move::EnPassant { from, to } => Some((*from, *to)),
        Move::Castle { king, rook } => {
            let king_dest = if rook.file() == File::H {
                Square::from_coords(File::G, rook.rank())
            } else {
                Square::from_coords(File::C, rook.rank())
            };
            Some((*king, king_dest))
        }
        Move::Put { .. } => None,
    }
}

/// The [`MoveRequest`] a legal move corresponds to
pub fn to_request(m: &Move) -> Option<MoveRequest> {
    let (from, to) = drag_squares(m)?;
    Some(MoveRequest {
        from,
        to,
        promotion: m.promotion().and_then(Promotion::from_role),
    })
}

/// Find the legal move matching a request.
///
/// A pawn reaching the last rank without an explicit promotion piece
/// promotes to a queen. A promotion piece on a non-promoting move is ignored.
pub fn find_move(position: &Chess, request: &MoveRequest) -> Option<Move> {
    for m in &position.legal_moves() {
        let Some((from, to)) = drag_squares(m) else {
            continue;
        };
        if from != request.from || to != request.to {
            continue;
        }

        match (m.promotion(), request.promotion) {
            (None, _) => return Some(m.clone()),
            (Some(role), Some(wanted)) if role == wanted.role() => return Some(m.clone()),
            (Some(Role::Queen), None) => return Some(m.clone()),
            _ => continue,
        }
    }
    None
}

/// Play a legal move and record its notations
fn play(position: &Chess, m: Move) -> Option<AppliedMove> {
    let request = to_request(&m)?;
    let mut san = San::from_move(position, m.clone()).to_string();
    let after = position.clone().play(m).ok()?;

    if after.is_checkmate() {
        san.push('#');
    } else if after.is_check() {
        san.push('+');
    }

    Some(AppliedMove {
        position: after,
        san,
        uci: request.to_uci_string(),
    })
}

/// Validate and apply a candidate move
pub fn apply_move(position: &Chess, request: &MoveRequest) -> Result<AppliedMove, MoveRejected> {
    find_move(position, request)
        .and_then(|m| play(position, m))
        .ok_or(MoveRejected(*request))
}

/// Apply a move written in SAN (suffixes and annotation glyphs allowed)
pub fn apply_san(position: &Chess, san: &str) -> Result<AppliedMove, RulesError> {
    let illegal = || RulesError::IllegalSan {
        san: san.to_string(),
    };
    let parsed: SanPlus = san
        .trim_end_matches(['!', '?'])
        .parse()
        .map_err(|_| illegal())?;
    let m = parsed.san.to_move(position).map_err(|_| illegal())?;
    play(position, m).ok_or_else(illegal)
}

/// Terminal status judged from the position alone (no repetition history)
pub fn status(position: &Chess) -> GameStatus {
    if position.is_checkmate() {
        return GameStatus::Checkmate {
            winner: side_to_move(position).opposite(),
        };
    }
    let reason = if position.is_stalemate() {
        DrawReason::Stalemate
    } else if position.is_insufficient_material() {
        DrawReason::InsufficientMaterial
    } else if position.halfmoves() >= FIFTY_MOVE_HALFMOVES {
        DrawReason::FiftyMoveRule
    } else {
        return GameStatus::Ongoing;
    };
    GameStatus::Draw { reason }
}
