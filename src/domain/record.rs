//! Game record: the ordered list of played moves plus a cursor marking the
//! displayed ply, and PGN import.
//!
//! This is a pure domain module with no engine dependencies.

use shakmaty::Chess;
use thiserror::Error;

use crate::domain::rules::{self, AppliedMove, DrawReason, GameStatus, RulesError};

/// Occurrences of the same position that end the game in a draw
const REPETITION_LIMIT: usize = 3;

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("malformed PGN: {0}")]
    Malformed(String),
    #[error("invalid start position: {0}")]
    InvalidStart(RulesError),
    #[error("illegal move {san:?} at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

/// One played half-move
#[derive(Clone, Debug)]
pub struct Ply {
    /// SAN notation including check suffix
    pub san: String,
    /// UCI token of the same move
    pub uci: String,
    /// The position after this move
    pub position: Chess,
}

impl From<AppliedMove> for Ply {
    fn from(applied: AppliedMove) -> Self {
        Self {
            san: applied.san,
            uci: applied.uci,
            position: applied.position,
        }
    }
}

/// A linear game record with a navigation cursor
#[derive(Clone, Debug)]
pub struct GameRecord {
    initial: Chess,
    plies: Vec<Ply>,
    /// Index of the displayed ply; `None` shows the initial position
    cursor: Option<usize>,
}

impl GameRecord {
    /// Create an empty record starting from `initial`
    pub fn new(initial: Chess) -> Self {
        Self {
            initial,
            plies: Vec::new(),
            cursor: None,
        }
    }

    pub fn initial(&self) -> &Chess {
        &self.initial
    }

    pub fn plies(&self) -> &[Ply] {
        &self.plies
    }

    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The position at the cursor
    pub fn displayed(&self) -> &Chess {
        match self.cursor {
            Some(i) => &self.plies[i].position,
            None => &self.initial,
        }
    }

    /// SAN of every ply in order
    pub fn history(&self) -> Vec<String> {
        self.plies.iter().map(|p| p.san.clone()).collect()
    }

    /// Whether the cursor shows the latest ply
    pub fn is_at_end(&self) -> bool {
        self.cursor == self.end_cursor()
    }

    /// Append a move after the cursor, discarding any plies beyond it, and
    /// move the cursor onto the new ply
    pub fn push(&mut self, applied: AppliedMove) {
        let keep = self.cursor.map_or(0, |i| i + 1);
        self.plies.truncate(keep);
        self.plies.push(applied.into());
        self.cursor = Some(self.plies.len() - 1);
    }

    /// Navigate to a ply (`None` = initial position). Returns false if out of range.
    pub fn go_to(&mut self, cursor: Option<usize>) -> bool {
        match cursor {
            Some(i) if i >= self.plies.len() => false,
            _ => {
                self.cursor = cursor;
                true
            }
        }
    }

    /// Cursor one ply earlier; `None` when the initial position is shown
    pub fn previous_cursor(&self) -> Option<Option<usize>> {
        self.cursor.map(|i| i.checked_sub(1))
    }

    /// Cursor one ply later; `None` when the last ply is shown
    pub fn next_cursor(&self) -> Option<usize> {
        let next = self.cursor.map_or(0, |i| i + 1);
        (next < self.plies.len()).then_some(next)
    }

    /// Cursor of the last ply (`None` for an empty record)
    pub fn end_cursor(&self) -> Option<usize> {
        self.plies.len().checked_sub(1)
    }

    /// Rebuild the position at `cursor` by replaying SAN from the initial position
    pub fn replay(&self, cursor: Option<usize>) -> Result<Chess, RulesError> {
        let count = cursor.map_or(0, |i| i + 1);
        let mut position = self.initial.clone();
        for ply in self.plies.iter().take(count) {
            position = rules::apply_san(&position, &ply.san)?.position;
        }
        Ok(position)
    }

    /// How many times the displayed position occurred up to and including the cursor
    pub fn repetitions(&self) -> usize {
        let key = rules::position_key(self.displayed());
        let count = self.cursor.map_or(0, |i| i + 1);
        std::iter::once(&self.initial)
            .chain(self.plies.iter().take(count).map(|p| &p.position))
            .filter(|pos| rules::position_key(pos) == key)
            .count()
    }

    /// Terminal status of the displayed position, including threefold repetition
    pub fn status(&self) -> GameStatus {
        let status = rules::status(self.displayed());
        if status.is_terminal() {
            return status;
        }
        if self.repetitions() >= REPETITION_LIMIT {
            return GameStatus::Draw {
                reason: DrawReason::ThreefoldRepetition,
            };
        }
        GameStatus::Ongoing
    }

    /// Import a game from PGN text. The cursor ends on the last ply.
    ///
    /// Tag pairs are read only for a `FEN` start position; comments, NAGs,
    /// variations and the result token are skipped.
    pub fn from_pgn(text: &str) -> Result<Self, RecordError> {
        let (tags, tokens) = tokenize_pgn(text)?;

        let start_fen = tags
            .iter()
            .find(|(name, _)| name == "FEN")
            .map(|(_, value)| value.as_str());
        let initial = rules::new_game(start_fen).map_err(RecordError::InvalidStart)?;

        let mut record = GameRecord::new(initial);
        for (ply, token) in tokens.iter().enumerate() {
            let applied = rules::apply_san(record.displayed(), token).map_err(|_| {
                RecordError::IllegalMove {
                    ply,
                    san: token.clone(),
                }
            })?;
            record.push(applied);
        }

        Ok(record)
    }
}

/// Split PGN text into tag pairs and SAN move tokens
fn tokenize_pgn(text: &str) -> Result<(Vec<(String, String)>, Vec<String>), RecordError> {
    let mut tags = Vec::new();
    let mut moves = Vec::new();
    let mut chars = text.chars().peekable();
    let mut variation_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '[' if variation_depth == 0 => {
                let body: String = chars.by_ref().take_while(|&c| c != ']').collect();
                tags.push(parse_tag(&body)?);
            }
            '{' => {
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(RecordError::Malformed("unterminated comment".to_string()));
                }
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => variation_depth += 1,
            ')' => {
                variation_depth = variation_depth.checked_sub(1).ok_or_else(|| {
                    RecordError::Malformed("unbalanced ')'".to_string())
                })?;
            }
            c if c.is_whitespace() => {}
            c => {
                let mut token = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || "{}()[];".contains(next) {
                        break;
                    }
                    token.push(next);
                    chars.next();
                }
                if variation_depth == 0 {
                    if let Some(san) = movetext_token(&token) {
                        moves.push(san);
                    }
                }
            }
        }
    }

    if variation_depth > 0 {
        return Err(RecordError::Malformed("unterminated variation".to_string()));
    }
    Ok((tags, moves))
}

/// Parse the inside of `[Name "Value"]`
fn parse_tag(body: &str) -> Result<(String, String), RecordError> {
    let malformed = || RecordError::Malformed(format!("bad tag pair [{}]", body));
    let (name, value) = body.trim().split_once(char::is_whitespace).ok_or_else(malformed)?;
    let value = value
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(malformed)?;
    Ok((name.to_string(), value.to_string()))
}

/// Reduce a movetext token to SAN, or `None` for move numbers, NAGs and results
fn movetext_token(token: &str) -> Option<String> {
    if token.starts_with('$') || RESULT_TOKENS.contains(&token) {
        return None;
    }

    // "12." / "12..." / "1.e4"
    let mut san = token;
    if san.starts_with(|c: char| c.is_ascii_digit()) {
        let rest = san.trim_start_matches(|c: char| c.is_ascii_digit());
        if rest.starts_with('.') {
            san = rest.trim_start_matches('.');
        }
    }

    let san = san.trim_end_matches(['!', '?']);
    if san.is_empty() {
        None
    } else if san.starts_with("0-0") {
        // castling written with zeros
        Some(san.replace('0', "O"))
    } else {
        Some(san.to_string())
    }
}
