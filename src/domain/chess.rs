//! Pure chess domain types shared by the engine protocol and the coordinator.
//! No process or I/O dependencies - this is the domain layer.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shakmaty::{Color as SColor, Role, Square};
use thiserror::Error;

/// Pieces a pawn may promote to
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Promotion {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl Promotion {
    /// Parse the lowercase or uppercase piece letter used by UCI and SAN
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }

    /// Lowercase letter as written in a UCI move token
    pub fn char(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }

    pub fn role(self) -> Role {
        match self {
            Promotion::Queen => Role::Queen,
            Promotion::Rook => Role::Rook,
            Promotion::Bishop => Role::Bishop,
            Promotion::Knight => Role::Knight,
        }
    }

    pub fn from_role(role: Role) -> Option<Self> {
        match role {
            Role::Queen => Some(Promotion::Queen),
            Role::Rook => Some(Promotion::Rook),
            Role::Bishop => Some(Promotion::Bishop),
            Role::Knight => Some(Promotion::Knight),
            Role::Pawn | Role::King => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PieceColor {
    White,
    Black,
}

impl PieceColor {
    pub fn opposite(self) -> Self {
        match self {
            PieceColor::White => PieceColor::Black,
            PieceColor::Black => PieceColor::White,
        }
    }
}

impl From<SColor> for PieceColor {
    fn from(color: SColor) -> Self {
        match color {
            SColor::White => PieceColor::White,
            SColor::Black => PieceColor::Black,
        }
    }
}

impl From<PieceColor> for SColor {
    fn from(color: PieceColor) -> Self {
        match color {
            PieceColor::White => SColor::White,
            PieceColor::Black => SColor::Black,
        }
    }
}

impl fmt::Display for PieceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceColor::White => f.write_str("white"),
            PieceColor::Black => f.write_str("black"),
        }
    }
}

/// A candidate move, as submitted by a human or decoded from engine output.
///
/// Looser than a legal move: it only names squares and
/// an optional promotion piece. The rules oracle decides whether it can be
/// played in a given position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Promotion>,
}

impl MoveRequest {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = Some(promotion);
        self
    }

    /// Whether both requests move from and to the same squares (promotion ignored)
    pub fn same_squares(&self, other: &MoveRequest) -> bool {
        self.from == other.from && self.to == other.to
    }

    /// Render as a UCI move token, e.g. "e2e4" or "e7e8q"
    pub fn to_uci_string(&self) -> String {
        let mut token = format!("{}{}", self.from, self.to);
        if let Some(promotion) = self.promotion {
            token.push(promotion.char());
        }
        token
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid UCI move token: {0:?}")]
pub struct ParseMoveError(pub String);

impl FromStr for MoveRequest {
    type Err = ParseMoveError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let err = || ParseMoveError(token.to_string());

        if !token.is_ascii() || !(4..=5).contains(&token.len()) {
            return Err(err());
        }

        let bytes = token.as_bytes();
        let from = Square::from_ascii(&bytes[0..2]).map_err(|_| err())?;
        let to = Square::from_ascii(&bytes[2..4]).map_err(|_| err())?;
        let promotion = match bytes.get(4) {
            Some(&c) => Some(Promotion::from_char(c as char).ok_or_else(err)?),
            None => None,
        };

        Ok(MoveRequest {
            from,
            to,
            promotion,
        })
    }
}
