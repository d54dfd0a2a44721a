//! Application configuration.
//!
//! Everything has a default, so the trainer runs without a config file. A
//! TOML file may override any subset of the fields.

use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::chess::PieceColor;
use crate::domain::puzzle::{Puzzle, default_puzzles};

const fn depth(n: u32) -> NonZeroU32 {
    match NonZeroU32::new(n) {
        Some(d) => d,
        None => panic!("search depth must be positive"),
    }
}

const DEFAULT_BOT_DEPTH: NonZeroU32 = depth(5);
const COACH_ANALYSIS_DEPTH: NonZeroU32 = depth(10);
const COACH_REPLY_DEPTH: NonZeroU32 = depth(5);
const ANALYSIS_DEPTH: NonZeroU32 = depth(12);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How to launch the UCI engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable path, looked up on PATH when relative
    pub path: PathBuf,
    pub args: Vec<String>,
    /// UCI options sent with `setoption` during the handshake
    pub options: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BotTier {
    Beginner,
    Intermediate,
    Advanced,
}

/// An opponent in bot play; strength is expressed purely as search depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BotProfile {
    pub id: String,
    pub name: String,
    pub elo: u32,
    pub description: String,
    pub tier: BotTier,
    pub depth: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CoachConfig {
    /// Depth of the pre-analysis used to grade the human's move
    pub analysis_depth: NonZeroU32,
    /// Depth of the coach's own replies
    pub reply_depth: NonZeroU32,
    pub human: PieceColor,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            analysis_depth: COACH_ANALYSIS_DEPTH,
            reply_depth: COACH_REPLY_DEPTH,
            human: PieceColor::White,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    pub depth: NonZeroU32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            depth: ANALYSIS_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub bots: Vec<BotProfile>,
    /// Depth used for a bot id missing from the roster
    pub default_bot_depth: NonZeroU32,
    pub coach: CoachConfig,
    pub analysis: AnalysisConfig,
    pub puzzles: Vec<Puzzle>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            bots: default_bots(),
            default_bot_depth: DEFAULT_BOT_DEPTH,
            coach: CoachConfig::default(),
            analysis: AnalysisConfig::default(),
            puzzles: default_puzzles(),
        }
    }
}

impl AppConfig {
    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn bot(&self, id: &str) -> Option<&BotProfile> {
        self.bots.iter().find(|bot| bot.id == id)
    }

    /// Search depth for a bot, falling back to `default_bot_depth`
    pub fn bot_depth(&self, id: &str) -> NonZeroU32 {
        self.bot(id).map_or(self.default_bot_depth, |bot| bot.depth)
    }
}

fn default_bots() -> Vec<BotProfile> {
    let bot = |id: &str, name: &str, elo, description: &str, tier, d| BotProfile {
        id: id.to_string(),
        name: name.to_string(),
        elo,
        description: description.to_string(),
        tier,
        depth: depth(d),
    };

    vec![
        bot("martin", "Martin", 250, "Can barely move pieces.", BotTier::Beginner, 1),
        bot("elani", "Elani", 400, "Learning the rules.", BotTier::Beginner, 3),
        bot("emir", "Emir", 1000, "Solid player.", BotTier::Intermediate, 6),
        bot("sven", "Sven", 1200, "Dangerous tactician.", BotTier::Intermediate, 8),
        bot("nelson", "Nelson", 1500, "Queen attacks only.", BotTier::Advanced, 10),
        bot("antigravity", "Antigravity", 3000, "Grandmaster Level.", BotTier::Advanced, 15),
    ]
}
