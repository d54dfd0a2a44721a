//! Chess trainer core: a UCI engine session, the engine output parser and a
//! turn coordinator driving bot games, coached games, puzzles and analysis.

pub mod config;
pub mod domain;
pub mod models;
