pub mod coordinator;
pub mod engine;
pub mod snapshot;

pub use coordinator::{CoordinatorError, Mode, MoveOutcome, TurnCoordinator};
pub use engine::{EngineSession, SearchEngine, SearchEvent, SearchId, SearchRequest, SessionError};
pub use snapshot::{CoachFeedback, Grade, ModeKind, Phase, PuzzleView, Snapshot};
