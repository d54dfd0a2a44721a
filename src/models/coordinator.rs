//! Turn coordinator - one state machine for every game mode.
//!
//! The coordinator owns the game record and decides, after every change,
//! whether it waits for the human or asks the engine. What happens with the
//! engine's answer depends on the [`Mode`] it was built with.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::domain::chess::{MoveRequest, PieceColor};
use crate::domain::puzzle::{Puzzle, PuzzleSet, PuzzleStatus};
use crate::domain::record::{GameRecord, RecordError};
use crate::domain::rules::{self, GameStatus, MoveRejected, RulesError};
use crate::domain::uci::{EngineEvent, Score};
use crate::models::engine::{SearchEngine, SearchEvent, SearchId, SearchRequest};
use crate::models::snapshot::{CoachFeedback, Grade, ModeKind, Phase, PuzzleView, Snapshot};

const NEUTRAL_COLOR: &str = "#4db8ff";
const BEST_COLOR: &str = "#81b64c";
const INACCURACY_COLOR: &str = "#ffcc00";

/// The per-mode policy
#[derive(Debug, Clone)]
pub enum Mode {
    /// Human against the engine at a fixed depth
    BotPlay { human: PieceColor, depth: NonZeroU32 },
    /// Human against the engine, with every human move graded against a pre-analysis
    CoachPlay {
        human: PieceColor,
        analysis_depth: NonZeroU32,
        reply_depth: NonZeroU32,
    },
    /// Find the one expected move; the engine is never consulted
    PuzzlePlay(PuzzleSet),
    /// Browse a loaded game while the engine annotates the displayed ply
    AnalysisOnly { depth: NonZeroU32 },
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::BotPlay { .. } => ModeKind::BotPlay,
            Mode::CoachPlay { .. } => ModeKind::CoachPlay,
            Mode::PuzzlePlay(_) => ModeKind::Puzzle,
            Mode::AnalysisOnly { .. } => ModeKind::Analysis,
        }
    }
}

/// Why a search was issued, which decides what its best move is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    /// The engine plays the returned move
    Reply,
    /// The returned move is kept to grade the human's next move
    PreAnalysis,
    /// The returned move is only shown
    Annotate,
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    id: SearchId,
    purpose: Purpose,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Rejected(#[from] MoveRejected),
    #[error("waiting for the engine")]
    NotYourTurn,
    #[error("the game is over")]
    GameOver,
    #[error("moves cannot be entered in analysis mode")]
    AnalysisOnly,
    #[error("only available in {0} mode")]
    WrongMode(&'static str),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// What happened to an accepted human move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Committed to the record
    Played { san: String },
    /// Committed; it was the puzzle's solution
    Solved { san: String },
    /// Legal but not the puzzle's solution; not committed
    Wrong { san: String },
}

pub struct TurnCoordinator<E: SearchEngine> {
    engine: E,
    mode: Mode,
    record: GameRecord,
    phase: Phase,
    status: GameStatus,
    outstanding: Option<Outstanding>,
    /// Latest evaluation of the searched position, white's view
    evaluation: Option<Score>,
    /// Engine's best move for the displayed position (coach cache, analysis hint)
    best_move: Option<MoveRequest>,
    coach: CoachFeedback,
    puzzle_status: PuzzleStatus,
}

impl<E: SearchEngine> TurnCoordinator<E> {
    /// Set up the mode's starting position and issue any search it needs right away
    pub fn new(engine: E, mode: Mode) -> Result<Self, CoordinatorError> {
        let coach = CoachFeedback {
            grade: None,
            message: match &mode {
                Mode::CoachPlay { human, .. } => {
                    format!("I'm watching your moves. Play {}.", title_case(*human))
                }
                _ => String::new(),
            },
            color: NEUTRAL_COLOR,
        };

        let mut coordinator = Self {
            engine,
            mode,
            record: GameRecord::new(rules::new_game(None)?),
            phase: Phase::AwaitingHuman,
            status: GameStatus::Ongoing,
            outstanding: None,
            evaluation: None,
            best_move: None,
            coach,
            puzzle_status: PuzzleStatus::Solving,
        };
        coordinator.start()?;
        Ok(coordinator)
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn fen(&self) -> String {
        rules::fen_of(self.record.displayed())
    }

    pub fn evaluation(&self) -> Option<Score> {
        self.evaluation
    }

    pub fn best_move(&self) -> Option<MoveRequest> {
        self.best_move
    }

    pub fn coach_feedback(&self) -> Option<&CoachFeedback> {
        matches!(self.mode, Mode::CoachPlay { .. }).then_some(&self.coach)
    }

    pub fn puzzle_status(&self) -> PuzzleStatus {
        self.puzzle_status
    }

    pub fn current_puzzle(&self) -> Option<&Puzzle> {
        match &self.mode {
            Mode::PuzzlePlay(set) => Some(set.current()),
            _ => None,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Reset to the mode's starting position
    pub fn new_game(&mut self) -> Result<(), CoordinatorError> {
        if matches!(self.mode, Mode::CoachPlay { .. }) {
            self.coach = CoachFeedback {
                grade: None,
                message: "New Game. Show me what you got.".to_string(),
                color: NEUTRAL_COLOR,
            };
        }
        self.start()
    }

    /// Restart the current puzzle
    pub fn retry(&mut self) -> Result<(), CoordinatorError> {
        if !matches!(self.mode, Mode::PuzzlePlay(_)) {
            return Err(CoordinatorError::WrongMode("puzzle"));
        }
        self.start()
    }

    /// Move on to the next puzzle. Returns true when the set wrapped around.
    pub fn next_puzzle(&mut self) -> Result<bool, CoordinatorError> {
        let Mode::PuzzlePlay(set) = &mut self.mode else {
            return Err(CoordinatorError::WrongMode("puzzle"));
        };
        let wrapped = set.advance();
        self.start()?;
        Ok(wrapped)
    }

    fn start(&mut self) -> Result<(), CoordinatorError> {
        let initial = match &self.mode {
            Mode::PuzzlePlay(set) => rules::new_game(Some(&set.current().fen))?,
            _ => rules::new_game(None)?,
        };

        self.drop_search();
        if self.uses_engine() {
            self.engine.new_game();
        }

        self.record = GameRecord::new(initial);
        self.evaluation = None;
        self.best_move = None;
        self.puzzle_status = PuzzleStatus::Solving;
        self.phase = Phase::AwaitingHuman;
        self.after_change();
        Ok(())
    }

    fn uses_engine(&self) -> bool {
        !matches!(self.mode, Mode::PuzzlePlay(_))
    }

    /// Submit a human move for the displayed position.
    ///
    /// Illegal moves are rejected without touching any state.
    pub fn submit_move(&mut self, request: MoveRequest) -> Result<MoveOutcome, CoordinatorError> {
        match self.phase {
            _ if matches!(self.mode, Mode::AnalysisOnly { .. }) => {
                return Err(CoordinatorError::AnalysisOnly);
            }
            Phase::Terminal => return Err(CoordinatorError::GameOver),
            Phase::AwaitingEngine => return Err(CoordinatorError::NotYourTurn),
            Phase::AwaitingHuman => {}
        }

        let applied = rules::apply_move(self.record.displayed(), &request)?;
        let san = applied.san.clone();

        if let Mode::PuzzlePlay(set) = &self.mode {
            if applied.san != set.current().solution_san {
                log::debug!("puzzle {}: {} is not the solution", set.current().id, san);
                self.puzzle_status = PuzzleStatus::Wrong;
                return Ok(MoveOutcome::Wrong { san });
            }
            self.puzzle_status = PuzzleStatus::Correct;
            self.record.push(applied);
            self.status = self.record.status();
            self.phase = Phase::Terminal;
            return Ok(MoveOutcome::Solved { san });
        }

        if matches!(self.mode, Mode::CoachPlay { .. }) {
            self.grade(&request);
        }

        self.best_move = None;
        self.record.push(applied);
        self.after_change();
        Ok(MoveOutcome::Played { san })
    }

    /// Compare the human's move with the cached pre-analysis
    fn grade(&mut self, played: &MoveRequest) {
        let Some(best) = self.best_move else {
            return;
        };
        self.coach = if played.same_squares(&best) {
            CoachFeedback {
                grade: Some(Grade::Best),
                message: "Excellent! That's the best move.".to_string(),
                color: BEST_COLOR,
            }
        } else {
            CoachFeedback {
                grade: Some(Grade::Inaccuracy),
                message: format!("Inaccuracy. Better might have been {}.", best),
                color: INACCURACY_COLOR,
            }
        };
    }

    /// Re-evaluate the game after the record changed and decide what happens next
    fn after_change(&mut self) {
        self.status = self.record.status();
        if self.status.is_terminal() {
            log::info!("game over: {:?}", self.status);
            self.drop_search();
            self.phase = Phase::Terminal;
            return;
        }

        let side = rules::side_to_move(self.record.displayed());
        match self.mode {
            Mode::BotPlay { human, depth } => {
                if side == human {
                    self.phase = Phase::AwaitingHuman;
                } else {
                    self.search(depth, Purpose::Reply);
                }
            }
            Mode::CoachPlay {
                human,
                analysis_depth,
                reply_depth,
            } => {
                if side == human {
                    self.search(analysis_depth, Purpose::PreAnalysis);
                } else {
                    self.search(reply_depth, Purpose::Reply);
                }
            }
            Mode::PuzzlePlay(_) => self.phase = Phase::AwaitingHuman,
            Mode::AnalysisOnly { depth } => self.search(depth, Purpose::Annotate),
        }
    }

    /// Issue a search for the displayed position, superseding any outstanding one
    fn search(&mut self, depth: NonZeroU32, purpose: Purpose) {
        self.drop_search();
        let request = SearchRequest::new(self.fen(), depth);
        let id = self.engine.request(&request);
        log::debug!("search {} ({:?}) depth {}", id, purpose, depth);
        self.outstanding = Some(Outstanding { id, purpose });
        self.evaluation = None;
        self.phase = Phase::AwaitingEngine;
    }

    /// Forget the outstanding search; any late answer will be discarded
    fn drop_search(&mut self) {
        if self.outstanding.take().is_some() {
            self.engine.cancel();
        }
    }

    /// Deliver one engine event
    pub fn handle_event(&mut self, event: SearchEvent) {
        let Some(outstanding) = self.outstanding else {
            log::debug!("discarding event for search {}: nothing outstanding", event.search);
            return;
        };
        if event.search != outstanding.id {
            log::debug!(
                "discarding stale event for search {} (current {})",
                event.search,
                outstanding.id
            );
            return;
        }

        match event.event {
            EngineEvent::ScoreUpdate { .. } | EngineEvent::MateUpdate { .. } => {
                self.evaluation = event.event.score();
            }
            EngineEvent::BestMove { mv } => {
                self.outstanding = None;
                match mv {
                    Some(mv) => self.on_best_move(outstanding.purpose, mv),
                    None => self.on_no_move(),
                }
            }
        }
    }

    fn on_best_move(&mut self, purpose: Purpose, mv: MoveRequest) {
        match purpose {
            Purpose::Reply => match rules::apply_move(self.record.displayed(), &mv) {
                Ok(applied) => {
                    log::debug!("engine played {}", applied.san);
                    self.record.push(applied);
                    self.after_change();
                }
                Err(e) => {
                    log::error!("engine and rules disagree: {}", e);
                    self.status = GameStatus::Aborted;
                    self.phase = Phase::Terminal;
                }
            },
            Purpose::PreAnalysis | Purpose::Annotate => {
                self.best_move = Some(mv);
                self.phase = Phase::AwaitingHuman;
            }
        }
    }

    /// The engine found no legal move in the searched position
    fn on_no_move(&mut self) {
        let status = self.record.status();
        if !status.is_terminal() {
            log::error!("engine reports no legal move in {}", self.fen());
        }
        self.status = if status.is_terminal() {
            status
        } else {
            GameStatus::Aborted
        };
        self.best_move = None;
        self.phase = Phase::Terminal;
    }

    /// Handle every event already waiting. Returns how many were delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.engine.try_next_event() {
            self.handle_event(event);
            delivered += 1;
        }
        delivered
    }

    /// Block until the outstanding search is answered or `timeout` passes.
    /// Returns false on timeout.
    pub fn wait_for_engine(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.outstanding.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.engine.next_event_timeout(remaining) {
                Some(event) => self.handle_event(event),
                None => return false,
            }
        }
        true
    }

    fn require_analysis(&self) -> Result<(), CoordinatorError> {
        match self.mode {
            Mode::AnalysisOnly { .. } => Ok(()),
            _ => Err(CoordinatorError::WrongMode("analysis")),
        }
    }

    /// Replace the record with an imported game. On error nothing changes.
    pub fn load_pgn(&mut self, text: &str) -> Result<(), CoordinatorError> {
        self.require_analysis()?;
        self.record = GameRecord::from_pgn(text)?;
        self.best_move = None;
        self.after_change();
        Ok(())
    }

    /// Show a ply (`None` = initial position). Returns false if out of range
    /// or already displayed.
    pub fn go_to(&mut self, cursor: Option<usize>) -> Result<bool, CoordinatorError> {
        self.require_analysis()?;
        if cursor == self.record.cursor() || !self.record.go_to(cursor) {
            return Ok(false);
        }
        self.best_move = None;
        self.after_change();
        Ok(true)
    }

    pub fn go_back(&mut self) -> Result<bool, CoordinatorError> {
        match self.record.previous_cursor() {
            Some(target) => self.go_to(target),
            None => self.require_analysis().map(|_| false),
        }
    }

    pub fn go_forward(&mut self) -> Result<bool, CoordinatorError> {
        match self.record.next_cursor() {
            Some(target) => self.go_to(Some(target)),
            None => self.require_analysis().map(|_| false),
        }
    }

    pub fn go_to_start(&mut self) -> Result<bool, CoordinatorError> {
        self.go_to(None)
    }

    pub fn go_to_end(&mut self) -> Result<bool, CoordinatorError> {
        self.go_to(self.record.end_cursor())
    }

    /// Release the engine
    pub fn close(&mut self) {
        self.outstanding = None;
        self.engine.close();
    }

    /// Display-ready copy of the current state
    pub fn snapshot(&self) -> Snapshot {
        let evaluation = match (self.evaluation, self.phase) {
            _ if !self.uses_engine() => None,
            (Some(score), _) => Some(score.to_string()),
            (None, Phase::AwaitingEngine) => Some("...".to_string()),
            (None, _) => None,
        };

        let puzzle = match &self.mode {
            Mode::PuzzlePlay(set) => Some(PuzzleView {
                id: set.current().id,
                index: set.index(),
                total: set.len(),
                status: self.puzzle_status,
                hint: set.current().hint.clone(),
            }),
            _ => None,
        };

        Snapshot {
            mode: self.mode.kind(),
            fen: self.fen(),
            side_to_move: rules::side_to_move(self.record.displayed()),
            phase: self.phase,
            status: self.status,
            status_text: self.status.status_text(),
            history: self.record.history(),
            cursor: self.record.cursor(),
            evaluation,
            best_move: self.best_move.map(|mv| mv.to_uci_string()),
            coach: self.coach_feedback().cloned(),
            puzzle,
        }
    }
}

fn title_case(color: PieceColor) -> &'static str {
    match color {
        PieceColor::White => "White",
        PieceColor::Black => "Black",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::puzzle::default_puzzles;
    use shakmaty::Square;
    use std::collections::VecDeque;

    /// Records requests and plays back events queued by the test
    #[derive(Default)]
    struct ScriptedEngine {
        requests: Vec<(SearchId, SearchRequest)>,
        cancels: usize,
        new_games: usize,
        closes: usize,
        queue: VecDeque<SearchEvent>,
        next_id: u64,
    }

    impl ScriptedEngine {
        fn last_id(&self) -> SearchId {
            self.requests.last().map(|(id, _)| *id).unwrap()
        }

        /// Queue an event answering the latest request
        fn answer(&mut self, event: EngineEvent) {
            let search = self.last_id();
            self.queue.push_back(SearchEvent { search, event });
        }

        fn best(&mut self, token: &str) {
            self.answer(EngineEvent::BestMove {
                mv: Some(token.parse().unwrap()),
            });
        }
    }

    impl SearchEngine for ScriptedEngine {
        fn request(&mut self, request: &SearchRequest) -> SearchId {
            let id = SearchId(self.next_id);
            self.next_id += 1;
            self.requests.push((id, request.clone()));
            id
        }

        fn cancel(&mut self) {
            self.cancels += 1;
        }

        fn new_game(&mut self) {
            self.new_games += 1;
        }

        fn close(&mut self) {
            self.closes += 1;
        }

        fn try_next_event(&mut self) -> Option<SearchEvent> {
            self.queue.pop_front()
        }

        fn next_event_timeout(&mut self, _timeout: Duration) -> Option<SearchEvent> {
            self.queue.pop_front()
        }
    }

    fn depth(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn mv(token: &str) -> MoveRequest {
        token.parse().unwrap()
    }

    fn bot(human: PieceColor) -> TurnCoordinator<ScriptedEngine> {
        TurnCoordinator::new(
            ScriptedEngine::default(),
            Mode::BotPlay {
                human,
                depth: depth(3),
            },
        )
        .unwrap()
    }

    fn coach() -> TurnCoordinator<ScriptedEngine> {
        TurnCoordinator::new(
            ScriptedEngine::default(),
            Mode::CoachPlay {
                human: PieceColor::White,
                analysis_depth: depth(10),
                reply_depth: depth(5),
            },
        )
        .unwrap()
    }

    fn puzzles() -> TurnCoordinator<ScriptedEngine> {
        let set = PuzzleSet::new(default_puzzles()).unwrap();
        TurnCoordinator::new(ScriptedEngine::default(), Mode::PuzzlePlay(set)).unwrap()
    }

    fn analysis() -> TurnCoordinator<ScriptedEngine> {
        TurnCoordinator::new(
            ScriptedEngine::default(),
            Mode::AnalysisOnly { depth: depth(12) },
        )
        .unwrap()
    }

    // Bot play

    #[test]
    fn test_bot_waits_for_white_human() {
        let game = bot(PieceColor::White);
        assert_eq!(game.phase(), Phase::AwaitingHuman);
        assert!(game.engine().requests.is_empty());
    }

    #[test]
    fn test_bot_single_request_after_human_move() {
        let mut game = bot(PieceColor::White);
        let outcome = game.submit_move(mv("e2e4")).unwrap();
        assert_eq!(outcome, MoveOutcome::Played { san: "e4".to_string() });

        assert_eq!(game.phase(), Phase::AwaitingEngine);
        assert_eq!(game.engine().requests.len(), 1);
        let (_, request) = &game.engine().requests[0];
        assert_eq!(
            request.fen,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(request.depth.get(), 3);

        // further human input is refused until the reply arrives
        assert!(matches!(
            game.submit_move(mv("d2d4")),
            Err(CoordinatorError::NotYourTurn)
        ));
        assert_eq!(game.engine().requests.len(), 1);
        assert_eq!(game.record().len(), 1);
    }

    #[test]
    fn test_bot_reply_is_applied() {
        let mut game = bot(PieceColor::White);
        game.submit_move(mv("e2e4")).unwrap();
        game.engine_mut().answer(EngineEvent::ScoreUpdate { centipawns: -20 });
        game.engine_mut().best("e7e5");
        assert_eq!(game.pump(), 2);

        assert_eq!(game.phase(), Phase::AwaitingHuman);
        assert_eq!(game.record().history(), vec!["e4", "e5"]);
        assert_eq!(game.evaluation(), Some(Score::Centipawns(-20)));
        assert_eq!(game.engine().requests.len(), 1);
    }

    #[test]
    fn test_bot_moves_first_for_black_human() {
        let game = bot(PieceColor::Black);
        assert_eq!(game.phase(), Phase::AwaitingEngine);
        assert_eq!(game.engine().requests.len(), 1);
        assert_eq!(game.engine().new_games, 1);
    }

    #[test]
    fn test_illegal_move_changes_nothing() {
        let mut game = bot(PieceColor::White);
        let before = game.snapshot();
        assert!(matches!(
            game.submit_move(mv("e2e5")),
            Err(CoordinatorError::Rejected(_))
        ));
        assert_eq!(game.snapshot(), before);
        assert!(game.engine().requests.is_empty());
    }

    #[test]
    fn test_stale_best_move_discarded() {
        let mut game = bot(PieceColor::Black);
        let stale = game.engine().last_id();
        game.new_game().unwrap();
        assert_eq!(game.engine().cancels, 1);
        assert_eq!(game.engine().requests.len(), 2);

        // answer to the superseded search
        game.handle_event(SearchEvent {
            search: stale,
            event: EngineEvent::BestMove { mv: Some(mv("e2e4")) },
        });
        assert!(game.record().is_empty());
        assert_eq!(game.phase(), Phase::AwaitingEngine);

        game.engine_mut().best("d2d4");
        game.pump();
        assert_eq!(game.record().history(), vec!["d4"]);
        assert_eq!(game.phase(), Phase::AwaitingHuman);
    }

    #[test]
    fn test_engine_move_rejected_aborts() {
        let mut game = bot(PieceColor::White);
        game.submit_move(mv("e2e4")).unwrap();
        game.engine_mut().best("e2e4");
        game.pump();
        assert_eq!(game.status(), GameStatus::Aborted);
        assert_eq!(game.phase(), Phase::Terminal);
        assert_eq!(game.record().len(), 1);
    }

    #[test]
    fn test_checkmate_is_terminal_until_reset() {
        let mut game = bot(PieceColor::White);
        // fool's mate with colors swapped: white plays, engine mates as black
        game.submit_move(mv("f2f3")).unwrap();
        game.engine_mut().best("e7e5");
        game.pump();
        game.submit_move(mv("g2g4")).unwrap();
        game.engine_mut().best("d8h4");
        game.pump();

        assert_eq!(
            game.status(),
            GameStatus::Checkmate {
                winner: PieceColor::Black
            }
        );
        assert_eq!(game.phase(), Phase::Terminal);
        assert_eq!(game.snapshot().status_text, "Checkmate!");
        let requests = game.engine().requests.len();
        assert!(matches!(
            game.submit_move(mv("a2a3")),
            Err(CoordinatorError::GameOver)
        ));
        assert_eq!(game.engine().requests.len(), requests);

        game.new_game().unwrap();
        assert_eq!(game.phase(), Phase::AwaitingHuman);
        assert_eq!(game.status(), GameStatus::Ongoing);
        assert!(game.record().is_empty());
        assert!(game.submit_move(mv("e2e4")).is_ok());
    }

    #[test]
    fn test_best_move_none_is_terminal() {
        let mut game = bot(PieceColor::White);
        game.submit_move(mv("e2e4")).unwrap();
        game.engine_mut().answer(EngineEvent::BestMove { mv: None });
        game.pump();
        assert_eq!(game.phase(), Phase::Terminal);
        // the rules still think the game is on, so the engine is not trusted
        assert_eq!(game.status(), GameStatus::Aborted);
    }

    // Coach play

    #[test]
    fn test_coach_pre_analyzes_before_first_move() {
        let game = coach();
        assert_eq!(game.phase(), Phase::AwaitingEngine);
        let (_, request) = &game.engine().requests[0];
        assert_eq!(request.depth.get(), 10);
        assert_eq!(
            game.coach_feedback().unwrap().message,
            "I'm watching your moves. Play White."
        );
    }

    #[test]
    fn test_coach_grades_best_move_ignoring_promotion() {
        let mut game = coach();
        game.engine_mut().best("e2e4");
        game.pump();
        assert_eq!(game.phase(), Phase::AwaitingHuman);
        assert_eq!(game.best_move(), Some(mv("e2e4")));

        // a stray promotion letter does not change the grade
        let request = MoveRequest::new(Square::E2, Square::E4)
            .with_promotion(crate::domain::chess::Promotion::Rook);
        game.submit_move(request).unwrap();

        let feedback = game.coach_feedback().unwrap();
        assert_eq!(feedback.grade, Some(Grade::Best));
        assert_eq!(feedback.message, "Excellent! That's the best move.");
        assert_eq!(feedback.color, BEST_COLOR);
    }

    #[test]
    fn test_coach_grades_inaccuracy() {
        let mut game = coach();
        game.engine_mut().best("e2e4");
        game.pump();
        game.submit_move(mv("d2d4")).unwrap();

        let feedback = game.coach_feedback().unwrap();
        assert_eq!(feedback.grade, Some(Grade::Inaccuracy));
        assert!(feedback.message.contains("e2e4"));
        assert_eq!(feedback.color, INACCURACY_COLOR);
    }

    #[test]
    fn test_coach_reply_then_new_pre_analysis() {
        let mut game = coach();
        game.engine_mut().best("e2e4");
        game.pump();
        game.submit_move(mv("e2e4")).unwrap();

        // opponent's turn: reply search at the reply depth
        assert_eq!(game.phase(), Phase::AwaitingEngine);
        assert_eq!(game.engine().requests[1].1.depth.get(), 5);
        assert_eq!(game.best_move(), None);

        game.engine_mut().best("c7c5");
        game.pump();
        assert_eq!(game.record().history(), vec!["e4", "c5"]);

        // back on the human's turn: pre-analysis again
        assert_eq!(game.phase(), Phase::AwaitingEngine);
        assert_eq!(game.engine().requests[2].1.depth.get(), 10);
    }

    #[test]
    fn test_coach_reset_message() {
        let mut game = coach();
        game.new_game().unwrap();
        let feedback = game.coach_feedback().unwrap();
        assert_eq!(feedback.message, "New Game. Show me what you got.");
        assert_eq!(feedback.grade, None);
    }

    // Puzzles

    #[test]
    fn test_puzzle_correct_solution() {
        let mut game = puzzles();
        let before = game.fen();
        let outcome = game.submit_move(mv("h5f7")).unwrap();
        assert_eq!(outcome, MoveOutcome::Solved { san: "Qxf7#".to_string() });
        assert_eq!(game.puzzle_status(), PuzzleStatus::Correct);
        assert_eq!(game.phase(), Phase::Terminal);
        assert_ne!(game.fen(), before);
        assert!(game.engine().requests.is_empty());
        assert_eq!(game.engine().new_games, 0);
    }

    #[test]
    fn test_puzzle_wrong_move_not_committed() {
        let mut game = puzzles();
        let before = game.fen();
        let outcome = game.submit_move(mv("g1f3")).unwrap();
        assert_eq!(outcome, MoveOutcome::Wrong { san: "Nf3".to_string() });
        assert_eq!(game.puzzle_status(), PuzzleStatus::Wrong);
        assert_eq!(game.fen(), before);
        assert!(game.record().is_empty());
        assert_eq!(game.phase(), Phase::AwaitingHuman);

        // another try is allowed
        game.submit_move(mv("h5f7")).unwrap();
        assert_eq!(game.puzzle_status(), PuzzleStatus::Correct);
        assert!(game.engine().requests.is_empty());
    }

    #[test]
    fn test_puzzle_retry_and_next() {
        let mut game = puzzles();
        game.submit_move(mv("h5f7")).unwrap();
        game.retry().unwrap();
        assert_eq!(game.puzzle_status(), PuzzleStatus::Solving);
        assert!(game.record().is_empty());

        assert!(!game.next_puzzle().unwrap());
        assert_eq!(game.current_puzzle().unwrap().solution_san, "Re8#");
        assert_eq!(game.fen(), "6k1/5ppp/8/8/8/8/5PPP/4R1K1 w - - 0 1");

        let view = game.snapshot().puzzle.unwrap();
        assert_eq!(view.index, 1);
        assert_eq!(view.total, 4);
        assert_eq!(game.snapshot().evaluation, None);
    }

    #[test]
    fn test_puzzle_ops_need_puzzle_mode() {
        let mut game = bot(PieceColor::White);
        assert!(matches!(game.retry(), Err(CoordinatorError::WrongMode(_))));
        assert!(matches!(game.next_puzzle(), Err(CoordinatorError::WrongMode(_))));
    }

    // Analysis

    #[test]
    fn test_analysis_annotates_start_position() {
        let mut game = analysis();
        assert_eq!(game.phase(), Phase::AwaitingEngine);
        assert_eq!(game.snapshot().evaluation.as_deref(), Some("..."));

        game.engine_mut().answer(EngineEvent::ScoreUpdate { centipawns: 35 });
        game.engine_mut().best("e2e4");
        game.pump();

        let snap = game.snapshot();
        assert_eq!(snap.evaluation.as_deref(), Some("+0.35"));
        assert_eq!(snap.best_move.as_deref(), Some("e2e4"));
        assert!(game.record().is_empty());
        assert_eq!(game.phase(), Phase::AwaitingHuman);
    }

    #[test]
    fn test_analysis_rejects_moves() {
        let mut game = analysis();
        assert!(matches!(
            game.submit_move(mv("e2e4")),
            Err(CoordinatorError::AnalysisOnly)
        ));
    }

    #[test]
    fn test_analysis_navigation_requests_each_ply() {
        let mut game = analysis();
        game.load_pgn("1. e4 e5 2. Nf3 Nc6").unwrap();
        assert_eq!(game.record().cursor(), Some(3));
        let after_load = game.engine().requests.len();

        assert!(game.go_back().unwrap());
        assert_eq!(game.engine().requests.len(), after_load + 1);
        assert_eq!(
            game.engine().requests.last().unwrap().1.fen,
            rules::fen_of(game.record().displayed())
        );

        // same ply: nothing new
        assert!(!game.go_to(Some(2)).unwrap());
        assert_eq!(game.engine().requests.len(), after_load + 1);

        assert!(game.go_to_start().unwrap());
        assert_eq!(game.record().cursor(), None);
        assert!(!game.go_back().unwrap());
        assert!(game.go_forward().unwrap());
        assert_eq!(game.record().cursor(), Some(0));
        assert!(game.go_to_end().unwrap());
        assert_eq!(game.record().cursor(), Some(3));
        assert!(!game.go_forward().unwrap());
        assert_eq!(game.engine().requests.len(), after_load + 4);
    }

    #[test]
    fn test_analysis_stale_annotation_dropped() {
        let mut game = analysis();
        game.load_pgn("1. d4 d5").unwrap();
        game.engine_mut().best("c2c4");
        game.go_back().unwrap();
        // the queued answer belongs to the position before navigation
        game.pump();
        assert_eq!(game.best_move(), None);
        assert_eq!(game.phase(), Phase::AwaitingEngine);
    }

    #[test]
    fn test_analysis_bad_pgn_keeps_state() {
        let mut game = analysis();
        game.load_pgn("1. e4 e5").unwrap();
        let requests = game.engine().requests.len();
        assert!(matches!(
            game.load_pgn("1. e4 Ke7 2. Qh5 Qxh5"),
            Err(CoordinatorError::Record(_))
        ));
        assert_eq!(game.record().history(), vec!["e4", "e5"]);
        assert_eq!(game.engine().requests.len(), requests);
    }

    #[test]
    fn test_analysis_terminal_ply_not_searched() {
        let mut game = analysis();
        game.load_pgn("1. f3 e5 2. g4 Qh4#").unwrap();
        let requests = game.engine().requests.len();
        assert_eq!(game.phase(), Phase::Terminal);
        assert_eq!(game.snapshot().status_text, "Checkmate!");

        game.go_back().unwrap();
        assert_eq!(game.phase(), Phase::AwaitingEngine);
        assert_eq!(game.engine().requests.len(), requests + 1);
    }

    #[test]
    fn test_navigation_needs_analysis_mode() {
        let mut game = bot(PieceColor::White);
        assert!(matches!(game.go_back(), Err(CoordinatorError::WrongMode(_))));
        assert!(matches!(
            game.load_pgn("1. e4"),
            Err(CoordinatorError::WrongMode(_))
        ));
    }

    #[test]
    fn test_wait_for_engine() {
        let mut game = bot(PieceColor::White);
        game.submit_move(mv("e2e4")).unwrap();
        assert!(!game.wait_for_engine(Duration::from_millis(1)));
        game.engine_mut().best("e7e5");
        assert!(game.wait_for_engine(Duration::from_millis(1)));
        assert_eq!(game.phase(), Phase::AwaitingHuman);
    }

    #[test]
    fn test_close_reaches_engine() {
        let mut game = bot(PieceColor::White);
        game.close();
        assert_eq!(game.engine().closes, 1);
    }
}
