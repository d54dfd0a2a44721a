//! Engine session - manages one UCI engine process and its searches.
//!
//! Architecture:
//! - Engine I/O runs on OS threads (reader/writer)
//! - The reader thread parses stdout lines and forwards events over a channel
//! - The owning thread drains the channel; that is where each event is tagged
//!   with the search it answers and its score is turned to white's view

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::EngineConfig;
use crate::domain::chess::PieceColor;
use crate::domain::uci::{self, EngineEvent, UciCommand, UciOutputKind};

/// Session-local sequence number of a search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SearchId(pub u64);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One analysis request: a position and a depth limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub fen: String,
    pub depth: NonZeroU32,
}

impl SearchRequest {
    pub fn new(fen: impl Into<String>, depth: NonZeroU32) -> Self {
        Self {
            fen: fen.into(),
            depth,
        }
    }

    /// Side to move, read from the second FEN field
    pub fn side_to_move(&self) -> PieceColor {
        match self.fen.split_whitespace().nth(1) {
            Some("b") => PieceColor::Black,
            _ => PieceColor::White,
        }
    }
}

/// An engine event tagged with the search it belongs to.
/// Scores are from white's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchEvent {
    pub search: SearchId,
    pub event: EngineEvent,
}

/// The seam between the turn coordinator and whatever runs the searches
pub trait SearchEngine {
    /// Start searching a position. Results arrive later as [`SearchEvent`]s.
    fn request(&mut self, request: &SearchRequest) -> SearchId;

    /// Ask the engine to stop; a best move for the stopped search may still arrive
    fn cancel(&mut self);

    /// Tell the engine the next positions belong to a new game
    fn new_game(&mut self);

    /// Release the engine. Calling it again has no effect.
    fn close(&mut self);

    /// Next event if one is already available
    fn try_next_event(&mut self) -> Option<SearchEvent>;

    /// Block for up to `timeout` waiting for the next event
    fn next_event_timeout(&mut self, timeout: Duration) -> Option<SearchEvent>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start engine {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine process has no {0}")]
    MissingPipe(&'static str),
}

/// Messages sent from the reader thread to the session
#[derive(Debug)]
enum ReaderMessage {
    Event(EngineEvent),
    Exited,
    Error(String),
}

/// A live connection to one UCI engine process
pub struct EngineSession {
    closed: bool,
    /// False once the reader saw the process go away
    transport_alive: bool,
    event_receiver: Option<Receiver<ReaderMessage>>,
    command_sender: Option<Sender<String>>,
    process: Option<Child>,
    /// Searches sent but not yet answered by a best move, oldest first
    pending: VecDeque<(SearchId, PieceColor)>,
    next_id: u64,
}

impl EngineSession {
    /// Spawn the engine and perform the UCI handshake
    pub fn open(config: &EngineConfig) -> Result<Self, SessionError> {
        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SessionError::Spawn {
                path: config.path.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SessionError::MissingPipe("stdin/stdout"));
        };

        let (event_tx, event_rx) = mpsc::channel::<ReaderMessage>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<String>();

        // Reader thread: blocking line reads, parsed here so only events cross the channel
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(text) => {
                        log::trace!("<< {}", text);
                        match UciOutputKind::categorize(&text) {
                            UciOutputKind::UciOk => log::debug!("engine acknowledged uci"),
                            UciOutputKind::ReadyOk => log::debug!("engine ready"),
                            _ => {}
                        }
                        let Some(event) = uci::parse(&text) else {
                            continue;
                        };
                        if event_tx.send(ReaderMessage::Event(event)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = event_tx.send(ReaderMessage::Error(e.to_string()));
                        break;
                    }
                }
            }
            let _ = event_tx.send(ReaderMessage::Exited);
        });

        // Writer thread: blocking writes, one command per line
        thread::spawn(move || {
            let mut writer = stdin;
            while let Ok(cmd) = cmd_rx.recv() {
                if writeln!(writer, "{}", cmd).is_err() {
                    break;
                }
                if writer.flush().is_err() {
                    break;
                }
            }
        });

        let session = Self {
            closed: false,
            transport_alive: true,
            event_receiver: Some(event_rx),
            command_sender: Some(cmd_tx),
            process: Some(child),
            pending: VecDeque::new(),
            next_id: 1,
        };

        session.send_command(UciCommand::Uci);
        for (name, value) in &config.options {
            session.send_command(UciCommand::SetOption {
                name: name.clone(),
                value: value.clone(),
            });
        }
        session.send_command(UciCommand::IsReady);

        log::info!("started engine {}", config.path.display());
        Ok(session)
    }

    /// Whether `close` has not been called yet
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Whether the engine process is still believed to be running
    pub fn is_alive(&self) -> bool {
        !self.closed && self.transport_alive
    }

    /// Number of searches still waiting for a best move
    pub fn pending_searches(&self) -> usize {
        self.pending.len()
    }

    /// Send a UCI command to the engine
    fn send_command(&self, cmd: UciCommand) {
        let cmd_str = cmd.to_uci_string();
        log::debug!(">> {}", cmd_str);
        if let Some(tx) = &self.command_sender {
            if tx.send(cmd_str).is_err() {
                log::debug!("engine writer is gone, command dropped");
            }
        }
    }

    /// Turn a reader message into a tagged event, updating the pending queue
    fn tag(&mut self, message: ReaderMessage) -> Option<SearchEvent> {
        match message {
            ReaderMessage::Event(event @ EngineEvent::BestMove { .. }) => {
                let Some((search, _)) = self.pending.pop_front() else {
                    log::debug!("ignoring best move with no search pending");
                    return None;
                };
                Some(SearchEvent { search, event })
            }
            ReaderMessage::Event(event) => {
                let &(search, side) = self.pending.front()?;
                Some(SearchEvent {
                    search,
                    event: event.from_white_view(side),
                })
            }
            ReaderMessage::Exited => {
                log::warn!("engine process exited");
                self.transport_alive = false;
                self.pending.clear();
                None
            }
            ReaderMessage::Error(e) => {
                log::warn!("error reading engine output: {}", e);
                None
            }
        }
    }
}

impl SearchEngine for EngineSession {
    fn request(&mut self, request: &SearchRequest) -> SearchId {
        let id = SearchId(self.next_id);
        self.next_id += 1;

        if self.closed {
            log::warn!("search {} requested on a closed engine session", id);
            return id;
        }

        // UCI leaves "go" during a running search undefined
        if !self.pending.is_empty() {
            self.send_command(UciCommand::Stop);
        }

        self.send_command(UciCommand::Position {
            fen: request.fen.clone(),
        });
        self.send_command(UciCommand::GoDepth(request.depth));
        self.pending.push_back((id, request.side_to_move()));
        id
    }

    fn cancel(&mut self) {
        if self.closed || self.pending.is_empty() {
            return;
        }
        self.send_command(UciCommand::Stop);
    }

    fn new_game(&mut self) {
        if self.closed {
            return;
        }
        self.send_command(UciCommand::UciNewGame);
        self.send_command(UciCommand::IsReady);
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.pending.is_empty() {
            self.send_command(UciCommand::Stop);
        }
        self.send_command(UciCommand::Quit);

        // Dropping the sender ends the writer thread once it has drained
        self.command_sender = None;
        self.event_receiver = None;
        self.pending.clear();

        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }

        log::info!("engine stopped");
    }

    fn try_next_event(&mut self) -> Option<SearchEvent> {
        loop {
            let message = match self.event_receiver.as_ref()?.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            };
            if let Some(event) = self.tag(message) {
                return Some(event);
            }
        }
    }

    fn next_event_timeout(&mut self, timeout: Duration) -> Option<SearchEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = match self.event_receiver.as_ref()?.recv_timeout(remaining) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            };
            if let Some(event) = self.tag(message) {
                return Some(event);
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn test_side_to_move_from_fen() {
        let white = SearchRequest::new(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            depth(5),
        );
        let black = SearchRequest::new(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            depth(5),
        );
        assert_eq!(white.side_to_move(), PieceColor::White);
        assert_eq!(black.side_to_move(), PieceColor::Black);
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let config = EngineConfig {
            path: PathBuf::from("/nonexistent/engine/binary"),
            ..EngineConfig::default()
        };
        let err = EngineSession::open(&config).err().unwrap();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }

    fn detached_session() -> EngineSession {
        EngineSession {
            closed: false,
            transport_alive: true,
            event_receiver: None,
            command_sender: None,
            process: None,
            pending: VecDeque::new(),
            next_id: 1,
        }
    }

    #[test]
    fn test_tagging_follows_pending_queue() {
        let mut session = detached_session();
        let first = session.request(&SearchRequest::new("8/8/8/8/8/8/8/8 b - - 0 1", depth(3)));
        let second = session.request(&SearchRequest::new("8/8/8/8/8/8/8/8 w - - 0 1", depth(3)));
        assert!(first < second);
        assert_eq!(session.pending_searches(), 2);

        // info lines belong to the oldest unanswered search, seen from white
        let info = session.tag(ReaderMessage::Event(EngineEvent::ScoreUpdate { centipawns: 30 }));
        assert_eq!(
            info,
            Some(SearchEvent {
                search: first,
                event: EngineEvent::ScoreUpdate { centipawns: -30 },
            })
        );

        let best = session.tag(ReaderMessage::Event(EngineEvent::BestMove { mv: None }));
        assert_eq!(best.map(|e| e.search), Some(first));

        let best = session.tag(ReaderMessage::Event(EngineEvent::BestMove { mv: None }));
        assert_eq!(best.map(|e| e.search), Some(second));

        // nothing left to answer
        let best = session.tag(ReaderMessage::Event(EngineEvent::BestMove { mv: None }));
        assert_eq!(best, None);
    }

    #[test]
    fn test_extreme_score_with_black_to_move() {
        let mut session = detached_session();
        let id = session.request(&SearchRequest::new("8/8/8/8/8/8/8/8 b - - 0 1", depth(1)));
        let event = uci::parse("info depth 1 score cp -2147483648").unwrap();
        assert_eq!(
            session.tag(ReaderMessage::Event(event)),
            Some(SearchEvent {
                search: id,
                event: EngineEvent::ScoreUpdate { centipawns: i32::MAX },
            })
        );
    }

    #[test]
    fn test_exit_clears_pending() {
        let mut session = detached_session();
        session.request(&SearchRequest::new("8/8/8/8/8/8/8/8 w - - 0 1", depth(3)));
        assert_eq!(session.tag(ReaderMessage::Exited), None);
        assert!(!session.is_alive());
        assert_eq!(session.pending_searches(), 0);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut session = detached_session();
        session.close();
        assert!(!session.is_open());
        session.close();
        assert!(!session.is_open());
        assert_eq!(session.try_next_event(), None);
    }
}
