use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use chess_trainer::config::AppConfig;
use chess_trainer::domain::{MoveRequest, PieceColor, PuzzleSet};
use chess_trainer::models::{EngineSession, Mode, MoveOutcome, Phase, Snapshot, TurnCoordinator};

/// Longest we wait for one engine answer before giving the prompt back
const ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "chess-trainer", about = "Play, train and analyze against a UCI engine")]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine executable, overriding the config
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Print each state as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the bot roster
    Bots,
    /// Play a bot
    Play {
        /// Bot id from the roster
        #[arg(long, default_value = "martin")]
        bot: String,
        #[arg(long, value_enum, default_value_t = ColorArg::White)]
        color: ColorArg,
    },
    /// Play the coach, who grades every move
    Coach {
        /// Overrides the configured color
        #[arg(long, value_enum)]
        color: Option<ColorArg>,
    },
    /// Solve puzzles
    Puzzle {
        /// 1-based puzzle number to start at
        #[arg(long, default_value_t = 1)]
        start: usize,
    },
    /// Step through a game with engine annotations
    Analyze {
        /// PGN file to load
        #[arg(long)]
        pgn: Option<PathBuf>,
    },
    /// Print the JSON schema of the config file
    ConfigSchema,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorArg {
    White,
    Black,
}

impl From<ColorArg> for PieceColor {
    fn from(color: ColorArg) -> Self {
        match color {
            ColorArg::White => PieceColor::White,
            ColorArg::Black => PieceColor::Black,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(engine) = args.engine {
        config.engine.path = engine;
    }

    let mode = match &args.command {
        Command::Bots => {
            for bot in &config.bots {
                println!(
                    "{:<12} {:<12} {:>5}  depth {:>2}  {:?}  {}",
                    bot.id, bot.name, bot.elo, bot.depth, bot.tier, bot.description
                );
            }
            return Ok(());
        }
        Command::ConfigSchema => {
            let schema = schemars::schema_for!(AppConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        Command::Play { bot, color } => {
            if config.bot(bot).is_none() {
                log::warn!(
                    "unknown bot {}, using depth {}",
                    bot,
                    config.default_bot_depth
                );
            }
            Mode::BotPlay {
                human: (*color).into(),
                depth: config.bot_depth(bot),
            }
        }
        Command::Coach { color } => Mode::CoachPlay {
            human: color.map_or(config.coach.human, PieceColor::from),
            analysis_depth: config.coach.analysis_depth,
            reply_depth: config.coach.reply_depth,
        },
        Command::Puzzle { start } => {
            let Some(mut set) = PuzzleSet::new(config.puzzles.clone()) else {
                bail!("no puzzles configured");
            };
            if !set.select(start.saturating_sub(1)) {
                bail!("puzzle {} does not exist ({} loaded)", start, set.len());
            }
            Mode::PuzzlePlay(set)
        }
        Command::Analyze { .. } => Mode::AnalysisOnly {
            depth: config.analysis.depth,
        },
    };

    let pgn = match &args.command {
        Command::Analyze { pgn: Some(path) } => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        _ => None,
    };

    let engine = EngineSession::open(&config.engine).context("failed to start the engine")?;
    let mut game = TurnCoordinator::new(engine, mode)?;
    if let Some(text) = pgn {
        game.load_pgn(&text).context("failed to load PGN")?;
    }

    let result = run(&mut game, args.json);
    game.close();
    result
}

/// Read commands from stdin until EOF or `quit`
fn run(game: &mut TurnCoordinator<EngineSession>, json: bool) -> Result<()> {
    settle(game);
    print_state(&game.snapshot(), json)?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            continue;
        };

        let outcome = match word {
            "quit" | "exit" => break,
            "help" => {
                print_help();
                continue;
            }
            "show" => Ok(()),
            "new" => game.new_game(),
            "retry" => game.retry(),
            "next" => game.next_puzzle().map(|wrapped| {
                if wrapped {
                    println!("All puzzles done, starting over.");
                }
            }),
            "back" => game.go_back().map(drop),
            "forward" => game.go_forward().map(drop),
            "start" => game.go_to_start().map(drop),
            "end" => game.go_to_end().map(drop),
            "goto" => match words.next().and_then(|n| n.parse::<usize>().ok()) {
                // plies are numbered from 1; 0 is the initial position
                Some(0) => game.go_to(None).map(drop),
                Some(n) => game.go_to(Some(n - 1)).map(drop),
                None => {
                    println!("usage: goto <ply>");
                    continue;
                }
            },
            token => match token.parse::<MoveRequest>() {
                Ok(request) => game.submit_move(request).map(|outcome| match outcome {
                    MoveOutcome::Played { .. } => {}
                    MoveOutcome::Solved { san } => println!("{} - correct!", san),
                    MoveOutcome::Wrong { san } => println!("{} - not the answer, try again", san),
                }),
                Err(e) => {
                    println!("{} (type help for commands)", e);
                    continue;
                }
            },
        };

        if let Err(e) = outcome {
            println!("{}", e);
            continue;
        }

        settle(game);
        print_state(&game.snapshot(), json)?;
    }
    Ok(())
}

/// Let the engine finish whatever the coordinator asked of it
fn settle(game: &mut TurnCoordinator<EngineSession>) {
    game.pump();
    if game.phase() == Phase::AwaitingEngine && !game.wait_for_engine(ENGINE_TIMEOUT) {
        log::warn!("engine did not answer within {:?}", ENGINE_TIMEOUT);
    }
}

fn print_state(snapshot: &Snapshot, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string(snapshot)?)?;
        return Ok(());
    }

    writeln!(out, "{}", snapshot.fen)?;
    if !snapshot.history.is_empty() {
        writeln!(out, "{}", snapshot.move_list())?;
    }
    if let Some(eval) = &snapshot.evaluation {
        match &snapshot.best_move {
            Some(best) => writeln!(out, "eval {}  best {}", eval, best)?,
            None => writeln!(out, "eval {}", eval)?,
        }
    }
    if let Some(coach) = &snapshot.coach {
        writeln!(out, "coach: {}", coach.message)?;
    }
    if let Some(puzzle) = &snapshot.puzzle {
        writeln!(
            out,
            "puzzle {}/{} ({:?}): {}",
            puzzle.index + 1,
            puzzle.total,
            puzzle.status,
            puzzle.hint
        )?;
    }
    if !snapshot.status_text.is_empty() {
        writeln!(out, "{}", snapshot.status_text)?;
    } else if snapshot.phase == Phase::AwaitingHuman {
        writeln!(out, "{} to move", snapshot.side_to_move)?;
    }
    out.flush()?;
    Ok(())
}

fn print_help() {
    println!("moves:      e2e4, e7e8q");
    println!("game:       new, retry, next, show, quit");
    println!("analysis:   back, forward, start, end, goto <ply>");
}
