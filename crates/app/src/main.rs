use std::fmt;
use std::sync::Arc;

use kit_core::model::{ExerciseId, KitId};
use kit_core::progression::{ExerciseCard, ModalityFilter};
use services::{KitBoard, KitBoardService};
use storage::JsonCatalog;
use storage::repository::Storage;
use tracing::info;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidKitId { raw: String },
    InvalidExerciseId { raw: String },
    InvalidFilter { raw: String },
    InvalidDbUrl { raw: String },
    MissingExercise { command: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidKitId { raw } => write!(f, "invalid --kit-id value: {raw}"),
            ArgsError::InvalidExerciseId { raw } => {
                write!(f, "invalid --exercise-id value: {raw}")
            }
            ArgsError::InvalidFilter { raw } => write!(f, "invalid --filter value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingExercise { command } => {
                write!(f, "{command} requires --exercise-id")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

const DEFAULT_DB_URL: &str = "sqlite:kit_progress.sqlite3";
const DEFAULT_CATALOG: &str = "demos/kit_catalog.json";

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- board    [--db <sqlite_url>] [--catalog <path>] [--kit-id <id>] [--filter <all|1|2|3|slug>]");
    eprintln!("  cargo run -p app -- play     [--db <sqlite_url>] [--catalog <path>] [--kit-id <id>] --exercise-id <id>");
    eprintln!("  cargo run -p app -- complete [--db <sqlite_url>] [--catalog <path>] [--kit-id <id>] --exercise-id <id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --catalog {DEFAULT_CATALOG}");
    eprintln!("  --kit-id 1");
    eprintln!("  --filter all");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  KIT_DB_URL, KIT_CATALOG, KIT_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Board,
    Play,
    Complete,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "board" => Some(Self::Board),
            "play" => Some(Self::Play),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Play => "play",
            Self::Complete => "complete",
        }
    }
}

struct Args {
    db_url: String,
    catalog: String,
    kit_id: KitId,
    exercise_id: Option<ExerciseId>,
    filter: ModalityFilter,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = normalize_sqlite_url(
            std::env::var("KIT_DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.into()),
        );
        let mut catalog = std::env::var("KIT_CATALOG").unwrap_or_else(|_| DEFAULT_CATALOG.into());
        let mut kit_id = std::env::var("KIT_ID")
            .ok()
            .and_then(|value| value.parse::<KitId>().ok())
            .unwrap_or(KitId::new(1));
        let mut exercise_id = None;
        let mut filter = ModalityFilter::All;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--catalog" => {
                    catalog = require_value(args, "--catalog")?;
                }
                "--kit-id" => {
                    let value = require_value(args, "--kit-id")?;
                    kit_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidKitId { raw: value.clone() })?;
                }
                "--exercise-id" => {
                    let value = require_value(args, "--exercise-id")?;
                    let parsed = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidExerciseId { raw: value.clone() })?;
                    exercise_id = Some(parsed);
                }
                "--filter" => {
                    let value = require_value(args, "--filter")?;
                    filter = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidFilter { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            catalog,
            kit_id,
            exercise_id,
            filter,
        })
    }

    fn exercise(&self, command: Command) -> Result<ExerciseId, ArgsError> {
        self.exercise_id.ok_or(ArgsError::MissingExercise {
            command: command.name(),
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_board(board: &KitBoard) {
    let kit = board.kit();
    let counts = board.counts();
    let summary = board.report().summary();
    println!("{} (kit {})", kit.name(), kit.id());
    println!(
        "  {}/{} completed ({}%)",
        summary.completed,
        summary.visible,
        summary.percent()
    );
    println!(
        "  all: {}  reading: {}  writing: {}  visual: {}",
        counts.total, counts.reading, counts.writing, counts.visual
    );
    println!("  filter: {}", board.filter());
    println!();
    for card in board.cards() {
        println!("{}", card_line(&card));
    }
    match board.report().next_playable() {
        Some(next) => println!("\nnext: exercise {next}"),
        None => println!("\nnext: nothing left to play"),
    }
}

fn card_line(card: &ExerciseCard<'_>) -> String {
    let status = if card.completed {
        "done"
    } else if card.locked {
        "locked"
    } else {
        "open"
    };
    let total = card
        .total
        .map_or_else(|| "?".to_string(), |total| total.to_string());
    let modality = card.modality.map_or("-", |m| m.label());
    format!(
        "  [{status:>6}] {:>5}  {:<32} {modality:<10} {}/{total}",
        card.id(),
        card.exercise.title(),
        card.done
    )
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: show the board when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Board,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Board,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let catalog = Arc::new(JsonCatalog::load(&parsed.catalog)?);
    let storage = Storage::sqlite(&parsed.db_url, catalog.clone(), catalog).await?;
    info!(db = %parsed.db_url, catalog = %parsed.catalog, kit = %parsed.kit_id, "storage ready");

    let service = KitBoardService::from_storage(&storage);
    let mut board = service.open(parsed.kit_id).await?;
    board.set_filter(parsed.filter);

    match cmd {
        Command::Board => {
            print_board(&board);
            Ok(())
        }
        Command::Play => {
            let exercise = parsed.exercise(cmd)?;
            let Some(manifest) = board.activate(exercise) else {
                eprintln!("exercise {exercise} is locked, hidden or not part of this kit");
                return Ok(());
            };
            match manifest.runner() {
                Some(runner) => println!("runner: {runner}"),
                None => println!("runner: unknown modality"),
            }
            for (key, value) in manifest.to_params() {
                println!("{key}={value}");
            }
            Ok(())
        }
        Command::Complete => {
            let exercise = parsed.exercise(cmd)?;
            if board.activate(exercise).is_none() {
                eprintln!("exercise {exercise} is locked, hidden or not part of this kit");
                return Ok(());
            }
            let Some(done) = board.record_completion(exercise).await else {
                return Ok(());
            };
            board.sync_corrections().await;
            println!("exercise {exercise}: {done} reactivos completed");
            print_board(&board);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
