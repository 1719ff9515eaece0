use std::fmt;
use std::sync::Arc;

use proctor_core::model::TestId;
use proctor_core::violation::DimensionDelta;
use services::{
    BroadcastPlatform, Clock, ExamWorkflowService, LiveSession, SessionOutcome, SessionUpdate,
    SubmissionService,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod console;

use console::{ConsoleAction, HELP, parse_line, render_snapshot, render_update};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidThreshold { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidThreshold { raw } => {
                write!(f, "invalid --devtools-threshold value: {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

struct Args {
    db_url: String,
    test_id: TestId,
    /// `0` disables the devtools heuristic.
    devtools_threshold: u32,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take    [--db <sqlite_url>] [--test-id <id>] [--devtools-threshold <px>]");
    eprintln!("  cargo run -p app -- tests   [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--test-id <id>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://proctor.sqlite3");
    eprintln!("  --test-id 1");
    eprintln!("  --devtools-threshold 160   (0 disables detection)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PROCTOR_DB_URL, PROCTOR_TEST_ID, PROCTOR_DEVTOOLS_THRESHOLD, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Tests,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "tests" => Some(Self::Tests),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PROCTOR_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://proctor.sqlite3".into(), normalize_sqlite_url);
        let mut test_id = std::env::var("PROCTOR_TEST_ID")
            .ok()
            .and_then(|value| value.parse::<TestId>().ok())
            .unwrap_or_else(|| TestId::new(1));
        let mut devtools_threshold = std::env::var("PROCTOR_DEVTOOLS_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(DimensionDelta::default().threshold_px);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--test-id" => {
                    let value = require_value(args, "--test-id")?;
                    test_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidTestId { raw: value.clone() })?;
                }
                "--devtools-threshold" => {
                    let value = require_value(args, "--devtools-threshold")?;
                    devtools_threshold = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidThreshold { raw: value.clone() })?;
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
            test_id,
            devtools_threshold,
        })
    }

    fn devtools(&self) -> Option<DimensionDelta> {
        (self.devtools_threshold > 0).then(|| DimensionDelta::with_threshold(self.devtools_threshold))
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

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run one proctored attempt against stdin until it is submitted or reset.
async fn take_test(
    workflow: &ExamWorkflowService,
    test_id: TestId,
) -> Result<SessionOutcome, Box<dyn std::error::Error>> {
    let LiveSession {
        paper,
        controller,
        handle,
        mut updates,
    } = workflow.start(test_id).await?;
    let questions = paper.questions();
    let platform = BroadcastPlatform::new();

    let mut runner = {
        let platform = platform.clone();
        tokio::spawn(async move { controller.run(&platform).await })
    };

    println!("{} ({} questions)", paper.title(), questions.len());
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let outcome = loop {
        tokio::select! {
            joined = &mut runner => break joined?,
            update = updates.recv() => match update {
                Some(SessionUpdate::Changed(snapshot)) => {
                    print!("{}", render_snapshot(&paper, &questions, &snapshot));
                }
                Some(update) => {
                    if let Some(line) = render_update(&update) {
                        println!("{line}");
                    }
                }
                None => {}
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_line(&line) {
                    Ok(Some(ConsoleAction::Input(input))) => {
                        if handle.send(input).is_err() {
                            tracing::debug!("input after session end ignored");
                        }
                    }
                    Ok(Some(ConsoleAction::Signal(signal))) => {
                        platform.emit(&signal);
                    }
                    Ok(Some(ConsoleAction::Show)) => {
                        if let Ok(snapshot) = handle.snapshot().await {
                            print!("{}", render_snapshot(&paper, &questions, &snapshot));
                        }
                    }
                    Ok(Some(ConsoleAction::Help)) => println!("{HELP}"),
                    Ok(None) => {}
                    Err(err) => println!("{err} (type help)"),
                },
                None => {
                    // Keep the timer running; the session still submits on expiry.
                    stdin_open = false;
                    println!("input closed; waiting for the timer");
                }
            },
        }
    };

    while let Ok(update) = updates.try_recv() {
        if let Some(line) = render_update(&update) {
            println!("{line}");
        }
    }
    Ok(outcome)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Take,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Take,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    tracing::info!(db_url = %parsed.db_url, ?cmd, "storage ready");

    match cmd {
        Command::Take => {
            let workflow = ExamWorkflowService::new(
                Clock::system(),
                Arc::clone(&storage.tests),
                Arc::clone(&storage.submissions),
            )
            .with_devtools_heuristic(parsed.devtools());
            let outcome = take_test(&workflow, parsed.test_id).await?;
            println!("{}", serde_json::to_string(&outcome)?);
            if outcome == SessionOutcome::HardReset {
                println!("The session was reset. Start again to retake the test.");
            }
            Ok(())
        }
        Command::Tests => {
            let workflow = ExamWorkflowService::new(
                Clock::system(),
                Arc::clone(&storage.tests),
                Arc::clone(&storage.submissions),
            );
            for item in workflow.list_tests(100).await? {
                println!(
                    "{}\t{}\t{} questions\t{}s",
                    item.id, item.title, item.question_count, item.time_budget_secs
                );
            }
            Ok(())
        }
        Command::History => {
            let submissions = SubmissionService::new(Arc::clone(&storage.submissions));
            for summary in submissions.list_for_test(parsed.test_id, 50).await? {
                println!("{}", serde_json::to_string(&summary)?);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
