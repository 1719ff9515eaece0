use std::fmt;
use std::path::PathBuf;

use proctor_core::model::{Question, QuestionId, QuestionItem, TestId, TestPaper};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    test_id: TestId,
    file: Option<PathBuf>,
    budget_secs: Option<u32>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidBudget { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidBudget { raw } => write!(f, "invalid --budget value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PROCTOR_DB_URL").unwrap_or_else(|_| "sqlite://proctor.sqlite3".into());
        let mut test_id = std::env::var("PROCTOR_TEST_ID")
            .ok()
            .and_then(|value| value.parse::<TestId>().ok())
            .unwrap_or_else(|| TestId::new(1));
        let mut file = None;
        let mut budget_secs = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--test-id" => {
                    let value = require_value(&mut args, "--test-id")?;
                    test_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidTestId { raw: value.clone() })?;
                }
                "--file" => {
                    file = Some(PathBuf::from(require_value(&mut args, "--file")?));
                }
                "--budget" => {
                    let value = require_value(&mut args, "--budget")?;
                    budget_secs = Some(
                        value
                            .parse::<u32>()
                            .map_err(|_| ArgsError::InvalidBudget { raw: value.clone() })?,
                    );
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
            file,
            budget_secs,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite://proctor.sqlite3)");
    eprintln!("  --test-id <id>        Test id for the built-in sample (default: 1)");
    eprintln!("  --file <path>         Load a JSON test paper instead of the sample");
    eprintln!("  --budget <secs>       Override the time budget of the built-in sample");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PROCTOR_DB_URL, PROCTOR_TEST_ID");
}

fn option_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn sample_paper(test_id: TestId, budget_secs: u32) -> Result<TestPaper, proctor_core::Error> {
    let q = |id: u64, title: &str, options: &[&str], category: &str, sub: &str| {
        Question::new(QuestionId::new(id), title, option_list(options), category, sub)
    };

    let items = vec![
        QuestionItem::Single(q(
            1,
            "A train covers 120 km in 2 hours. What is its average speed?",
            &["40 km/h", "60 km/h", "80 km/h", "120 km/h"],
            "Aptitude",
            "Speed and Distance",
        )?),
        QuestionItem::Single(q(
            2,
            "Which number comes next: 2, 6, 12, 20, ?",
            &["28", "30", "32", "36"],
            "Reasoning",
            "Series",
        )?),
        QuestionItem::Comprehensive {
            parent: QuestionId::new(100),
            passage: "Rust guarantees memory safety without a garbage collector by \
                      checking ownership and borrowing rules at compile time."
                .into(),
            questions: vec![
                q(
                    3,
                    "According to the passage, when are ownership rules checked?",
                    &["At run time", "At compile time", "During linking", "Never"],
                    "Verbal",
                    "Reading Comprehension",
                )?,
                q(
                    4,
                    "What does the passage say Rust does without?",
                    &["A type system", "A compiler", "A garbage collector", "Threads"],
                    "Verbal",
                    "Reading Comprehension",
                )?,
            ],
        },
        QuestionItem::Single(q(
            5,
            "Which data structure offers O(1) average lookup by key?",
            &["Linked list", "Hash map", "Binary heap", "Stack"],
            "Technical",
            "Data Structures",
        )?),
    ];

    Ok(TestPaper::new(test_id, "Campus placement mock", budget_secs, items)?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let paper = match &args.file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let paper: TestPaper = serde_json::from_str(&raw)?;
            paper.validate()?;
            paper
        }
        None => sample_paper(args.test_id, args.budget_secs.unwrap_or(600))?,
    };

    let storage = Storage::sqlite(&args.db_url).await?;
    storage.tests.upsert_test(&paper).await?;

    println!(
        "Seeded test {} ({} questions, {}s) into {}",
        paper.id(),
        paper.questions().len(),
        paper.time_budget_secs(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
