use std::fmt;
use std::sync::Arc;

use quiz_core::model::{Article, ArticleId, MultipleChoiceQuestion, QuestionNumber, SessionId};
use quiz_core::scoring::QuestionTally;
use services::{AppServices, Clock, SessionResults, StaticIdentity};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingSessionId,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidSessionId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingSessionId => write!(f, "results requires a session id"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid session id: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- results <session-id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- demo [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://quiz.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_USER_ID, QUIZ_AI_API_KEY, QUIZ_AI_BASE_URL, QUIZ_AI_MODEL,");
    eprintln!("  QUIZ_ORACLE_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Results(SessionId),
    Demo,
}

struct Args {
    command: Command,
    db_url: String,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url);

        let command = match args.next().as_deref() {
            None | Some("--help" | "-h") => return Ok(None),
            Some("demo") => Command::Demo,
            Some("results") => {
                let raw = args.next().ok_or(ArgsError::MissingSessionId)?;
                let id = raw
                    .parse::<SessionId>()
                    .map_err(|_| ArgsError::InvalidSessionId { raw: raw.clone() })?;
                Command::Results(id)
            }
            Some(other) => return Err(ArgsError::UnknownArg(other.to_string())),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--help" | "-h" => return Ok(None),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Some(Self { command, db_url }))
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

fn print_results(results: &SessionResults) {
    let record = &results.record;
    println!("session    {}", record.id);
    println!("user       {}", record.user_id);
    if let Some(article) = &record.article_id {
        println!("article    {article}");
    }
    println!("completed  {}", record.completed);
    println!(
        "points     {}/{} ({:.0}%)",
        record.earned_points,
        record.total_points,
        record.accuracy * 100.0
    );
    println!("time spent {}s", record.total_time_spent);
    println!(
        "correct    mc={} open={} vocab={}",
        record.counts.multiple_choice_correct,
        record.counts.open_ended_correct,
        record.counts.vocabulary_correct
    );

    for r in &results.multiple_choice {
        let mark = if r.is_correct { "ok" } else { "x" };
        println!(
            "  mc #{:<3} {mark:<2} chose {:?}, key {:?}",
            r.question_number, r.student_choice, r.correct_choice
        );
    }
    for r in &results.open_ended {
        let mark = if r.is_correct { "ok" } else { "x" };
        println!(
            "  open #{:<3} {mark:<2} score {:.2}: {}",
            r.question_number, r.score, r.feedback
        );
    }
}

fn question(n: u32, text: &str, options: &[&str], correct: &str) -> Option<MultipleChoiceQuestion> {
    Some(MultipleChoiceQuestion {
        number: QuestionNumber::new(n)?,
        text: text.to_string(),
        options: options.iter().map(ToString::to_string).collect(),
        correct_option: correct.to_string(),
    })
}

/// Plays one scripted session end to end and returns its id.
async fn run_demo(services: &AppServices) -> Result<SessionId, Box<dyn std::error::Error>> {
    let article = Article::new(
        ArticleId::new("demo-rivers"),
        "How rivers shape the land",
        "Rivers carve valleys over thousands of years and carry sediment \
         downstream, building deltas where they meet the sea.",
    );
    let multiple_choice: Vec<MultipleChoiceQuestion> = [
        question(1, "What do rivers carve?", &["valleys", "mountains"], "valleys"),
        question(2, "Where are deltas built?", &["at the source", "at the sea"], "at the sea"),
    ]
    .into_iter()
    .flatten()
    .collect();
    let chosen = ["valleys", "at the source"];

    let mut tracker = services.tracker();
    let session_id = SessionId::generate();
    tracker.start(Some(session_id.clone()))?;

    for (q, choice) in multiple_choice.iter().zip(chosen) {
        tracker.track_multiple_choice(
            q.is_correct(choice),
            q.number,
            q.text.clone(),
            choice,
            q.correct_option.clone(),
        )?;
    }
    tracker.complete_multiple_choice_section()?;

    let evaluation = services.evaluation();
    let expected = "sediment builds deltas downstream";
    let answer = "the river carries sediment downstream into deltas";
    let number = QuestionNumber::new(1).ok_or("invalid question number")?;
    let graded = evaluation
        .evaluate_with_oracle(
            &article,
            "What happens to sediment?",
            expected,
            answer,
            number,
            &mut tracker,
        )
        .await;
    if tracker.state().open_ended_scores().is_empty() {
        let correct = evaluation.evaluate_by_keyword_overlap(answer, expected);
        info!(correct, "oracle unavailable; graded by keyword overlap");
        tracker.track_open_ended(if correct { 1.0 } else { 0.0 })?;
    } else {
        info!(correct = graded, "graded by oracle");
    }

    tracker.track_vocabulary(true)?;

    let mc = u32::try_from(multiple_choice.len())?;
    let pending = tracker.finish(article.id.clone(), QuestionTally::exact(mc, 1, 1))?;
    if let Err(failure) = pending.wait().await {
        warn!(%failure, "session was not fully saved");
    }
    tracker.flush().await?;

    Ok(session_id)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return Err(e.into());
        }
    };

    prepare_sqlite_file(&parsed.db_url)?;

    let mut identity = StaticIdentity::from_env();
    if !identity.is_signed_in() && parsed.command == Command::Demo {
        identity = StaticIdentity::signed_in("demo-user".parse()?);
    }
    let services =
        AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), Arc::new(identity)).await?;

    match parsed.command {
        Command::Results(session_id) => {
            let results = services.results().load(&session_id).await?;
            print_results(&results);
        }
        Command::Demo => {
            let session_id = run_demo(&services).await?;
            let results = services.results().load(&session_id).await?;
            print_results(&results);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
