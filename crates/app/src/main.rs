use std::fmt;
use std::io;

use chrono::{Days, NaiveDate};
use practice_core::model::{Difficulty, ProblemId, ReviewDraft, parse_review_date};
use serde::Serialize;
use services::{Clock, ErrorClass, PracticeError, PracticeServices};
use tracing::Level;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_URL: &str = "sqlite://practice.sqlite3";
const DEFAULT_UPCOMING_DAYS: u32 = 7;
const DEFAULT_EVENT_LOOKBACK_DAYS: u64 = 30;

//
// ─── ARGUMENTS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidProblemId { raw: String },
    InvalidDifficulty { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidIntervals { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidProblemId { raw } => write!(f, "invalid problem id: {raw}"),
            ArgsError::InvalidDifficulty { raw } => {
                write!(f, "invalid difficulty: {raw} (expected easy, medium or hard)")
            }
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidIntervals { raw } => {
                write!(f, "invalid intervals: {raw} (expected e.g. 0,1,3,7)")
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

fn require_arg(
    args: &mut impl Iterator<Item = String>,
    name: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingArg { name })
}

fn parse_problem_id(raw: String) -> Result<ProblemId, ArgsError> {
    raw.parse::<ProblemId>()
        .map_err(|_| ArgsError::InvalidProblemId { raw })
}

fn parse_difficulty(raw: String) -> Result<Difficulty, ArgsError> {
    raw.parse::<Difficulty>()
        .map_err(|_| ArgsError::InvalidDifficulty { raw })
}

fn parse_intervals(raw: &str) -> Result<Vec<u32>, ArgsError> {
    raw.split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ArgsError::InvalidIntervals {
            raw: raw.to_owned(),
        })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  practice [--db <sqlite_url>] [--json] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  add-problem <title> --difficulty <easy|medium|hard>");
    eprintln!("  problems");
    eprintln!("  solve <id> | unsolve <id> | archive <id>");
    eprintln!("  review <id> <remembered|forgot> [--time <minutes>] [--notes <text>] [--confusion <text>]");
    eprintln!("  due [--date <YYYY-MM-DD>]");
    eprintln!("  overdue [--date <YYYY-MM-DD>]");
    eprintln!("  upcoming [--date <YYYY-MM-DD>] [--days <n>]");
    eprintln!("  due-by [--date <YYYY-MM-DD>]");
    eprintln!("  stage <id> | history <id> | summary <id>");
    eprintln!("  patterns");
    eprintln!("  set-pattern <difficulty> <intervals, e.g. 0,1,3,7>");
    eprintln!("  events [--from <YYYY-MM-DD>] [--to <YYYY-MM-DD>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PRACTICE_DB_URL, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    AddProblem {
        title: String,
        difficulty: Difficulty,
    },
    Problems,
    Solve(ProblemId),
    Unsolve(ProblemId),
    Archive(ProblemId),
    Review {
        problem_id: ProblemId,
        draft: ReviewDraft,
    },
    Due {
        date: Option<String>,
    },
    Overdue {
        date: Option<String>,
    },
    Upcoming {
        date: Option<String>,
        days: u32,
    },
    DueBy {
        date: Option<String>,
    },
    Stage(ProblemId),
    History(ProblemId),
    Summary(ProblemId),
    Patterns,
    SetPattern {
        difficulty: Difficulty,
        intervals: Vec<u32>,
    },
    Events {
        from: Option<String>,
        to: Option<String>,
    },
}

#[derive(Debug)]
struct Args {
    db_url: String,
    json: bool,
    command: Command,
}

enum Parsed {
    Run(Args),
    Help,
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Parsed, ArgsError> {
        let mut db_url = std::env::var("PRACTICE_DB_URL")
            .ok()
            .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut json = false;

        // Global flags may appear anywhere; everything else belongs to the command.
        let mut rest = Vec::new();
        let mut argv = argv.into_iter();
        while let Some(arg) = argv.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut argv, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--json" => json = true,
                "--help" | "-h" => return Ok(Parsed::Help),
                _ => rest.push(arg),
            }
        }

        let mut rest = rest.into_iter();
        let Some(name) = rest.next() else {
            return Ok(Parsed::Help);
        };
        let command = parse_command(&name, &mut rest)?;
        if let Some(extra) = rest.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Parsed::Run(Self {
            db_url,
            json,
            command,
        }))
    }
}

fn parse_command(
    name: &str,
    args: &mut impl Iterator<Item = String>,
) -> Result<Command, ArgsError> {
    let command = match name {
        "add-problem" => {
            let title = require_arg(args, "title")?;
            let mut difficulty = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--difficulty" | "-d" => {
                        difficulty = Some(parse_difficulty(require_value(args, "--difficulty")?)?);
                    }
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            Command::AddProblem {
                title,
                difficulty: difficulty.ok_or(ArgsError::MissingValue {
                    flag: "--difficulty",
                })?,
            }
        }
        "problems" => Command::Problems,
        "solve" => Command::Solve(parse_problem_id(require_arg(args, "id")?)?),
        "unsolve" => Command::Unsolve(parse_problem_id(require_arg(args, "id")?)?),
        "archive" => Command::Archive(parse_problem_id(require_arg(args, "id")?)?),
        "review" => {
            let problem_id = parse_problem_id(require_arg(args, "id")?)?;
            let mut draft = ReviewDraft::new(require_arg(args, "result")?);
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--time" => {
                        let raw = require_value(args, "--time")?;
                        let minutes = raw
                            .parse::<i64>()
                            .map_err(|_| ArgsError::InvalidNumber { flag: "--time", raw })?;
                        draft = draft.with_time_spent(minutes);
                    }
                    "--notes" => draft = draft.with_notes(require_value(args, "--notes")?),
                    "--confusion" => {
                        draft = draft.with_confusion_notes(require_value(args, "--confusion")?);
                    }
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            Command::Review { problem_id, draft }
        }
        "due" => Command::Due {
            date: parse_date_flag(args)?,
        },
        "overdue" => Command::Overdue {
            date: parse_date_flag(args)?,
        },
        "due-by" => Command::DueBy {
            date: parse_date_flag(args)?,
        },
        "upcoming" => {
            let mut date = None;
            let mut days = DEFAULT_UPCOMING_DAYS;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--date" => date = Some(require_value(args, "--date")?),
                    "--days" => {
                        let raw = require_value(args, "--days")?;
                        days = raw
                            .parse()
                            .map_err(|_| ArgsError::InvalidNumber { flag: "--days", raw })?;
                    }
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            Command::Upcoming { date, days }
        }
        "stage" => Command::Stage(parse_problem_id(require_arg(args, "id")?)?),
        "history" => Command::History(parse_problem_id(require_arg(args, "id")?)?),
        "summary" => Command::Summary(parse_problem_id(require_arg(args, "id")?)?),
        "patterns" => Command::Patterns,
        "set-pattern" => {
            let difficulty = parse_difficulty(require_arg(args, "difficulty")?)?;
            let intervals = parse_intervals(&require_arg(args, "intervals")?)?;
            Command::SetPattern {
                difficulty,
                intervals,
            }
        }
        "events" => {
            let mut from = None;
            let mut to = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--from" => from = Some(require_value(args, "--from")?),
                    "--to" => to = Some(require_value(args, "--to")?),
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            Command::Events { from, to }
        }
        other => return Err(ArgsError::UnknownCommand(other.to_owned())),
    };
    Ok(command)
}

fn parse_date_flag(args: &mut impl Iterator<Item = String>) -> Result<Option<String>, ArgsError> {
    let mut date = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--date" => date = Some(require_value(args, "--date")?),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }
    Ok(date)
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:")
    {
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
    if db_url == "sqlite::memory:" || db_url.starts_with("sqlite:file:") {
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

//
// ─── OUTPUT ────────────────────────────────────────────────────────────────────
//

/// Print `value` as pretty JSON, or through `text` otherwise.
fn emit<T: Serialize>(
    json: bool,
    value: &T,
    text: impl FnOnce(&T),
) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn print_due(items: &[practice_core::due::DueItem]) {
    if items.is_empty() {
        println!("nothing due");
        return;
    }
    for item in items {
        println!(
            "{:>5}  {}  {:<6}  stage {}  {}",
            item.problem_id,
            item.next_review_date,
            Difficulty::label(item.difficulty),
            item.stage,
            item.title
        );
    }
}

//
// ─── RUN ───────────────────────────────────────────────────────────────────────
//

async fn execute(
    services: &PracticeServices,
    command: Command,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::AddProblem { title, difficulty } => {
            let id = services.add_problem(&title, difficulty).await?;
            emit(json, &id, |id| println!("added problem {id}"))?;
        }
        Command::Problems => {
            let problems = services.list_problems().await?;
            emit(json, &problems, |problems| {
                for p in problems {
                    let mut flags = Vec::new();
                    if p.is_solved() {
                        flags.push("solved");
                    }
                    if p.is_archived() {
                        flags.push("archived");
                    }
                    println!(
                        "{:>5}  {:<6}  {}  {}",
                        p.id(),
                        Difficulty::label(p.difficulty()),
                        p.title(),
                        flags.join(",")
                    );
                }
            })?;
        }
        Command::Solve(id) => toggle(services, id, true, json).await?,
        Command::Unsolve(id) => toggle(services, id, false, json).await?,
        Command::Archive(id) => {
            services.archive_problem(id).await?;
            emit(json, &id, |id| println!("archived problem {id}"))?;
        }
        Command::Review { problem_id, draft } => {
            let outcome = services.submit_review(problem_id, draft).await?;
            emit(json, &outcome, |o| {
                println!(
                    "stage {} -> {}; next review in {} day(s) on {}",
                    o.previous_stage, o.next_stage, o.interval_days, o.next_review_date
                );
            })?;
        }
        Command::Due { date } => {
            let items = services.get_due_today(date.as_deref()).await?;
            emit(json, &items, |items| print_due(items))?;
        }
        Command::Overdue { date } => {
            let items = services.get_overdue(date.as_deref()).await?;
            emit(json, &items, |items| print_due(items))?;
        }
        Command::Upcoming { date, days } => {
            let items = services.get_upcoming(date.as_deref(), days).await?;
            emit(json, &items, |items| print_due(items))?;
        }
        Command::DueBy { date } => {
            let items = services.get_due_by(date.as_deref()).await?;
            emit(json, &items, |items| print_due(items))?;
        }
        Command::Stage(id) => {
            let stage = services.current_stage(id).await?;
            emit(json, &stage, |stage| println!("{stage}"))?;
        }
        Command::History(id) => {
            let entries = services.history(id).await?;
            emit(json, &entries, |entries| {
                for e in entries {
                    println!(
                        "#{:<3} {}  {:<10}  stage {}  +{}d -> {}{}",
                        e.sequence,
                        e.created_at.format("%Y-%m-%d"),
                        e.result,
                        e.review_stage,
                        e.interval_days,
                        e.next_review_date,
                        e.notes
                            .as_deref()
                            .map(|n| format!("  ({n})"))
                            .unwrap_or_default()
                    );
                }
            })?;
        }
        Command::Summary(id) => {
            let summary = services.summary(id).await?;
            emit(json, &summary, |s| {
                println!("reviews:      {}", s.total_reviews);
                println!("remembered:   {}", s.remembered);
                println!("forgot:       {}", s.forgot);
                println!("success rate: {:.2}%", s.success_rate);
                println!("stage:        {}", s.current_stage);
                if let Some(next) = s.next_review_date {
                    println!("next review:  {next}");
                }
                for date in &s.projected_reviews {
                    println!("then:         {date}");
                }
            })?;
        }
        Command::Patterns => {
            let patterns: Vec<_> = services.patterns().iter().cloned().collect();
            emit(json, &patterns, |patterns| {
                for p in patterns {
                    let intervals: Vec<String> =
                        p.intervals().iter().map(ToString::to_string).collect();
                    println!("{:<6}  {}", p.difficulty(), intervals.join(","));
                }
            })?;
        }
        Command::SetPattern {
            difficulty,
            intervals,
        } => {
            let pattern = services.set_pattern(difficulty, intervals).await?;
            emit(json, &pattern, |p| {
                println!("stored pattern for {}; restart to apply", p.difficulty());
            })?;
        }
        Command::Events { from, to } => {
            let (from, to) = event_range(from.as_deref(), to.as_deref())?;
            let events = services.solved_events(from, to).await?;
            emit(json, &events, |events| {
                for e in events {
                    println!("{}  {}  {}", e.event_date, e.color.hex(), e.title);
                }
            })?;
        }
    }
    Ok(())
}

async fn toggle(
    services: &PracticeServices,
    id: ProblemId,
    solved: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = services.toggle_solved(id, solved).await?;
    emit(json, &outcome, |o| {
        let state = if o.solved { "solved" } else { "unsolved" };
        if o.event_created {
            println!("problem {} {state}; first solve recorded", o.problem_id);
        } else {
            println!("problem {} {state}", o.problem_id);
        }
    })?;
    Ok(())
}

fn event_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(NaiveDate, NaiveDate), PracticeError> {
    let to = match to {
        Some(raw) => parse_review_date(raw)?,
        None => Clock::default_clock().today(),
    };
    let from = match from {
        Some(raw) => parse_review_date(raw)?,
        None => to
            .checked_sub_days(Days::new(DEFAULT_EVENT_LOOKBACK_DAYS))
            .unwrap_or(NaiveDate::MIN),
    };
    Ok((from, to))
}

fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<PracticeError>().map(PracticeError::class) {
        Some(ErrorClass::Server) => 1,
        Some(ErrorClass::Transient) => 75,
        Some(ErrorClass::Client) | None => 2,
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = match Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })? {
        Parsed::Help => {
            print_usage();
            return Ok(());
        }
        Parsed::Run(args) => args,
    };

    prepare_sqlite_file(&args.db_url)?;
    let services = PracticeServices::new_sqlite(&args.db_url, Clock::default_clock()).await?;

    execute(&services, args.command, args.json).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(exit_code(err.as_ref()));
    }
}
