use std::fmt;

use mastery_core::model::{Domain, UserId};
use mastery_core::quiz::Advance;
use services::{
    AppServices, Backend, Clock, FlushReport, ServiceConfig, ServiceError, SessionContext,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidLimit { raw: String },
    InvalidBackend { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidBackend { raw } => {
                write!(f, "invalid --backend value (expected sqlite or remote): {raw}")
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

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Practice { domain: Option<String> },
    Progress,
    Leaderboard { limit: Option<u32> },
    Profile,
    SignOut,
}

#[derive(Debug, Default)]
struct Args {
    command: Option<Command>,
    backend: Option<String>,
    db_url: Option<String>,
    user_id: Option<UserId>,
    verbose: u8,
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut out = Self::default();
        let mut args = argv.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--backend" => {
                    let value = require_value(&mut args, "--backend")?;
                    if !matches!(value.as_str(), "sqlite" | "remote") {
                        return Err(ArgsError::InvalidBackend { raw: value });
                    }
                    out.backend = Some(value);
                }
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    out.db_url = Some(value);
                }
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    let parsed = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    out.user_id = Some(parsed);
                }
                "--domain" => {
                    let value = require_value(&mut args, "--domain")?;
                    match &mut out.command {
                        Some(Command::Practice { domain }) => *domain = Some(value),
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                "--limit" => {
                    let value = require_value(&mut args, "--limit")?;
                    let parsed = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                    match &mut out.command {
                        Some(Command::Leaderboard { limit }) => *limit = Some(parsed),
                        _ => return Err(ArgsError::UnknownArg(arg)),
                    }
                }
                "-v" | "--verbose" => out.verbose = out.verbose.saturating_add(1),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => return Err(ArgsError::UnknownArg(arg)),
                _ if out.command.is_none() => {
                    out.command = Some(match arg.as_str() {
                        "practice" => Command::Practice { domain: None },
                        "progress" => Command::Progress,
                        "leaderboard" => Command::Leaderboard { limit: None },
                        "profile" => Command::Profile,
                        "sign-out" => Command::SignOut,
                        _ => return Err(ArgsError::UnknownCommand(arg)),
                    });
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(out)
    }

    /// Environment first, then flag overrides.
    fn backend(&self) -> Result<Backend, Box<dyn std::error::Error>> {
        let backend = match self.backend.as_deref() {
            None => Backend::from_env()?,
            Some("remote") => Backend::remote_from_env()?,
            Some(_) => Backend::sqlite_from_env(),
        };

        Ok(match backend {
            Backend::Sqlite { db_url, user_id } => {
                let db_url = normalize_sqlite_url(self.db_url.clone().unwrap_or(db_url));
                prepare_sqlite_file(&db_url)?;
                Backend::Sqlite {
                    db_url,
                    user_id: self.user_id.or(user_id),
                }
            }
            remote @ Backend::Remote(_) => remote,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [options] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  practice [--domain <d>]   Answer a batch of up to 10 questions");
    eprintln!("  progress                  Mastery per domain");
    eprintln!("  leaderboard [--limit n]   Top learners by points (default 50)");
    eprintln!("  profile                   Points, answered count and achievements");
    eprintln!("  sign-out                  End the current session");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --backend <sqlite|remote> Backing store (default: sqlite)");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --user-id <uuid>          Signed-in learner for the local database");
    eprintln!("  -v, --verbose             More logging (repeat for trace)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Domains: aptitude, reasoning, verbal, technical, general_knowledge");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_BACKEND, QUIZ_DB_URL, QUIZ_USER_ID, QUIZ_REMOTE_URL, QUIZ_REMOTE_API_KEY,");
    eprintln!("  QUIZ_ACCESS_TOKEN, QUIZ_BATCH_SIZE, QUIZ_LEADERBOARD_LIMIT, QUIZ_CALL_TIMEOUT_SECS,");
    eprintln!("  QUIZ_RECORD_MAX_ATTEMPTS, QUIZ_RECORD_BACKOFF_MS, QUIZ_SHUFFLE, RUST_LOG");
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.contains("mode=memory") {
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

/// sqlx will not create a missing database file on its own.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
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

type Input = Lines<BufReader<Stdin>>;

async fn read_line(input: &mut Input) -> Result<Option<String>, std::io::Error> {
    Ok(input.next_line().await?.map(|line| line.trim().to_owned()))
}

async fn practice(
    services: &AppServices,
    ctx: &SessionContext,
    domain: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(raw) = domain
        && Domain::from_filter(Some(raw)).is_none()
    {
        println!("Unknown domain '{raw}', practicing all domains.");
    }

    let mut runner = match services.start_quiz(ctx, domain).await {
        Ok(runner) => runner,
        Err(ServiceError::ValidationFailed(e)) => {
            println!("{e}. Seed some questions first: cargo run -p storage --bin seed");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    'questions: while let Some(question) = runner.current_question().cloned() {
        let progress = runner.progress();
        println!();
        println!(
            "Question {} of {}  [{}]  score {}",
            progress.position,
            progress.total_questions,
            question.domain().label(),
            progress.tally
        );
        println!("{}", question.prompt());
        for (label, text) in question.options() {
            println!("  {label}) {text}");
        }

        loop {
            print!("Answer (A-D, q to quit): ");
            std::io::Write::flush(&mut std::io::stdout())?;
            let Some(line) = read_line(&mut input).await? else {
                break 'questions;
            };
            if line == "q" {
                break 'questions;
            }
            if let Err(e) = runner.select_option_str(&line) {
                println!("{e}");
                continue;
            }
            match runner.submit_answer() {
                Ok(feedback) => {
                    if feedback.is_correct() {
                        println!("Correct! +{} points", feedback.points);
                    } else {
                        let answer = feedback
                            .correct_option
                            .map_or_else(|| question.correct_answer().to_owned(), |l| {
                                format!("{l}) {}", question.option(l))
                            });
                        println!("Incorrect. Answer: {answer}  +{} points", feedback.points);
                    }
                    if !feedback.explanation.is_empty() {
                        println!("{}", feedback.explanation);
                    }
                    break;
                }
                Err(e) => println!("{e}"),
            }
        }

        if let Advance::Complete(tally) = runner.advance()? {
            println!();
            println!("Quiz complete: {tally} correct");
        }
    }

    let outcome = runner.finish().await?;
    if let Some(notice) = unsaved_notice(&outcome.report) {
        println!("{notice}");
    }
    Ok(())
}

/// Tells the user which answers did not reach the store.
fn unsaved_notice(report: &FlushReport) -> Option<String> {
    if report.is_clean() {
        return None;
    }
    let lost = report.failed.iter().filter(|f| f.known_unsaved()).count();
    let unknown = report.failed.len() - lost;
    let mut lines = Vec::new();
    if lost > 0 {
        lines.push(format!(
            "{lost} answer(s) were not saved and will not count toward your progress."
        ));
    }
    if unknown > 0 {
        lines.push(format!(
            "{unknown} answer(s) timed out while saving and may not count toward your progress."
        ));
    }
    Some(lines.join("\n"))
}

async fn progress(
    services: &AppServices,
    ctx: &SessionContext,
) -> Result<(), Box<dyn std::error::Error>> {
    let mastery = services.aggregation().load_mastery(ctx).await?;
    if mastery.is_empty() {
        println!("No attempts yet. Try: practice --domain aptitude");
        return Ok(());
    }
    println!("{:<20} {:>9} {:>8} {:>9}", "Domain", "Attempted", "Correct", "Accuracy");
    for row in &mastery {
        println!(
            "{:<20} {:>9} {:>8} {:>8}%",
            row.domain().label(),
            row.total_attempted(),
            row.total_correct(),
            row.accuracy_rounded()
        );
    }
    Ok(())
}

async fn leaderboard(
    services: &AppServices,
    limit: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let me = services.resolve_session().await.ok().map(|ctx| ctx.user_id());
    let entries = services.aggregation().load_leaderboard(limit).await?;
    for (rank, entry) in entries.iter().enumerate() {
        let marker = if Some(entry.user_id) == me { "  <- you" } else { "" };
        println!(
            "{:>3}. {:<24} {:>6} pts{marker}",
            rank + 1,
            entry.display_name_or_default(),
            entry.total_points
        );
    }
    Ok(())
}

async fn profile(
    services: &AppServices,
    ctx: &SessionContext,
) -> Result<(), Box<dyn std::error::Error>> {
    let dashboard = services.aggregation().load_dashboard(ctx).await?;
    println!("{}", dashboard.display_name());
    if let Some(email) = ctx.email() {
        println!("  email           {email}");
    }
    println!("  points          {}", dashboard.profile.total_points);
    println!("  streak          {} day(s)", dashboard.profile.current_streak);
    println!("  answered        {}", dashboard.answered_count);
    println!("  daily goal      {} questions", dashboard.daily_goal);
    let badge = if dashboard.achievement_unlocked {
        "unlocked"
    } else {
        "locked"
    };
    println!("  century badge   {badge}");
    if dashboard.answered_count == 0 {
        let picks: Vec<_> = Domain::QUICK_START.iter().map(|d| d.as_str()).collect();
        println!();
        println!("Get started: practice --domain <{}>", picks.join("|"));
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing(args.verbose);

    let Some(command) = args.command.clone() else {
        print_usage();
        return Ok(());
    };

    let backend = args.backend()?;
    let config = ServiceConfig::from_env();
    let services = AppServices::connect(backend, &config, Clock::system()).await?;

    let token = services.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling pending calls");
            token.cancel();
        }
    });

    match command {
        Command::Leaderboard { limit } => leaderboard(&services, limit).await,
        Command::SignOut => {
            services.sign_out().await?;
            println!("Signed out.");
            Ok(())
        }
        Command::Practice { domain } => {
            let ctx = services.resolve_session().await?;
            practice(&services, &ctx, domain.as_deref()).await
        }
        Command::Progress => {
            let ctx = services.resolve_session().await?;
            progress(&services, &ctx).await
        }
        Command::Profile => {
            let ctx = services.resolve_session().await?;
            profile(&services, &ctx).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
