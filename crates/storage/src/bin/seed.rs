use std::fmt;

use chrono::{DateTime, Utc};
use mastery_core::model::{Domain, Profile, Question, QuestionId, UserId};
use storage::repository::{Storage, StorageError};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: Option<UserId>,
    user_name: Option<String>,
    rivals: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidRivals { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidRivals { raw } => write!(f, "invalid --rivals value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut user_id = std::env::var("QUIZ_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok());
        let mut user_name = None;
        let mut rivals = 3;
        let mut now: Option<DateTime<Utc>> = None;

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
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    let parsed = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    user_id = Some(parsed);
                }
                "--user-name" => {
                    user_name = Some(require_value(&mut args, "--user-name")?);
                }
                "--rivals" => {
                    let value = require_value(&mut args, "--rivals")?;
                    rivals = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidRivals { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
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
            user_id,
            user_name,
            rivals,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --user-id <uuid>          Create an empty profile for this learner");
    eprintln!("  --user-name <name>        Display name for --user-id");
    eprintln!("  --rivals <n>              Sample leaderboard profiles to upsert (default: 3)");
    eprintln!("  --now <rfc3339>           Fixed current time, printed with the summary");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_USER_ID");
}

/// (domain, sub-topic, prompt, options, correct label, explanation)
type Sample = (
    Domain,
    &'static str,
    &'static str,
    [&'static str; 4],
    &'static str,
    &'static str,
);

const SAMPLES: &[Sample] = &[
    (
        Domain::Aptitude,
        "percentages",
        "What is 15% of 200?",
        ["20", "25", "30", "35"],
        "C",
        "0.15 x 200 = 30.",
    ),
    (
        Domain::Aptitude,
        "time and work",
        "A can finish a job in 6 days and B in 12. Together they take?",
        ["3 days", "4 days", "5 days", "9 days"],
        "B",
        "1/6 + 1/12 = 1/4 per day.",
    ),
    (
        Domain::Aptitude,
        "averages",
        "The average of 4, 8 and 12 is?",
        ["6", "7", "8", "9"],
        "C",
        "24 / 3 = 8.",
    ),
    (
        Domain::Reasoning,
        "series",
        "Next in the series 2, 6, 12, 20, ?",
        ["28", "30", "32", "36"],
        "B",
        "Differences grow by 2: 4, 6, 8, 10.",
    ),
    (
        Domain::Reasoning,
        "coding-decoding",
        "If CAT is coded DBU, how is DOG coded?",
        ["EPH", "EPG", "DPH", "FQI"],
        "A",
        "Each letter shifts forward by one.",
    ),
    (
        Domain::Reasoning,
        "direction sense",
        "Facing north, you turn right twice. Which way do you face?",
        ["North", "East", "South", "West"],
        "C",
        "Two right turns reverse the heading.",
    ),
    (
        Domain::Verbal,
        "synonyms",
        "Choose the synonym of 'candid'.",
        ["Frank", "Secretive", "Hostile", "Timid"],
        "A",
        "Candid means open and honest.",
    ),
    (
        Domain::Verbal,
        "antonyms",
        "Choose the antonym of 'scarce'.",
        ["Rare", "Plentiful", "Meagre", "Sparse"],
        "B",
        "Scarce means in short supply.",
    ),
    (
        Domain::Technical,
        "data structures",
        "Which structure serves elements in FIFO order?",
        ["Stack", "Queue", "Tree", "Heap"],
        "B",
        "A queue removes the oldest element first.",
    ),
    (
        Domain::Technical,
        "complexity",
        "Binary search on a sorted array runs in?",
        ["O(1)", "O(n)", "O(log n)", "O(n log n)"],
        "C",
        "The search space halves every step.",
    ),
    (
        Domain::Technical,
        "networking",
        "Which protocol resolves host names to addresses?",
        ["DNS", "FTP", "ARP", "SMTP"],
        "A",
        "DNS maps names to IP addresses.",
    ),
    (
        Domain::GeneralKnowledge,
        "geography",
        "Which is the largest ocean?",
        ["Atlantic", "Indian", "Arctic", "Pacific"],
        "D",
        "The Pacific covers about a third of the surface.",
    ),
    (
        Domain::GeneralKnowledge,
        "science",
        "What gas do plants absorb for photosynthesis?",
        ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"],
        "C",
        "",
    ),
];

const RIVALS: &[(&str, u64)] = &[
    ("Asha", 240),
    ("Bilal", 180),
    ("Chen", 96),
    ("Dana", 64),
    ("Emeka", 20),
];

/// Stable ids so re-seeding updates rows instead of duplicating them.
fn seeded_question_id(index: usize) -> QuestionId {
    QuestionId::new(Uuid::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0000 + index as u128))
}

fn seeded_user_id(index: usize) -> UserId {
    UserId::new(Uuid::from_u128(0x5eed_0001_0000_0000_0000_0000_0000_0000 + index as u128))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url, args.user_id).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for (i, (domain, sub_topic, prompt, options, correct, explanation)) in
        SAMPLES.iter().enumerate()
    {
        let question = Question::new(
            seeded_question_id(i),
            *prompt,
            options.map(str::to_owned),
            *correct,
            *explanation,
            *domain,
            *sub_topic,
        )?;
        storage.questions.upsert_question(&question).await?;
    }

    let rivals = RIVALS.iter().take(args.rivals as usize);
    for (i, (name, points)) in rivals.enumerate() {
        let mut profile = Profile::new(seeded_user_id(i), Some((*name).to_owned()));
        profile.total_points = *points;
        storage.profiles.upsert_profile(&profile).await?;
    }

    if let Some(user_id) = args.user_id {
        // Keep earned points when re-seeding an existing learner.
        let profile = match storage.profiles.get_profile(user_id).await {
            Ok(mut existing) => {
                if args.user_name.is_some() {
                    existing.display_name = args.user_name.clone();
                }
                existing
            }
            Err(StorageError::NotFound) => Profile::new(user_id, args.user_name.clone()),
            Err(e) => return Err(e.into()),
        };
        storage.profiles.upsert_profile(&profile).await?;
    }

    println!(
        "Seeded {} questions and {} rival profiles into {} at {}",
        SAMPLES.len(),
        args.rivals.min(RIVALS.len() as u32),
        args.db_url,
        now.to_rfc3339()
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
