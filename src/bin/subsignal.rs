//! Subsignal CLI - Command-line interface for the preference pipeline
//!
//! Commands:
//! - describe: Turn raw option strings into persuasive descriptions
//! - extract: Process one trial recording into a stored Seed
//! - sessions: List stored sessions and their seed counts
//! - label: Attach the subject's ground truth to a Seed
//! - synthesize: Bootstrap the diagnostic guideline from labeled Seeds
//! - judge: Rank one session's options against the active guideline

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use subsignal::labeler::{LabelOutcome, Labeler, OverwritePolicy};
use subsignal::service::{GeminiClient, ServiceConfig};
use subsignal::store::{GuidelineStore, SeedStore};
use subsignal::synthesizer::GuidelineSynthesizer;
use subsignal::types::TrialRecording;
use subsignal::{describe_options, DataPaths, FeatureExtractor, Judge, PipelineError};
use subsignal::SUBSIGNAL_VERSION;

/// Subsignal - behavioral preference pipeline
#[derive(Parser)]
#[command(name = "subsignal")]
#[command(version = SUBSIGNAL_VERSION)]
#[command(about = "Extract behavioral seeds, bootstrap a guideline, judge sessions", long_about = None)]
struct Cli {
    /// Data root directory (seeds and guideline live under it)
    #[arg(long, default_value = DataPaths::DEFAULT_ROOT, global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn raw option strings into persuasive descriptions
    Describe {
        /// Raw option strings, one per occurrence
        #[arg(short, long = "option", required = true)]
        options: Vec<String>,

        /// Decision context shown to the description service
        #[arg(long)]
        context: Option<String>,
    },

    /// Process one trial recording into a stored Seed
    Extract {
        /// Trial recording JSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List stored sessions and their seed counts
    Sessions,

    /// Attach the subject's ground truth to a Seed
    Label {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Option id within the session
        #[arg(short, long)]
        option: String,

        /// Preference score, 1 (hate) to 5 (love)
        #[arg(long)]
        score: u8,

        /// Subject's comment; prompted interactively when omitted on a TTY
        #[arg(long)]
        comment: Option<String>,

        /// Replace an existing label instead of keeping it
        #[arg(long)]
        overwrite: bool,

        /// Draft the expert analysis via the reasoning service
        #[arg(long)]
        draft: bool,
    },

    /// Bootstrap the diagnostic guideline from labeled Seeds
    Synthesize,

    /// Rank one session's options against the active guideline
    Judge {
        /// Session id
        #[arg(short, long)]
        session: String,
    },
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let paths = DataPaths::new(&cli.data_dir);

    match cli.command {
        Commands::Describe { options, context } => cmd_describe(&options, context.as_deref()),
        Commands::Extract { input } => cmd_extract(&paths, &input),
        Commands::Sessions => cmd_sessions(&paths),
        Commands::Label {
            session,
            option,
            score,
            comment,
            overwrite,
            draft,
        } => cmd_label(&paths, &session, &option, score, comment, overwrite, draft),
        Commands::Synthesize => cmd_synthesize(&paths),
        Commands::Judge { session } => cmd_judge(&paths, &session),
    }
}

fn cmd_describe(options: &[String], context: Option<&str>) -> Result<(), CliError> {
    let service = service_from_env()?;
    let contents = describe_options(&service, options, context)?;
    println!("{}", serde_json::to_string_pretty(&contents)?);
    Ok(())
}

fn cmd_extract(paths: &DataPaths, input: &PathBuf) -> Result<(), CliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };
    let recording: TrialRecording = serde_json::from_str(&data)?;

    let mut store = SeedStore::open(paths.seeds_dir()).map_err(PipelineError::from)?;
    let seed = FeatureExtractor::new().extract_and_store(&recording, &mut store)?;

    println!("stored seed {}", seed.key());
    println!("  interpretation: {}", seed.rule_based_interpretation);
    Ok(())
}

fn cmd_sessions(paths: &DataPaths) -> Result<(), CliError> {
    let store = SeedStore::open(paths.seeds_dir()).map_err(PipelineError::from)?;
    let sessions = store.sessions();
    if sessions.is_empty() {
        println!("no sessions stored");
        return Ok(());
    }
    for (session_id, count) in sessions {
        let labeled = store
            .get_session(&session_id)
            .map_err(PipelineError::from)?
            .iter()
            .filter(|s| s.is_labeled())
            .count();
        println!("{}  {} seeds, {} labeled", session_id, count, labeled);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_label(
    paths: &DataPaths,
    session: &str,
    option: &str,
    score: u8,
    comment: Option<String>,
    overwrite: bool,
    draft: bool,
) -> Result<(), CliError> {
    let comment = match comment {
        Some(c) => c,
        None => prompt_comment()?,
    };
    let policy = if overwrite {
        OverwritePolicy::Overwrite
    } else {
        OverwritePolicy::Skip
    };

    let mut store = SeedStore::open(paths.seeds_dir()).map_err(PipelineError::from)?;

    let outcome = if draft {
        let service = service_from_env()?;
        Labeler::with_service(&service).label(&mut store, session, option, score, &comment, policy)?
    } else {
        Labeler::new().label(&mut store, session, option, score, &comment, policy)?
    };

    match outcome {
        LabelOutcome::Labeled { replaced: false } => println!("labeled {}/{}", session, option),
        LabelOutcome::Labeled { replaced: true } => {
            println!("relabeled {}/{} (previous label replaced)", session, option)
        }
        LabelOutcome::AlreadyLabeled => {
            println!(
                "{}/{} already labeled; pass --overwrite to replace",
                session, option
            )
        }
    }
    Ok(())
}

fn cmd_synthesize(paths: &DataPaths) -> Result<(), CliError> {
    let service = service_from_env()?;
    let store = SeedStore::open(paths.seeds_dir()).map_err(PipelineError::from)?;
    let guidelines = GuidelineStore::new(paths.guideline_path());

    let report = GuidelineSynthesizer::new(&service).synthesize(&store, &guidelines)?;

    println!(
        "guideline written to {} ({} of {} cases used)",
        guidelines.path().display(),
        report.drafts_succeeded,
        report.cases_total
    );
    for key in &report.skipped {
        println!("  skipped {}", key);
    }
    Ok(())
}

fn cmd_judge(paths: &DataPaths, session: &str) -> Result<(), CliError> {
    let service = service_from_env()?;
    let store = SeedStore::open(paths.seeds_dir()).map_err(PipelineError::from)?;
    let guidelines = GuidelineStore::new(paths.guideline_path());

    let recommendation = Judge::new(&service).evaluate(&store, &guidelines, session)?;
    println!("{}", serde_json::to_string_pretty(&recommendation)?);
    Ok(())
}

fn service_from_env() -> Result<GeminiClient, CliError> {
    let config = ServiceConfig::from_env().map_err(PipelineError::from)?;
    GeminiClient::new(config).map_err(|e| CliError::Pipeline(e.into()))
}

/// Read the subject's comment from the terminal
fn prompt_comment() -> Result<String, CliError> {
    if !atty::is(atty::Stream::Stdin) {
        return Err(CliError::Input(
            "no --comment given and stdin is not a terminal".to_string(),
        ));
    }
    print!("comment> ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[derive(Debug)]
enum CliError {
    Io(io::Error),
    Json(serde_json::Error),
    Pipeline(PipelineError),
    Input(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "{}", e),
            CliError::Json(e) => write!(f, "{}", e),
            CliError::Pipeline(e) => write!(f, "{}", e),
            CliError::Input(m) => write!(f, "{}", m),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}
