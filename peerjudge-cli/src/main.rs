mod config;
mod output;
mod simulate;
mod store;

use clap::Parser;
use peerjudge_core::{
    DecisionStore, MemoryStore, QuotaPolicy, ResponseItem, SessionCoordinator, SessionKey,
};
use std::collections::HashMap;
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::output::SessionReport;
use crate::simulate::SimulationParams;
use crate::store::JsonlStore;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "peerjudge", version, about = "Adaptive pairwise scheduling for peer review")]
struct Cli {
    /// Show debug logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run synthetic reviewers through a session and report the outcome
    Simulate(SimulateArgs),
    /// Rebuild a session from a decision log and report its state
    Replay(ReplayArgs),
    /// Print the per-reviewer quota for a class size
    Quota(QuotaArgs),
    /// Create a default config file at ~/.config/peerjudge/config.toml
    Init,
}

#[derive(Parser)]
struct SessionArgs {
    /// Project identifier for the session key
    #[arg(long)]
    project: Option<String>,

    /// Question identifier for the session key
    #[arg(long)]
    question: Option<String>,

    /// Seed for pair selection
    #[arg(long)]
    seed: Option<u64>,

    /// Path to config file (default: ~/.config/peerjudge/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON instead of tables
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct SimulateArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Number of synthetic responses
    #[arg(long, default_value_t = 20)]
    responses: usize,

    /// Number of reviewers
    #[arg(long, default_value_t = 20)]
    reviewers: usize,

    /// Share of careless reviewers (always left, fast), 0.0 to 1.0
    #[arg(long, default_value_t = 0.1)]
    careless: f64,

    /// Max reviewers working at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Append decisions to this JSONL log (default: in-memory only)
    #[arg(long)]
    log: Option<PathBuf>,
}

#[derive(Parser)]
struct ReplayArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// File with one response per line, or a JSON array of strings.
    /// Response N (1-based) gets item ID N.
    #[arg(long)]
    responses: Option<PathBuf>,

    /// JSONL decision log to replay
    #[arg(long)]
    log: Option<PathBuf>,

    /// Reviewer roster (repeatable). Default: every reviewer found in the log
    #[arg(long = "reviewer")]
    reviewers: Vec<String>,
}

#[derive(Parser)]
struct QuotaArgs {
    /// Number of responses to the question
    #[arg(long)]
    responses: usize,

    /// Number of reviewers
    #[arg(long)]
    reviewers: usize,

    /// Path to config file (default: ~/.config/peerjudge/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Parse a string as either a JSON array of strings or plain text (one item per line).
fn parse_items_from_str(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        let items: Vec<String> = serde_json::from_str(trimmed)
            .unwrap_or_else(|e| bail(format!("File looks like JSON but failed to parse: {e}")));
        items.into_iter().filter(|s| !s.trim().is_empty()).collect()
    } else {
        trimmed
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Turn response texts into items with IDs 1..=N.
fn to_response_items(texts: Vec<String>, question_id: &str) -> Vec<ResponseItem> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| ResponseItem {
            id: i as i64 + 1,
            owner_code: format!("S{:03}", i + 1),
            text,
            question_id: question_id.to_string(),
        })
        .collect()
}

/// Load responses from --responses file, or stdin when piped.
fn load_responses(path: Option<&PathBuf>) -> Vec<String> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
            bail(format!("Failed to read responses file {}: {e}", path.display()))
        }),
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                bail("No responses provided. Use --responses <file> or pipe responses via stdin.");
            }
            stdin
                .lock()
                .lines()
                .map(|l| l.unwrap_or_else(|e| bail(format!("Failed to read from stdin: {e}"))))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };

    let items = parse_items_from_str(&content);
    if items.len() < 2 {
        bail(format!("Need at least 2 responses to compare, got {}", items.len()));
    }
    items
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("peerjudge_core=debug,peerjudge=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate(args) => run_simulate(args).await,
        Commands::Replay(args) => run_replay(args),
        Commands::Quota(args) => {
            let config_path = args.config.clone().unwrap_or_else(config::config_path);
            let cfg = config::load_config(&config_path);
            let policy: QuotaPolicy = cfg.session_config(0).quota;
            println!("{}", policy.compute_quota(args.responses, args.reviewers));
        }
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set your default project, quota bounds, etc.");
        }
    }
}

/// Resolve the session key and coordinator settings: CLI arg > config file > default.
fn resolve_session(args: &SessionArgs) -> (config::PeerjudgeConfig, SessionKey, u64) {
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    let project = args
        .project
        .clone()
        .or(cfg.project.clone())
        .unwrap_or_else(|| "default".to_string());
    let question = args
        .question
        .clone()
        .or(cfg.question.clone())
        .unwrap_or_else(|| "q1".to_string());
    let seed = args.seed.or(cfg.seed).unwrap_or(0);

    (cfg, SessionKey::new(project, question), seed)
}

fn report(
    coordinator: &SessionCoordinator,
    key: &SessionKey,
    responses: &[ResponseItem],
    json: bool,
) {
    let texts: HashMap<i64, &str> = responses.iter().map(|r| (r.id, r.text.as_str())).collect();
    let report = SessionReport::collect(coordinator, key, |id| {
        texts.get(&id).map(|t| t.to_string()).unwrap_or_default()
    })
    .unwrap_or_else(|e| bail(e));

    if json {
        output::print_json(&report);
    } else {
        output::print_table(&report);
    }
}

async fn run_simulate(args: SimulateArgs) {
    let (cfg, key, seed) = resolve_session(&args.session);

    if !(0.0..=1.0).contains(&args.careless) {
        bail("--careless must be between 0.0 and 1.0");
    }
    if args.responses < 2 {
        bail(format!("Need at least 2 responses to compare, got {}", args.responses));
    }

    let log_path = args.log.clone().or(cfg.log.as_ref().map(PathBuf::from));
    let store: Arc<dyn DecisionStore> = match &log_path {
        Some(path) => Arc::new(
            JsonlStore::open(path)
                .unwrap_or_else(|e| bail(format!("Failed to open log {}: {e}", path.display()))),
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let params = SimulationParams {
        responses: args.responses,
        reviewers: args.reviewers,
        careless_share: args.careless,
        concurrency: args.concurrency.or(cfg.concurrency).unwrap_or(16),
        seed,
    };
    let class = simulate::build_class(&params, &key.question_id);

    let coordinator = Arc::new(SessionCoordinator::new(store, cfg.session_config(seed)));
    let info = coordinator
        .open_session(&key, &class.responses, &class.reviewer_ids)
        .unwrap_or_else(|e| bail(e));

    if !args.session.json {
        eprintln!(
            "Simulating {} reviewers over {} responses (quota {} each, {} already in log)",
            class.reviewer_ids.len(),
            class.responses.len(),
            info.per_reviewer_quota,
            info.replay.applied,
        );
    }

    simulate::run_reviewers(coordinator.clone(), &key, &class, &params)
        .await
        .unwrap_or_else(|e| bail(e));
    simulate::apply_trust_policy(&coordinator, &key).unwrap_or_else(|e| bail(e));

    report(&coordinator, &key, &class.responses, args.session.json);
}

fn run_replay(args: ReplayArgs) {
    let (cfg, key, seed) = resolve_session(&args.session);

    let log_path = args
        .log
        .clone()
        .or(cfg.log.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| {
            bail("No decision log specified. Pass --log or set it in the config file.")
        });
    let store = JsonlStore::open(&log_path)
        .unwrap_or_else(|e| bail(format!("Failed to open log {}: {e}", log_path.display())));

    let responses = to_response_items(load_responses(args.responses.as_ref()), &key.question_id);

    let reviewers = if args.reviewers.is_empty() {
        let history = store.load(&key).unwrap_or_else(|e| bail(e));
        let mut seen = Vec::new();
        for decision in history {
            if !seen.contains(&decision.reviewer_id) {
                seen.push(decision.reviewer_id);
            }
        }
        if seen.is_empty() {
            bail(format!("No decisions for session {key} in {}", log_path.display()));
        }
        seen
    } else {
        args.reviewers.clone()
    };

    let coordinator = SessionCoordinator::new(Arc::new(store), cfg.session_config(seed));
    let info = coordinator
        .open_session(&key, &responses, &reviewers)
        .unwrap_or_else(|e| bail(e));
    if info.replay.skipped > 0 {
        eprintln!(
            "Warning: {} logged decisions did not match this response set or roster \
             and were skipped",
            info.replay.skipped
        );
    }

    report(&coordinator, &key, &responses, args.session.json);
}
