//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{ColoredString, Colorize, control};
use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;

use artifact_reputation_scanner::core::config::Config;
use artifact_reputation_scanner::core::errors::ArsError;
use artifact_reputation_scanner::scanner::hasher;
use artifact_reputation_scanner::scanner::lists::{ListKind, ListStore};
use artifact_reputation_scanner::scanner::model::{
    Artifact, Disposition, EngineCategory, Judgement, ScanResult,
};
use artifact_reputation_scanner::scanner::session::{
    ScanOptions, SessionObserver, SessionOutcome, run_scan,
};

/// Artifact Reputation Scanner: look up downloaded packages by fingerprint and
/// sort them by verdict.
#[derive(Debug, Parser)]
#[command(
    name = "arscan",
    author,
    version,
    about = "Artifact Reputation Scanner - fingerprint, look up, and sort downloaded packages",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors and the final summary only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan source directories and sort artifacts by verdict.
    Scan(ScanArgs),
    /// Manage the allow-list (patterns whose detections are ignored).
    Allow(ListArgs),
    /// Manage the deny-list (patterns whose detections force infected).
    Deny(ListArgs),
    /// Show both detection lists.
    Lists,
    /// Print SHA-256 fingerprints without contacting the lookup service.
    Hash(HashArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ScanArgs {
    /// Directories to scan instead of `scan.directories`.
    #[arg(value_name = "DIR")]
    directories: Vec<PathBuf>,
    /// Never submit unknown artifacts; they stay put as `unknown`.
    #[arg(long)]
    no_upload: bool,
    /// Seconds to wait between artifacts (overrides `scan.pacing_secs`).
    #[arg(long, value_name = "SECONDS")]
    pacing_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// List operation to run.
    #[command(subcommand)]
    command: ListCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ListCommand {
    /// Add a pattern; words are joined with spaces.
    Add {
        #[arg(required = true, num_args = 1.., value_name = "PATTERN")]
        words: Vec<String>,
    },
    /// Remove a pattern; words are joined with spaces.
    Remove {
        #[arg(required = true, num_args = 1.., value_name = "PATTERN")]
        words: Vec<String>,
    },
    /// Print every pattern.
    List,
    /// Remove every pattern.
    Clear,
}

#[derive(Debug, Clone, Args)]
struct HashArgs {
    /// Files to fingerprint.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective configuration (API key redacted).
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<ArsError> for CliError {
    fn from(err: ArsError) -> Self {
        match err {
            ArsError::InvalidConfig { .. }
            | ArsError::MissingConfig { .. }
            | ArsError::ConfigParse { .. }
            | ArsError::InvalidPattern { .. } => Self::User(err.to_string()),
            ArsError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Scan(args) => run_scan_command(cli, args),
        Command::Allow(args) => run_list(cli, ListKind::Allow, args),
        Command::Deny(args) => run_list(cli, ListKind::Deny, args),
        Command::Lists => run_lists(cli),
        Command::Hash(args) => run_hash(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── scan ────────────────────

/// Console progress. The lock keeps lines from interleaving if artifacts are
/// ever processed concurrently.
struct ConsoleObserver {
    verbosity: Verbosity,
    console: Mutex<()>,
}

impl ConsoleObserver {
    fn say(&self, line: &str) {
        let _guard = self.console.lock();
        println!("{line}");
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_start(&self, session_id: &str, candidates: usize) {
        if self.verbosity != Verbosity::Quiet {
            self.say(&format!(
                "{} session {session_id}: {candidates} candidate(s)",
                "Scanning".bold()
            ));
        }
    }

    fn on_artifact_start(&self, index: usize, total: usize, artifact: &Artifact) {
        if self.verbosity != Verbosity::Quiet {
            self.say(&format!(
                "\n[{index}/{total}] {} ({})",
                artifact.name.as_str().bold(),
                format_bytes(artifact.size_bytes)
            ));
        }
    }

    fn on_backoff(&self, _artifact: &Artifact, retry: u32, wait: Duration) {
        if self.verbosity != Verbosity::Quiet {
            self.say(&format!(
                "  {}",
                format!("rate limited; retry {retry} in {}", format_duration(wait))
                    .as_str()
                    .yellow()
            ));
        }
    }

    fn on_artifact_done(&self, result: &ScanResult) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        let mut lines = Vec::new();
        if self.verbosity == Verbosity::Verbose
            && let Some(fp) = &result.fingerprint
        {
            lines.push(format!("  sha256 {fp}"));
        }
        let mut headline = format!("  -> {}", paint_disposition(result.disposition));
        if result.total > 0 {
            headline.push_str(&format!(
                "  {} malicious, {} suspicious of {}",
                result.malicious, result.suspicious, result.total
            ));
        }
        if let Some(reason) = &result.reason {
            headline.push_str(&format!("  ({reason})"));
        }
        lines.push(headline);
        for d in &result.detections {
            if d.judgement == Judgement::NotEvaluated && self.verbosity != Verbosity::Verbose {
                continue;
            }
            let bucket = match d.verdict.category {
                EngineCategory::Malicious => "malicious",
                _ => "suspicious",
            };
            lines.push(format!(
                "     [{bucket}] {} - {}",
                d.verdict.detection_string(),
                paint_judgement(d.judgement)
            ));
        }
        if !result.sandbox.is_empty() {
            lines.push(format!("     {} sandbox verdict(s)", result.sandbox.len()));
        }
        for error in &result.errors {
            lines.push(format!("     {}", error.as_str().red()));
        }
        if self.verbosity == Verbosity::Verbose
            && let Some(path) = &result.final_path
        {
            lines.push(format!("     moved to {}", path.display()));
        }
        self.say(&lines.join("\n"));
    }

    fn on_pacing(&self, wait: Duration) {
        if self.verbosity == Verbosity::Verbose {
            self.say(&format!("  waiting {} before next lookup", format_duration(wait)));
        }
    }
}

/// Observer for JSON mode: the single document is printed at the end.
struct QuietObserver;

impl SessionObserver for QuietObserver {}

fn run_scan_command(cli: &Cli, args: &ScanArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let options = ScanOptions {
        directories: args.directories.clone(),
        no_upload: args.no_upload,
        pacing_secs: args.pacing_secs,
    };
    let mode = output_mode(cli);
    let started = Instant::now();

    let outcome = match mode {
        OutputMode::Human => run_scan(
            &config,
            &options,
            &ConsoleObserver {
                verbosity: verbosity(cli),
                console: Mutex::new(()),
            },
        )?,
        OutputMode::Json => run_scan(&config, &options, &QuietObserver)?,
    };

    match mode {
        OutputMode::Human => print_scan_summary(&outcome, started.elapsed()),
        OutputMode::Json => {
            let payload = json!({
                "command": "scan",
                "summary": serde_json::to_value(&outcome.summary)?,
                "results": serde_json::to_value(&outcome.results)?,
                "skipped_directories": outcome
                    .skipped_dirs
                    .iter()
                    .map(|s| json!({"path": s.path.to_string_lossy(), "reason": s.reason}))
                    .collect::<Vec<_>>(),
                "transport_fallback": outcome.transport_fallback,
                "summary_path": outcome.summary_path.to_string_lossy(),
                "failed_path": outcome.failed_path.as_ref().map(|p| p.to_string_lossy()),
                "log_path": outcome.log_path.to_string_lossy(),
            });
            write_json_line(&payload)?;
        }
    }

    let failures = outcome.summary.counts.failures();
    if failures > 0 {
        return Err(CliError::Partial(format!(
            "{failures} artifact(s) could not be resolved; see {}",
            outcome
                .failed_path
                .as_deref()
                .unwrap_or(outcome.summary_path.as_path())
                .display()
        )));
    }
    Ok(())
}

fn print_scan_summary(outcome: &SessionOutcome, elapsed: Duration) {
    let summary = &outcome.summary;
    println!();
    println!("{}", "=".repeat(50));
    println!(
        "{} {} artifact(s) in {}",
        "Scan complete:".bold(),
        summary.counts.total(),
        format_duration(elapsed)
    );
    for disposition in Disposition::ALL {
        println!(
            "  {:<14} {}",
            paint_disposition(disposition),
            summary.counts.get(disposition)
        );
    }

    let usage = &summary.usage;
    println!();
    println!("{}", "Transport usage:".bold());
    if let Some(reason) = &outcome.transport_fallback {
        println!(
            "  {}",
            format!("managed client unavailable: {reason}").as_str().yellow()
        );
    }
    println!(
        "  managed: {} ({:.1}%)  raw: {} ({:.1}%)",
        usage.managed_calls,
        usage.managed_pct(),
        usage.raw_calls,
        usage.raw_pct()
    );
    println!(
        "  sandbox analyses: {}  errors: {}  rate limits: {}",
        usage.sandbox_analyses, usage.errors, usage.rate_limits
    );

    println!();
    println!("{}", "Organized files:".bold());
    for dir in &summary.organized {
        println!("  {:<10} {:>5}  {}", dir.label, dir.files, dir.path.display());
    }

    for skipped in &outcome.skipped_dirs {
        eprintln!(
            "{}",
            format!("skipped {}: {}", skipped.path.display(), skipped.reason)
                .as_str()
                .yellow()
        );
    }
    println!();
    println!("Summary: {}", outcome.summary_path.display());
    if let Some(failed) = &outcome.failed_path {
        println!("Failed:  {}", failed.display());
    }
    println!("Log:     {}", outcome.log_path.display());
}

fn paint_disposition(disposition: Disposition) -> ColoredString {
    let upper = disposition.as_str().to_uppercase();
    let label = upper.as_str();
    match disposition {
        Disposition::Clean => label.green().bold(),
        Disposition::Infected => label.red().bold(),
        Disposition::TooLarge => label.magenta(),
        Disposition::Pending => label.cyan(),
        Disposition::UploadFailed | Disposition::Unknown => label.yellow(),
    }
}

fn paint_judgement(judgement: Judgement) -> ColoredString {
    let label = judgement.as_label();
    match judgement {
        Judgement::Allowed | Judgement::Safe => label.green(),
        Judgement::Denied | Judgement::Malicious => label.red(),
        Judgement::Ambiguous => label.yellow(),
        Judgement::NotEvaluated => label.dimmed(),
    }
}

// ──────────────────── detection lists ────────────────────

fn open_list_store(cli: &Cli) -> Result<ListStore, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    Ok(ListStore::open(&config.lists)?)
}

fn run_list(cli: &Cli, kind: ListKind, args: &ListArgs) -> Result<(), CliError> {
    let mut store = open_list_store(cli)?;
    let list = kind.as_str();
    let mode = output_mode(cli);

    match &args.command {
        ListCommand::Add { words } => {
            let pattern = words.join(" ");
            let added = store.add(kind, &pattern)?;
            let pattern = pattern.trim();
            match mode {
                OutputMode::Human => {
                    if added {
                        println!("Added to {list} list: {pattern}");
                    } else {
                        println!("Already in {list} list: {pattern}");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": format!("{list} add"),
                    "list": list,
                    "pattern": pattern,
                    "added": added,
                }))?,
            }
        }
        ListCommand::Remove { words } => {
            let pattern = words.join(" ");
            let removed = store.remove(kind, &pattern)?;
            let pattern = pattern.trim();
            match mode {
                OutputMode::Human => {
                    if removed {
                        println!("Removed from {list} list: {pattern}");
                    } else {
                        println!("Not in {list} list: {pattern}");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": format!("{list} remove"),
                    "list": list,
                    "pattern": pattern,
                    "removed": removed,
                }))?,
            }
        }
        ListCommand::List => {
            let patterns: Vec<&str> = store.lists().get(kind).iter().collect();
            match mode {
                OutputMode::Human => print_pattern_list(list, &patterns),
                OutputMode::Json => write_json_line(&json!({
                    "command": format!("{list} list"),
                    "list": list,
                    "file": store.file_for(kind).to_string_lossy(),
                    "patterns": patterns,
                }))?,
            }
        }
        ListCommand::Clear => {
            let removed = store.clear(kind)?;
            match mode {
                OutputMode::Human => println!("Cleared {list} list ({removed} pattern(s) removed)"),
                OutputMode::Json => write_json_line(&json!({
                    "command": format!("{list} clear"),
                    "list": list,
                    "removed": removed,
                }))?,
            }
        }
    }
    Ok(())
}

fn run_lists(cli: &Cli) -> Result<(), CliError> {
    let store = open_list_store(cli)?;
    let allow: Vec<&str> = store.lists().allow.iter().collect();
    let deny: Vec<&str> = store.lists().deny.iter().collect();
    match output_mode(cli) {
        OutputMode::Human => {
            print_pattern_list("allow", &allow);
            println!();
            print_pattern_list("deny", &deny);
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "lists",
            "allow": allow,
            "deny": deny,
        }))?,
    }
    Ok(())
}

fn print_pattern_list(list: &str, patterns: &[&str]) {
    println!("{} ({}):", format!("{list} list").as_str().bold(), patterns.len());
    if patterns.is_empty() {
        println!("  (empty)");
    }
    for (i, pattern) in patterns.iter().enumerate() {
        println!("  {:>3}. {pattern}", i + 1);
    }
}

// ──────────────────── hash ────────────────────

fn run_hash(cli: &Cli, args: &HashArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let mut rows = Vec::new();
    let mut failures = 0usize;

    for path in &args.files {
        match hasher::fingerprint(path) {
            Ok(digest) => {
                if mode == OutputMode::Human {
                    println!("{digest}  {}", path.display());
                }
                rows.push(json!({"path": path.to_string_lossy(), "sha256": digest}));
            }
            Err(e) => {
                failures += 1;
                if mode == OutputMode::Human {
                    eprintln!("{}", e.to_string().as_str().red());
                }
                rows.push(json!({"path": path.to_string_lossy(), "error": e.to_string()}));
            }
        }
    }

    if mode == OutputMode::Json {
        write_json_line(&json!({"command": "hash", "files": rows}))?;
    }
    match failures {
        0 => Ok(()),
        n if n == args.files.len() => Err(CliError::Runtime("no file could be fingerprinted".to_string())),
        n => Err(CliError::Partial(format!("{n} file(s) could not be fingerprinted"))),
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = redacted(Config::load(cli.config.as_deref())?);

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                let key_present = config.api_key().is_ok();

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                        if !key_present {
                            println!(
                                "  {}",
                                format!("API key not set (export {})", config.api.key_env)
                                    .as_str()
                                    .yellow()
                            );
                        }
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                            "api_key_present": key_present,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn redacted(mut config: Config) -> Config {
    if !config.api.key.is_empty() {
        config.api.key = "<redacted>".to_string();
    }
    config
}

// ──────────────────── output helpers ────────────────────

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("arscan {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "arscan",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

const fn verbosity(cli: &Cli) -> Verbosity {
    if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ARS_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
