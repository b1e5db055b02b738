//! # Code Review Assistant (cra)
//!
//! A CLI front end for a remote Java code-review service. Source text is
//! pasted on stdin or passed as files, sent to the review backend in a single
//! blocking request per input, and the structured findings are rendered as a
//! terminal report together with a side-by-side diff of the improved code.
//!
//! ## Key Components
//!
//! - **Backend Client**: one `POST {"code": ...}` per input with a fixed
//!   timeout. Non-200 statuses and transport failures map to [`SubmitError`].
//! - **Result Model**: the five finding lists plus the optional improved code.
//! - **Diff Renderer**: line-level alignment of the original and improved
//!   text, classified as unchanged/added/removed/changed, with context
//!   windowing and side-by-side, unified and HTML output.
//! - **Rule-Match Reporter**: keyword matching of the validation rule catalog
//!   against the reported findings.
//!
//! ## Flow
//!
//! ```text
//! stdin / FILE... → decode (lossy) → submit → AnalysisResult
//!                                               ↓
//!                        findings report ← DiffTable ← improved code (or original)
//!                                               ↓
//!                                   rule matches (keyword heuristic)
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | General error (I/O error, backend failure, failed file in a batch) |
//! | 2 | Invalid command-line arguments or configuration |
//! | 3 | `--check` mode: findings were reported |
//! | 4 | Empty input: nothing to send to the backend |
//! | 5 | Login required or rejected |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::{Context, Result};
use clap::ValueEnum;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rich_rust::terminal;
use rich_rust::{ColorSystem, Console};
use serde::{Deserialize, Deserializer, Serialize};
use similar::{Algorithm, DiffTag, TextDiff};
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// ─────────────────────────────────────────────────────────────────────────────
// Exit Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic exit codes for scripting and CI integration
mod exit_codes {
    /// Success - completed without errors
    pub const SUCCESS: i32 = 0;
    /// General error (I/O error, backend failure, failed file in a batch)
    pub const ERROR: i32 = 1;
    /// Invalid command-line arguments or configuration
    pub const INVALID_ARGS: i32 = 2;
    /// Check mode: at least one finding was reported
    pub const FINDINGS: i32 = 3;
    /// Every input was empty, nothing was sent to the backend
    pub const EMPTY_INPUT: i32 = 4;
    /// Login gate enabled and credentials missing or rejected
    pub const LOGIN_REQUIRED: i32 = 5;
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ArgError(String);

#[derive(Debug, thiserror::Error)]
#[error("{count} input(s) had no source text: {names}")]
struct EmptyInputError {
    count: usize,
    names: String,
}

#[derive(Debug)]
struct RunOutcome {
    check: bool,
    findings: usize,
}

fn error_chain_has<T: std::error::Error + 'static>(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<T>())
}

fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    if error_chain_has::<ArgError>(err) {
        exit_codes::INVALID_ARGS
    } else if error_chain_has::<EmptyInputError>(err) {
        exit_codes::EMPTY_INPUT
    } else if error_chain_has::<LoginError>(err) {
        exit_codes::LOGIN_REQUIRED
    } else {
        exit_codes::ERROR
    }
}

/// Render an error and its sources as a single line ("outer: inner: root").
fn error_message(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

// ─────────────────────────────────────────────────────────────────────────────
// CLI Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Default review endpoint of the backend service
const DEFAULT_BACKEND_URL: &str = "http://localhost:8080/api/review";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// File types accepted for review when recursing into directories
const DEFAULT_GLOB: &str = "*.java,*.txt,*.xml,*.json,*.properties";

/// Default unchanged lines shown around each change
const DEFAULT_CONTEXT_LINES: usize = 3;

/// Default diff column width
const DEFAULT_WRAP_COLUMN: usize = 80;

/// Environment variable holding the tracing filter
const LOG_ENV: &str = "CRA_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum DiffStyle {
    /// Original and improved text in two aligned columns
    SideBySide,
    /// Classic unified diff with @@ hunk headers
    Unified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ColorMode {
    /// Auto-detect color support
    Auto,
    /// Always emit colors (even when not a TTY)
    Always,
    /// Never emit colors
    Never,
}

/// Report sections that can be selected with `--section`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Section {
    /// Bugs found
    Bugs,
    /// Security issues
    Security,
    /// Code smells
    Smells,
    /// Suggestions
    Suggestions,
    /// Custom validation findings
    Custom,
    /// Differences between original and improved code
    Diff,
    /// Final improved code, in full
    Improved,
    /// Validation rules triggered by the findings
    Rules,
}

/// Code Review Assistant: reviews Java sources through a remote analysis backend
#[derive(Parser, Debug)]
#[command(
    name = "cra",
    version,
    about,
    long_about = None,
    after_help = "EXIT CODES:\n  0  Success\n  1  General error (I/O error, backend failure, failed file in a batch)\n  2  Invalid command-line arguments or configuration\n  3  Check mode: findings were reported\n  4  Empty input: nothing to send to the backend\n  5  Login required or rejected\n"
)]
struct Args {
    /// Source file(s) to review. Reads pasted code from stdin if not provided.
    /// Multiple files are reviewed one after another.
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Path to config file (default: search for .crarc)
    #[arg(long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Ignore config files
    #[arg(long = "no-config")]
    no_config: bool,

    /// Review backend endpoint
    #[arg(long, value_name = "URL", env = "CRA_BACKEND_URL")]
    backend_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long = "timeout", value_name = "SECS", env = "CRA_TIMEOUT")]
    timeout_secs: Option<u64>,

    /// Review files recursively in directories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Glob pattern to match files when recursing (comma-separated) [default: *.java,*.txt,*.xml,*.json,*.properties]
    #[arg(long, requires = "recursive")]
    glob: Option<String>,

    /// Do not respect .gitignore when recursing
    #[arg(long = "no-gitignore", requires = "recursive")]
    no_gitignore: bool,

    /// Maximum directory depth (0 = unlimited) [default: 0]
    #[arg(long, requires = "recursive")]
    max_depth: Option<usize>,

    /// Unchanged lines of context shown around each change [default: 3]
    #[arg(short = 'C', long = "context", global = true)]
    context_lines: Option<usize>,

    /// Show the complete diff without collapsing unchanged lines
    #[arg(long, global = true)]
    full_diff: bool,

    /// Wrap diff columns at this width (0 = no wrapping) [default: 80]
    #[arg(short = 'W', long = "wrap", global = true)]
    wrap_column: Option<usize>,

    /// Diff layout [default: side-by-side]
    #[arg(long, value_enum, global = true)]
    diff_style: Option<DiffStyle>,

    /// Report replaced lines as removed + added instead of pairing them as changed
    #[arg(long = "no-pair", global = true)]
    no_pair: bool,

    /// Only print these report sections (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    section: Vec<Section>,

    /// Verbose output showing review progress
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Color output: auto, always, or never [default: auto]
    #[arg(long, value_enum, global = true)]
    color: Option<ColorMode>,

    /// Output results as JSON (one object per input) for programmatic processing
    #[arg(long, conflicts_with_all = ["verbose", "section"])]
    json: bool,

    /// Also write a standalone HTML report to this file
    #[arg(long, value_name = "FILE", global = true)]
    html: Option<PathBuf>,

    /// Exit with code 3 when any finding is reported
    #[arg(long)]
    check: bool,

    /// Require APP_USERNAME / APP_PASSWORD credentials before reviewing
    #[arg(long)]
    login: bool,

    /// Username for the login gate
    #[arg(long, env = "CRA_USERNAME")]
    username: Option<String>,

    /// Password for the login gate
    #[arg(long, env = "CRA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Subcommand (rule catalog, local diff, configuration)
    #[command(subcommand)]
    command: Option<Commands>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// List the validation rule catalog and the keyword derived from each rule
    Rules,
    /// Diff two local files without contacting the backend
    Diff {
        /// Original file
        original: PathBuf,
        /// Improved file
        improved: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config management actions
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Initialize a new .crarc config file
    Init {
        /// Create in home directory instead of current
        #[arg(long)]
        global: bool,
    },
    /// Show effective configuration (merged file + environment + CLI)
    Show,
    /// Show path to active config file
    Path,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration derived from CLI args, environment and config file
#[derive(Debug, Clone)]
struct Config {
    backend_url: String,
    timeout_secs: u64,
    context_lines: usize,
    full_diff: bool,
    wrap_column: usize,
    diff_style: DiffStyle,
    pair_changes: bool,
    sections: Vec<Section>,
    recursive: bool,
    glob: String,
    gitignore: bool,
    max_depth: usize,
    color: ColorMode,
    verbose: bool,
    json: bool,
    html: Option<PathBuf>,
    check: bool,
    login: bool,
    rules: Option<Vec<String>>,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            backend_url: args
                .backend_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            timeout_secs: args.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            context_lines: args.context_lines.unwrap_or(DEFAULT_CONTEXT_LINES),
            full_diff: args.full_diff,
            wrap_column: args.wrap_column.unwrap_or(DEFAULT_WRAP_COLUMN),
            diff_style: args.diff_style.unwrap_or(DiffStyle::SideBySide),
            pair_changes: !args.no_pair,
            sections: args.section.clone(),
            recursive: args.recursive,
            glob: args
                .glob
                .clone()
                .unwrap_or_else(|| DEFAULT_GLOB.to_string()),
            gitignore: !args.no_gitignore,
            max_depth: args.max_depth.unwrap_or(0),
            color: args.color.unwrap_or(ColorMode::Auto),
            verbose: args.verbose,
            json: args.json,
            html: args.html.clone(),
            check: args.check,
            login: args.login,
            rules: None,
        }
    }
}

impl Config {
    /// Context radius for the diff, `None` meaning the full diff
    fn diff_context(&self) -> Option<usize> {
        if self.full_diff {
            None
        } else {
            Some(self.context_lines)
        }
    }

    fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            pair_changes: self.pair_changes,
        }
    }

    fn shows(&self, section: Section) -> bool {
        self.sections.is_empty() || self.sections.contains(&section)
    }

    /// The validation rule catalog for this run: the config file's `rules`
    /// list when present, the built-in catalog otherwise.
    fn rule_catalog(&self) -> Vec<ValidationRule> {
        match &self.rules {
            Some(labels) => labels.iter().map(ValidationRule::new).collect(),
            None => builtin_rules(),
        }
    }
}

/// Config file names searched in order
const CONFIG_FILENAMES: &[&str] = &[".crarc", ".crarc.toml", "crarc.toml"];

/// Configuration loaded from a .crarc file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    /// Review backend endpoint
    backend_url: Option<String>,
    /// Request timeout in seconds
    timeout_secs: Option<u64>,
    /// Context lines around each change
    context_lines: Option<usize>,
    /// Never collapse unchanged lines
    full_diff: Option<bool>,
    /// Wrap column for the side-by-side diff
    wrap_column: Option<usize>,
    /// Diff layout
    diff_style: Option<DiffStyle>,
    /// Pair similar replaced lines as changed
    pair_changes: Option<bool>,
    /// Show verbose output
    verbose: Option<bool>,
    /// Color mode: auto, always, never
    color: Option<ColorMode>,
    /// Output as JSON
    json: Option<bool>,
    /// Enable recursive mode
    recursive: Option<bool>,
    /// Glob patterns for recursive mode
    glob: Option<String>,
    /// Respect .gitignore
    gitignore: Option<bool>,
    /// Maximum directory depth
    max_depth: Option<usize>,
    /// Replacement validation rule catalog
    rules: Option<Vec<String>>,
    /// Require login credentials
    login: Option<bool>,
}

/// Search for a config file starting from the given directory
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    // Search up the directory tree
    loop {
        for filename in CONFIG_FILENAMES {
            let config_path = current.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        for filename in CONFIG_FILENAMES {
            let config_path = home.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }
    }

    None
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Directory where config file discovery starts for the given args
fn config_search_dir(args: &Args) -> PathBuf {
    args.inputs
        .first()
        .and_then(|p| {
            if p.is_dir() {
                Some(p.clone())
            } else {
                p.parent().map(|p| p.to_path_buf())
            }
        })
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

/// Create Config by merging the config file under environment and CLI args
fn create_config(args: &Args) -> Result<Config> {
    let mut config = Config::from(args);

    // Skip config file loading if --no-config is set
    if args.no_config {
        return Ok(config);
    }

    let config_path = if let Some(ref path) = args.config_file {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        Some(path.clone())
    } else {
        find_config_file(&config_search_dir(args))
    };

    if let Some(path) = config_path {
        debug!(path = %path.display(), "loading config file");
        let file_config = load_config_file(&path)?;
        apply_file_config(&mut config, args, file_config);
    }

    Ok(config)
}

/// Fill in values the command line (or environment) did not set
fn apply_file_config(config: &mut Config, args: &Args, file_config: FileConfig) {
    // backend_url / timeout: CLI and environment both arrive through Args
    if args.backend_url.is_none() {
        if let Some(url) = file_config.backend_url {
            config.backend_url = url;
        }
    }

    if args.timeout_secs.is_none() {
        if let Some(secs) = file_config.timeout_secs {
            config.timeout_secs = secs;
        }
    }

    if args.context_lines.is_none() {
        if let Some(lines) = file_config.context_lines {
            config.context_lines = lines;
        }
    }

    if !args.full_diff {
        if let Some(full) = file_config.full_diff {
            config.full_diff = full;
        }
    }

    if args.wrap_column.is_none() {
        if let Some(wrap) = file_config.wrap_column {
            config.wrap_column = wrap;
        }
    }

    if args.diff_style.is_none() {
        if let Some(style) = file_config.diff_style {
            config.diff_style = style;
        }
    }

    if !args.no_pair {
        if let Some(pair) = file_config.pair_changes {
            config.pair_changes = pair;
        }
    }

    if !args.verbose {
        if let Some(v) = file_config.verbose {
            config.verbose = v;
        }
    }

    if args.color.is_none() {
        if let Some(c) = file_config.color {
            config.color = c;
        }
    }

    if !args.json {
        if let Some(j) = file_config.json {
            config.json = j;
        }
    }

    // Recursive options
    if !args.recursive {
        if let Some(r) = file_config.recursive {
            config.recursive = r;
        }
    }

    if args.glob.is_none() {
        if let Some(g) = file_config.glob {
            config.glob = g;
        }
    }

    if !args.no_gitignore {
        if let Some(gi) = file_config.gitignore {
            config.gitignore = gi;
        }
    }

    if args.max_depth.is_none() {
        if let Some(d) = file_config.max_depth {
            config.max_depth = d;
        }
    }

    if !args.login {
        if let Some(login) = file_config.login {
            config.login = login;
        }
    }

    config.rules = file_config.rules;
}

/// Default config file content
const DEFAULT_CONFIG: &str = r#"# .crarc - cra configuration file

# Review backend endpoint (CRA_BACKEND_URL and --backend-url take precedence)
backend_url = "http://localhost:8080/api/review"

# Request timeout in seconds (CRA_TIMEOUT and --timeout take precedence)
timeout_secs = 120

# Diff presentation
context_lines = 3
wrap_column = 80
# diff_style = "side-by-side"   # or "unified"
# full_diff = false
# pair_changes = true

# Output options
# verbose = false
# color = "auto"
# json = false

# Recursive mode defaults
# recursive = false
# glob = "*.java,*.txt,*.xml,*.json,*.properties"
# gitignore = true
# max_depth = 0

# Replace the built-in validation rule catalog.
# The text before " — " is the keyword matched against findings.
# rules = [
#     "Avoid System.out.println — use a proper logger.",
# ]

# Require APP_USERNAME / APP_PASSWORD credentials (--username, CRA_PASSWORD)
# login = false
"#;

/// Handle the config subcommand
fn run_config_command(args: &Args, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { global } => {
            let path = if *global {
                dirs::home_dir()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                    .join(".crarc")
            } else {
                PathBuf::from(".crarc")
            };

            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file already exists: {}",
                    path.display()
                ));
            }

            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to create config file: {}", path.display()))?;

            eprintln!("Created config file: {}", path.display());
            Ok(())
        }

        ConfigAction::Show => {
            let config = create_config(args)?;

            eprintln!("Effective configuration:");
            eprintln!("  backend_url: {}", config.backend_url);
            eprintln!("  timeout_secs: {}", config.timeout_secs);
            eprintln!("  context_lines: {}", config.context_lines);
            eprintln!("  full_diff: {}", config.full_diff);
            eprintln!("  wrap_column: {}", config.wrap_column);
            eprintln!("  diff_style: {:?}", config.diff_style);
            eprintln!("  pair_changes: {}", config.pair_changes);
            eprintln!("  verbose: {}", config.verbose);
            eprintln!("  color: {:?}", config.color);
            eprintln!("  json: {}", config.json);
            eprintln!("  recursive: {}", config.recursive);
            eprintln!("  glob: {}", config.glob);
            eprintln!("  gitignore: {}", config.gitignore);
            eprintln!("  max_depth: {}", config.max_depth);
            eprintln!("  login: {}", config.login);
            eprintln!("  rules: {}", config.rule_catalog().len());

            if !args.no_config {
                let path = args
                    .config_file
                    .clone()
                    .or_else(|| find_config_file(&config_search_dir(args)));
                if let Some(path) = path {
                    eprintln!();
                    eprintln!("Config file: {}", path.display());
                }
            }

            Ok(())
        }

        ConfigAction::Path => {
            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                println!("{}", path.display());
                Ok(())
            } else {
                eprintln!("No config file found");
                std::process::exit(exit_codes::ERROR);
            }
        }
    }
}

fn validate_args(args: &Args) -> Result<()> {
    if args.recursive && args.inputs.is_empty() {
        return Err(ArgError("--recursive requires at least one input path".to_string()).into());
    }

    if args.login && args.username.is_none() {
        return Err(ArgError("--login requires --username (or CRA_USERNAME)".to_string()).into());
    }

    Ok(())
}

/// Checks that apply after merging, so config-file values are validated too
fn validate_config(config: &Config) -> Result<()> {
    validate_display(config)?;
    validate_backend(config)
}

/// Options that affect rendering only
fn validate_display(config: &Config) -> Result<()> {
    if config.wrap_column != 0 && !(20..=400).contains(&config.wrap_column) {
        return Err(ArgError("--wrap must be 0 (no wrapping) or between 20 and 400".to_string()).into());
    }

    Ok(())
}

fn validate_backend(config: &Config) -> Result<()> {
    if config.timeout_secs == 0 {
        return Err(ArgError("--timeout must be at least 1 second".to_string()).into());
    }

    let url = reqwest::Url::parse(&config.backend_url).map_err(|err| {
        ArgError(format!(
            "Invalid backend URL '{}': {}",
            config.backend_url, err
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ArgError(format!(
            "Backend URL must use http or https: {}",
            config.backend_url
        ))
        .into());
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging and Console
// ─────────────────────────────────────────────────────────────────────────────

/// Install the tracing subscriber. Logs go to stderr so they never mix with
/// report output; `CRA_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "cra=debug,warn" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}

struct VerboseStyle {
    use_color: bool,
}

impl VerboseStyle {
    fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn wrap(&self, tag: &str, text: impl fmt::Display) -> String {
        if self.use_color {
            format!("[{}]{}[/]", tag, text)
        } else {
            text.to_string()
        }
    }

    fn header(&self, text: impl fmt::Display) -> String {
        self.wrap("bold cyan", text)
    }

    fn success(&self, text: impl fmt::Display) -> String {
        self.wrap("bold green", text)
    }

    fn warning(&self, text: impl fmt::Display) -> String {
        self.wrap("yellow", text)
    }

    fn failure(&self, text: impl fmt::Display) -> String {
        self.wrap("bold red", text)
    }

    fn dim(&self, text: impl fmt::Display) -> String {
        self.wrap("dim", text)
    }

    fn stat_label(&self, text: impl fmt::Display) -> String {
        self.wrap("bold blue", text)
    }

    fn separator(&self) -> String {
        self.wrap("dim", "───")
    }
}

fn build_console(color: ColorMode) -> (Console, VerboseStyle) {
    match color {
        ColorMode::Never => (Console::new(), VerboseStyle::new(false)),
        ColorMode::Always => {
            let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
            let console = Console::builder()
                .force_terminal(true)
                .color_system(system)
                .build();
            (console, VerboseStyle::new(true))
        }
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                return (Console::new(), VerboseStyle::new(false));
            }

            if std::env::var("FORCE_COLOR").is_ok() {
                let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
                let console = Console::builder()
                    .force_terminal(true)
                    .color_system(system)
                    .build();
                return (console, VerboseStyle::new(true));
            }

            let console = Console::new();
            let use_color = console.is_color_enabled();
            (console, VerboseStyle::new(use_color))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Model
// ─────────────────────────────────────────────────────────────────────────────

/// Finding categories, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Bug,
    SecurityIssue,
    CodeSmell,
    Suggestion,
    CustomValidation,
}

impl Category {
    const ALL: [Category; 5] = [
        Category::Bug,
        Category::SecurityIssue,
        Category::CodeSmell,
        Category::Suggestion,
        Category::CustomValidation,
    ];

    fn title(self) -> &'static str {
        match self {
            Self::Bug => "Bugs",
            Self::SecurityIssue => "Security Issues",
            Self::CodeSmell => "Code Smells",
            Self::Suggestion => "Suggestions",
            Self::CustomValidation => "Custom Validations",
        }
    }

    /// Message shown when the category has no findings
    fn empty_message(self) -> &'static str {
        match self {
            Self::Bug => "No bugs found",
            Self::SecurityIssue => "No security issues",
            Self::CodeSmell => "No code smells",
            Self::Suggestion => "No suggestions.",
            Self::CustomValidation => "No custom validation issues",
        }
    }

    fn bullet(self) -> &'static str {
        match self {
            Self::Suggestion => "→",
            _ => "•",
        }
    }

    fn section(self) -> Section {
        match self {
            Self::Bug => Section::Bugs,
            Self::SecurityIssue => Section::Security,
            Self::CodeSmell => Section::Smells,
            Self::Suggestion => Section::Suggestions,
            Self::CustomValidation => Section::Custom,
        }
    }

    /// CSS class used by the HTML report
    fn css_class(self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::SecurityIssue => "security",
            Self::CodeSmell => "smell",
            Self::Suggestion => "suggestion",
            Self::CustomValidation => "custom",
        }
    }
}

/// The backend's review of one source text.
///
/// Every list defaults to empty when the key is missing or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct AnalysisResult {
    #[serde(deserialize_with = "null_as_empty")]
    bugs: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    security_issues: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    code_smells: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    suggestions: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    custom_validations: Vec<String>,
    improved_code: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl AnalysisResult {
    fn findings(&self, category: Category) -> &[String] {
        match category {
            Category::Bug => &self.bugs,
            Category::SecurityIssue => &self.security_issues,
            Category::CodeSmell => &self.code_smells,
            Category::Suggestion => &self.suggestions,
            Category::CustomValidation => &self.custom_validations,
        }
    }

    /// All findings flattened in category order
    fn all_issues(&self) -> Vec<&str> {
        Category::ALL
            .iter()
            .flat_map(|&category| self.findings(category))
            .map(String::as_str)
            .collect()
    }

    fn total_findings(&self) -> usize {
        Category::ALL
            .iter()
            .map(|&category| self.findings(category).len())
            .sum()
    }

    /// The improved code, or `original` when the backend returned none (or
    /// only whitespace). The flag reports whether the substitution happened.
    fn improved_or<'a>(&'a self, original: &'a str) -> (&'a str, bool) {
        match self.improved_code.as_deref() {
            Some(code) if !code.trim().is_empty() => (code, false),
            _ => (original, true),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Client
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single review submission
#[derive(Debug, thiserror::Error)]
enum SubmitError {
    /// The backend answered with a status other than 200
    #[error("Backend error: {status}\n{body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },
    /// The request could not be completed (DNS, connect, timeout, bad body)
    #[error("Failed to connect to backend: {0}")]
    NetworkFailure(String),
}

/// Anything that can review a source text. The HTTP client is the only
/// production implementation.
trait ReviewBackend {
    fn submit(&self, source: &str) -> Result<AnalysisResult, SubmitError>;
}

#[derive(Serialize)]
struct ReviewRequest<'a> {
    code: &'a str,
}

/// Blocking HTTP client for the review endpoint. One attempt per submission,
/// no retries.
struct HttpBackend {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpBackend {
    fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

impl ReviewBackend for HttpBackend {
    fn submit(&self, source: &str) -> Result<AnalysisResult, SubmitError> {
        let start = Instant::now();
        debug!(endpoint = %self.endpoint, bytes = source.len(), "submitting source for review");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ReviewRequest { code: source })
            .send()
            .map_err(|err| SubmitError::NetworkFailure(error_message(&err)))?;

        let status = response.status();
        debug!(
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "backend responded"
        );

        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_else(|err| {
                debug!(error = %err, "failed to read error response body");
                format!("<failed to read response body: {}>", error_message(&err))
            });
            return Err(SubmitError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .map_err(|err| SubmitError::NetworkFailure(error_message(&err)))?;
        serde_json::from_str(&body).map_err(|err| {
            SubmitError::NetworkFailure(format!("Malformed response body: {}", err))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation Rules
// ─────────────────────────────────────────────────────────────────────────────

/// Separates a rule's short label from its elaboration
const RULE_SEPARATOR: &str = " — ";

/// Built-in validation rule catalog, in display order
const BUILTIN_RULES: &[&str] = &[
    "Avoid System.out.println — use a proper logger.",
    "Avoid empty catch blocks — always handle exceptions.",
    "Avoid hardcoded passwords, tokens, or URLs.",
    "Methods should not exceed 50 lines.",
    "Classes should follow single responsibility principle.",
    "Use constructor injection instead of field injection.",
    "Do not call the database directly from controllers.",
    "Avoid using raw types — always specify generics.",
    "Prefer Optional over returning null.",
    "Avoid deeply nested if/else blocks — refactor logic.",
];

/// Shown under every rule report
const RULE_MATCH_NOTE: &str = "Rules are matched by keyword against the findings above; \
a match is a hint, not proof that the rule caused the finding.";

/// A human-readable rule and the lowercase keyword matched against findings
#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidationRule {
    label: String,
    keyword: String,
}

impl ValidationRule {
    /// The keyword is the text before the first separator, lowercased; a
    /// label without a separator is its own keyword.
    fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let head = match label.split_once(RULE_SEPARATOR) {
            Some((head, _)) => head,
            None => label.as_str(),
        };
        let keyword = head.to_lowercase();
        Self { label, keyword }
    }
}

fn builtin_rules() -> Vec<ValidationRule> {
    BUILTIN_RULES.iter().copied().map(ValidationRule::new).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RuleMatch<'a> {
    rule: &'a ValidationRule,
    triggered: bool,
}

/// Match every rule against the findings, keeping catalog order.
///
/// A rule is triggered when its keyword occurs, case-insensitively, anywhere
/// in any finding.
fn match_rules<'a, S: AsRef<str>>(rules: &'a [ValidationRule], issues: &[S]) -> Vec<RuleMatch<'a>> {
    let lowered: Vec<String> = issues.iter().map(|i| i.as_ref().to_lowercase()).collect();

    rules
        .iter()
        .map(|rule| {
            let keyword = rule.keyword.to_lowercase();
            RuleMatch {
                rule,
                triggered: lowered.iter().any(|issue| issue.contains(&keyword)),
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Diff Renderer
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum character similarity for a replaced pair to count as `changed`
const PAIR_THRESHOLD: f32 = 0.5;

/// Tab width used when displaying source lines
const DISPLAY_TAB_WIDTH: usize = 4;

/// Classification of one diff row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffKind {
    Unchanged,
    Added,
    Removed,
    Changed,
}

impl DiffKind {
    fn marker(self) -> char {
        match self {
            Self::Unchanged => ' ',
            Self::Added => '+',
            Self::Removed => '-',
            Self::Changed => '~',
        }
    }
}

/// One aligned row. Line numbers are 1-based and present exactly on the
/// sides the row has text for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffLine {
    original_line: Option<usize>,
    improved_line: Option<usize>,
    kind: DiffKind,
    original_text: Option<String>,
    improved_text: Option<String>,
}

impl DiffLine {
    fn unchanged(old_index: usize, new_index: usize, text: &str) -> Self {
        Self {
            original_line: Some(old_index + 1),
            improved_line: Some(new_index + 1),
            kind: DiffKind::Unchanged,
            original_text: Some(text.to_string()),
            improved_text: Some(text.to_string()),
        }
    }

    fn removed(old_index: usize, text: &str) -> Self {
        Self {
            original_line: Some(old_index + 1),
            improved_line: None,
            kind: DiffKind::Removed,
            original_text: Some(text.to_string()),
            improved_text: None,
        }
    }

    fn added(new_index: usize, text: &str) -> Self {
        Self {
            original_line: None,
            improved_line: Some(new_index + 1),
            kind: DiffKind::Added,
            original_text: None,
            improved_text: Some(text.to_string()),
        }
    }

    fn changed(old_index: usize, old_text: &str, new_index: usize, new_text: &str) -> Self {
        Self {
            original_line: Some(old_index + 1),
            improved_line: Some(new_index + 1),
            kind: DiffKind::Changed,
            original_text: Some(old_text.to_string()),
            improved_text: Some(new_text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiffOptions {
    /// Pair similar lines of a replaced run as `changed`
    pair_changes: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { pair_changes: true }
    }
}

/// Per-kind row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct DiffStats {
    unchanged: usize,
    added: usize,
    removed: usize,
    changed: usize,
}

/// A row of the windowed view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffRow<'t> {
    Line(&'t DiffLine),
    /// Run of unchanged lines collapsed by the context window
    Skipped(usize),
    /// Windowed view of two identical, non-empty texts
    NoChanges,
}

/// A contiguous window of rows plus its unified-diff header numbers
#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    rows: Range<usize>,
    old_start: usize,
    old_len: usize,
    new_start: usize,
    new_len: usize,
}

/// Full line alignment of an original and an improved text
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffTable {
    left_label: String,
    right_label: String,
    lines: Vec<DiffLine>,
}

/// Split text into lines: `\n` and `\r\n` end a line, a final terminator
/// does not start another one, and empty text has no lines.
fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

fn line_similarity(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

impl DiffTable {
    /// Align `original` against `improved` with a minimal (Myers) edit script.
    fn build(
        original: &str,
        improved: &str,
        left_label: impl Into<String>,
        right_label: impl Into<String>,
        options: &DiffOptions,
    ) -> Self {
        let old = split_lines(original);
        let new = split_lines(improved);
        let ops = similar::capture_diff_slices(Algorithm::Myers, &old, &new);

        let mut lines = Vec::with_capacity(old.len().max(new.len()));
        for op in &ops {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => {
                    for (o, n) in old_range.zip(new_range) {
                        lines.push(DiffLine::unchanged(o, n, old[o]));
                    }
                }
                DiffTag::Delete => {
                    for o in old_range {
                        lines.push(DiffLine::removed(o, old[o]));
                    }
                }
                DiffTag::Insert => {
                    for n in new_range {
                        lines.push(DiffLine::added(n, new[n]));
                    }
                }
                DiffTag::Replace => {
                    push_replacement(&mut lines, &old, old_range, &new, new_range, options);
                }
            }
        }

        Self {
            left_label: left_label.into(),
            right_label: right_label.into(),
            lines,
        }
    }

    fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.kind != DiffKind::Unchanged)
    }

    fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        for line in &self.lines {
            match line.kind {
                DiffKind::Unchanged => stats.unchanged += 1,
                DiffKind::Added => stats.added += 1,
                DiffKind::Removed => stats.removed += 1,
                DiffKind::Changed => stats.changed += 1,
            }
        }
        stats
    }

    /// Windows of rows to display. `None` is one window over everything;
    /// `Some(radius)` keeps `radius` unchanged rows around every change.
    fn hunks(&self, context: Option<usize>) -> Vec<Hunk> {
        let len = self.lines.len();
        let windows = match context {
            None if len == 0 => Vec::new(),
            None => vec![0..len],
            Some(radius) => merge_windows(
                self.lines
                    .iter()
                    .enumerate()
                    .filter(|(_, line)| line.kind != DiffKind::Unchanged)
                    .map(|(i, _)| {
                        let end = i.saturating_add(radius).saturating_add(1).min(len);
                        i.saturating_sub(radius)..end
                    }),
            ),
        };

        let mut hunks = Vec::with_capacity(windows.len());
        let mut old_seen = 0;
        let mut new_seen = 0;
        let mut cursor = 0;

        for window in windows {
            for line in &self.lines[cursor..window.start] {
                old_seen += usize::from(line.original_text.is_some());
                new_seen += usize::from(line.improved_text.is_some());
            }

            let rows = &self.lines[window.clone()];
            let old_len = rows.iter().filter(|l| l.original_text.is_some()).count();
            let new_len = rows.iter().filter(|l| l.improved_text.is_some()).count();

            hunks.push(Hunk {
                rows: window.clone(),
                old_start: if old_len > 0 { old_seen + 1 } else { old_seen },
                old_len,
                new_start: if new_len > 0 { new_seen + 1 } else { new_seen },
                new_len,
            });

            old_seen += old_len;
            new_seen += new_len;
            cursor = window.end;
        }

        hunks
    }

    /// Rows for display, with collapsed runs marked as `Skipped`.
    fn rows(&self, context: Option<usize>) -> Vec<DiffRow<'_>> {
        let hunks = self.hunks(context);
        if hunks.is_empty() {
            return if self.lines.is_empty() {
                Vec::new()
            } else {
                vec![DiffRow::NoChanges]
            };
        }

        let mut rows = Vec::new();
        let mut cursor = 0;
        for hunk in &hunks {
            if hunk.rows.start > cursor {
                rows.push(DiffRow::Skipped(hunk.rows.start - cursor));
            }
            rows.extend(self.lines[hunk.rows.clone()].iter().map(DiffRow::Line));
            cursor = hunk.rows.end;
        }
        if cursor < self.lines.len() {
            rows.push(DiffRow::Skipped(self.lines.len() - cursor));
        }

        rows
    }
}

/// Emit a replaced run. With pairing, row `i` of the old run is matched with
/// row `i` of the new run when they are similar enough; everything else is a
/// removal followed by an addition, so each side keeps its order.
fn push_replacement(
    lines: &mut Vec<DiffLine>,
    old: &[&str],
    old_range: Range<usize>,
    new: &[&str],
    new_range: Range<usize>,
    options: &DiffOptions,
) {
    if !options.pair_changes {
        lines.extend(old_range.map(|o| DiffLine::removed(o, old[o])));
        lines.extend(new_range.map(|n| DiffLine::added(n, new[n])));
        return;
    }

    let old_run: Vec<usize> = old_range.collect();
    let new_run: Vec<usize> = new_range.collect();

    for i in 0..old_run.len().max(new_run.len()) {
        match (old_run.get(i).copied(), new_run.get(i).copied()) {
            (Some(o), Some(n)) if line_similarity(old[o], new[n]) >= PAIR_THRESHOLD => {
                lines.push(DiffLine::changed(o, old[o], n, new[n]));
            }
            (o, n) => {
                if let Some(o) = o {
                    lines.push(DiffLine::removed(o, old[o]));
                }
                if let Some(n) = n {
                    lines.push(DiffLine::added(n, new[n]));
                }
            }
        }
    }
}

/// Merge overlapping or adjacent windows (input sorted by start)
fn merge_windows(windows: impl IntoIterator<Item = Range<usize>>) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::new();

    for window in windows {
        match merged.last_mut() {
            // Adjacent windows merge too: a zero-line gap needs no marker
            Some(current) if window.start <= current.end => {
                current.end = current.end.max(window.end);
            }
            _ => merged.push(window),
        }
    }

    merged
}

/// Visual width of a character in terminal columns (CJK and emoji are 2).
fn char_width(c: char) -> usize {
    if c.is_ascii() || c < '\u{1100}' || ('\u{2500}'..='\u{257F}').contains(&c) {
        1
    } else {
        2
    }
}

fn visual_width(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

/// Expand tabs to spaces, accounting for character visual width.
fn expand_tabs(line: &str, tab_width: usize) -> String {
    let mut result = String::with_capacity(line.len());
    let mut col = 0;

    for c in line.chars() {
        if c == '\t' {
            let spaces = tab_width - (col % tab_width);
            result.extend(std::iter::repeat_n(' ', spaces));
            col += spaces;
        } else {
            result.push(c);
            col += char_width(c);
        }
    }

    result
}

/// Display form of a source line: tabs expanded, control characters
/// replaced with U+FFFD so they cannot disturb the terminal.
fn display_text(text: &str) -> String {
    expand_tabs(text, DISPLAY_TAB_WIDTH)
        .chars()
        .map(|c| if c.is_control() { '\u{FFFD}' } else { c })
        .collect()
}

/// Split a display line into chunks of at most `width` columns
fn wrap_visual(text: &str, width: usize) -> Vec<String> {
    if width == 0 || visual_width(text) <= width {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut col = 0;
    for c in text.chars() {
        let w = char_width(c);
        if col + w > width && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            col = 0;
        }
        current.push(c);
        col += w;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn pad_visual(text: &str, width: usize) -> String {
    let mut padded = text.to_string();
    let used = visual_width(text);
    if used < width {
        padded.extend(std::iter::repeat_n(' ', width - used));
    }
    padded
}

/// Write the diff in the configured style
fn write_diff(out: &mut impl Write, table: &DiffTable, config: &Config) -> io::Result<()> {
    match config.diff_style {
        DiffStyle::SideBySide => {
            write_side_by_side(out, table, config.diff_context(), config.wrap_column)
        }
        DiffStyle::Unified => write_unified(out, table, config.diff_context()),
    }
}

/// Two aligned columns, each `gutter + text`. Wrapped continuation rows
/// carry a `>` marker instead of a line number.
fn write_side_by_side(
    out: &mut impl Write,
    table: &DiffTable,
    context: Option<usize>,
    wrap: usize,
) -> io::Result<()> {
    let rows = table.rows(context);

    let max_line = table
        .lines
        .iter()
        .filter_map(|l| l.original_line.max(l.improved_line))
        .max()
        .unwrap_or(0);
    let number_width = max_line.to_string().len().max(4);
    let text_width = if wrap > 0 {
        wrap
    } else {
        rows.iter()
            .flat_map(|row| match row {
                DiffRow::Line(line) => [line.original_text.as_deref(), line.improved_text.as_deref()],
                _ => [None, None],
            })
            .flatten()
            .map(|text| visual_width(&display_text(text)))
            .max()
            .unwrap_or(0)
            .max(1)
    };
    let column_width = number_width + 3 + text_width;

    let header = format!(
        "{} │ {}",
        pad_visual(&table.left_label, column_width),
        table.right_label
    );
    writeln!(out, "{}", header.trim_end())?;
    writeln!(
        out,
        "{}┼{}",
        "─".repeat(column_width + 1),
        "─".repeat(column_width + 1)
    )?;

    for row in rows {
        match row {
            DiffRow::Line(line) => {
                let left = side_cells(
                    line.original_line,
                    line.original_text.as_deref(),
                    line.kind,
                    number_width,
                    text_width,
                    wrap,
                );
                let right = side_cells(
                    line.improved_line,
                    line.improved_text.as_deref(),
                    line.kind,
                    number_width,
                    text_width,
                    wrap,
                );
                let blank = " ".repeat(column_width);
                for i in 0..left.len().max(right.len()) {
                    let l = left.get(i).unwrap_or(&blank);
                    let r = right.get(i).map(String::as_str).unwrap_or("");
                    let rendered = format!("{} │ {}", pad_visual(l, column_width), r);
                    writeln!(out, "{}", rendered.trim_end())?;
                }
            }
            DiffRow::Skipped(count) => {
                writeln!(
                    out,
                    "{:>width$} ··· {} unchanged line(s) ···",
                    "",
                    count,
                    width = number_width
                )?;
            }
            DiffRow::NoChanges => {
                writeln!(out, "{:>width$} No differences found", "", width = number_width)?;
            }
        }
    }

    Ok(())
}

/// Cells for one side of a row; empty when the row has no text on that side
fn side_cells(
    number: Option<usize>,
    text: Option<&str>,
    kind: DiffKind,
    number_width: usize,
    text_width: usize,
    wrap: usize,
) -> Vec<String> {
    let (Some(number), Some(text)) = (number, text) else {
        return Vec::new();
    };

    wrap_visual(&display_text(text), wrap)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let gutter = if i == 0 {
                format!("{:>width$} {}", number, kind.marker(), width = number_width)
            } else {
                format!("{:>width$} >", "", width = number_width)
            };
            format!("{} {}", gutter, pad_visual(&chunk, text_width))
        })
        .collect()
}

/// Classic unified diff. A `changed` row prints as `-old` then `+new`.
fn write_unified(out: &mut impl Write, table: &DiffTable, context: Option<usize>) -> io::Result<()> {
    writeln!(out, "--- {}", table.left_label)?;
    writeln!(out, "+++ {}", table.right_label)?;

    let hunks = table.hunks(context);
    if hunks.is_empty() {
        if !table.lines.is_empty() {
            writeln!(out, "No differences found")?;
        }
        return Ok(());
    }

    for hunk in hunks {
        writeln!(
            out,
            "@@ -{},{} +{},{} @@",
            hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
        )?;
        for line in &table.lines[hunk.rows] {
            if let Some(text) = &line.original_text {
                let sign = if line.kind == DiffKind::Unchanged { ' ' } else { '-' };
                writeln!(out, "{}{}", sign, text)?;
                if line.kind == DiffKind::Unchanged {
                    continue;
                }
            }
            if let Some(text) = &line.improved_text {
                writeln!(out, "+{}", text)?;
            }
        }
    }

    Ok(())
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Side-by-side HTML table with the `diff_*` classes of the report stylesheet
fn html_diff_table(table: &DiffTable, context: Option<usize>) -> String {
    let mut html = String::from("<table class=\"diff\">\n");
    html.push_str(&format!(
        "<thead><tr><th class=\"diff_header\" colspan=\"2\">{}</th><th class=\"diff_header\" colspan=\"2\">{}</th></tr></thead>\n<tbody>\n",
        html_escape(&table.left_label),
        html_escape(&table.right_label)
    ));

    for row in table.rows(context) {
        match row {
            DiffRow::Line(line) => {
                let (left_class, right_class) = match line.kind {
                    DiffKind::Unchanged => ("", ""),
                    DiffKind::Added => ("", "diff_add"),
                    DiffKind::Removed => ("diff_sub", ""),
                    DiffKind::Changed => ("diff_chg", "diff_chg"),
                };
                html.push_str("<tr>");
                html.push_str(&html_diff_cells(
                    line.original_line,
                    line.original_text.as_deref(),
                    left_class,
                ));
                html.push_str(&html_diff_cells(
                    line.improved_line,
                    line.improved_text.as_deref(),
                    right_class,
                ));
                html.push_str("</tr>\n");
            }
            DiffRow::Skipped(count) => {
                html.push_str(&format!(
                    "<tr><td class=\"diff_next\" colspan=\"4\">··· {} unchanged line(s) ···</td></tr>\n",
                    count
                ));
            }
            DiffRow::NoChanges => {
                html.push_str(
                    "<tr><td class=\"diff_next\" colspan=\"4\">No differences found</td></tr>\n",
                );
            }
        }
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn html_diff_cells(number: Option<usize>, text: Option<&str>, class: &str) -> String {
    let number = number.map(|n| n.to_string()).unwrap_or_default();
    let text = text.map(html_escape).unwrap_or_default();
    if class.is_empty() {
        format!("<td class=\"diff_header\">{}</td><td>{}</td>", number, text)
    } else {
        format!(
            "<td class=\"diff_header\">{}</td><td class=\"{}\">{}</td>",
            number, class, text
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum file size (10 MB) - larger files fail on their own, the batch goes on
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Decode raw bytes as UTF-8, replacing invalid sequences with U+FFFD
fn decode_source(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Read a source file as text
fn read_source_file(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;

    if metadata.len() > MAX_FILE_SIZE {
        anyhow::bail!(
            "File too large: {} ({} MB). Maximum supported size is {} MB.",
            path.display(),
            metadata.len() / (1024 * 1024),
            MAX_FILE_SIZE / (1024 * 1024)
        );
    }

    let bytes =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;
    Ok(decode_source(&bytes))
}

/// Read pasted source from stdin
fn read_stdin_source() -> Result<String> {
    let mut buf = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .context("Failed to read stdin")?;
    Ok(decode_source(&buf))
}

/// Where one review's source text comes from. Loading is deferred so a file
/// that cannot be read only fails its own review.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    fn name(&self) -> String {
        match self {
            Self::Stdin => "stdin".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    fn load(&self) -> Result<ReviewInput> {
        match self {
            Self::Stdin => Ok(ReviewInput::pasted(read_stdin_source()?)),
            Self::File(path) => Ok(ReviewInput::file(path, read_source_file(path)?)),
        }
    }
}

/// Source text plus the labels its diff is shown under
#[derive(Debug, Clone)]
struct ReviewInput {
    name: String,
    source: String,
    left_label: String,
    right_label: String,
}

impl ReviewInput {
    fn pasted(source: String) -> Self {
        Self {
            name: "stdin".to_string(),
            source,
            left_label: "Your Code".to_string(),
            right_label: "Improved Code".to_string(),
        }
    }

    fn file(path: &Path, source: String) -> Self {
        let name = path.display().to_string();
        let short = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        Self {
            left_label: format!("{} (Original)", short),
            right_label: format!("{} (Improved)", short),
            name,
            source,
        }
    }
}

fn build_globset(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = 0;

    for raw in patterns.split(',') {
        let pattern = raw.trim();
        if pattern.is_empty() {
            continue;
        }

        let glob = Glob::new(pattern)
            .map_err(|err| ArgError(format!("Invalid glob pattern '{}': {}", pattern, err)))?;
        builder.add(glob);
        added += 1;
    }

    if added == 0 {
        return Err(ArgError("--glob must include at least one pattern".to_string()).into());
    }

    builder
        .build()
        .map_err(|err| ArgError(format!("Invalid glob set: {}", err)).into())
}

/// Expand directories into the matching files, sorted by path
fn discover_files(
    paths: &[PathBuf],
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<Vec<PathBuf>> {
    let globs = build_globset(&config.glob)?;
    let mut files = std::collections::BTreeSet::new();

    for path in paths {
        if path.is_file() {
            files.insert(path.clone());
            continue;
        }

        if !path.is_dir() {
            if config.verbose {
                console.print(&styles.warning(format!(
                    "Warning: path does not exist: {}",
                    path.display()
                )));
            }
            continue;
        }

        let mut walker = WalkBuilder::new(path);
        walker.git_ignore(config.gitignore);
        walker.git_exclude(config.gitignore);
        walker.git_global(config.gitignore);
        walker.ignore(config.gitignore);
        walker.hidden(false);

        if config.max_depth > 0 {
            walker.max_depth(Some(config.max_depth));
        }

        for entry in walker.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };

            let entry_path = entry.path();
            if entry_path.is_file() {
                if let Some(name) = entry_path.file_name() {
                    if globs.is_match(name) {
                        files.insert(entry_path.to_path_buf());
                    }
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}

/// Inputs for this run, in review order
fn collect_sources(
    args: &Args,
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<Vec<InputSource>> {
    if args.inputs.is_empty() {
        return Ok(vec![InputSource::Stdin]);
    }

    if config.recursive {
        let files = discover_files(&args.inputs, config, console, styles)?;
        return Ok(files.into_iter().map(InputSource::File).collect());
    }

    Ok(args.inputs.iter().cloned().map(InputSource::File).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
struct Credentials {
    username: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Both parts must be present and non-empty
    fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum LoginError {
    #[error("Login is enabled but APP_USERNAME or APP_PASSWORD is not set")]
    NotConfigured,
    #[error("Login required: pass --username and set CRA_PASSWORD")]
    MissingCredentials,
    #[error("Invalid username or password")]
    Rejected,
}

/// Everything one run shares: effective config, the rule catalog, and
/// whether the login gate has been passed. Built once and passed by reference.
struct Session {
    config: Config,
    rules: Vec<ValidationRule>,
    logged_in: bool,
}

impl Session {
    fn new(config: Config) -> Self {
        let rules = config.rule_catalog();
        let logged_in = !config.login;
        Self {
            config,
            rules,
            logged_in,
        }
    }

    /// Pass the login gate. A no-op when login is disabled.
    fn login(
        &mut self,
        expected: Option<&Credentials>,
        supplied: Option<&Credentials>,
    ) -> std::result::Result<(), LoginError> {
        if !self.config.login {
            self.logged_in = true;
            return Ok(());
        }

        let expected = expected.ok_or(LoginError::NotConfigured)?;
        let supplied = supplied.ok_or(LoginError::MissingCredentials)?;

        if expected == supplied {
            info!(user = %supplied.username, "login accepted");
            self.logged_in = true;
            Ok(())
        } else {
            warn!(user = %supplied.username, "login rejected");
            Err(LoginError::Rejected)
        }
    }

    fn ensure_logged_in(&self) -> std::result::Result<(), LoginError> {
        if self.logged_in {
            Ok(())
        } else {
            Err(LoginError::MissingCredentials)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Review Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// A completed review of one input
#[derive(Debug)]
struct Review {
    name: String,
    result: AnalysisResult,
    improved: String,
    improved_substituted: bool,
    table: DiffTable,
}

/// Why one input produced no review. Never fatal to the rest of a batch.
#[derive(Debug, thiserror::Error)]
enum ReviewError {
    #[error("No source text to review (paste some Java code or pass a non-empty file)")]
    EmptyInput,
    #[error("{0:#}")]
    Read(anyhow::Error),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl ReviewError {
    fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::Read(_) => "read_error",
            Self::Submit(SubmitError::ServerError { .. }) => "server_error",
            Self::Submit(SubmitError::NetworkFailure(_)) => "network_failure",
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            Self::Submit(SubmitError::ServerError { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Review one input: reject blank text, submit it, substitute the original
/// when no improved code came back, and align the two.
fn review_input(
    backend: &dyn ReviewBackend,
    input: &ReviewInput,
    options: &DiffOptions,
) -> Result<Review, ReviewError> {
    if input.source.trim().is_empty() {
        return Err(ReviewError::EmptyInput);
    }

    let result = backend.submit(&input.source)?;
    let (improved, improved_substituted) = result.improved_or(&input.source);
    if improved_substituted {
        info!(input = %input.name, "no improved code returned; showing original");
    }

    let table = DiffTable::build(
        &input.source,
        improved,
        input.left_label.as_str(),
        input.right_label.as_str(),
        options,
    );
    let improved = improved.to_string();

    Ok(Review {
        name: input.name.clone(),
        result,
        improved,
        improved_substituted,
        table,
    })
}

/// Totals across one run
#[derive(Debug, Default)]
struct BatchSummary {
    reviewed: usize,
    failures: Vec<(String, ReviewError)>,
    findings: usize,
    rules_triggered: usize,
    elapsed: Duration,
}

/// Review every source strictly in order, one backend call at a time. A
/// failed input is reported where it occurred and the batch continues.
fn review_batch(
    backend: &dyn ReviewBackend,
    session: &Session,
    sources: &[InputSource],
    out: &mut impl Write,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<BatchSummary> {
    session.ensure_logged_in()?;

    let config = &session.config;
    let options = config.diff_options();
    let show_headers = !config.json && sources.len() > 1;
    let progress = config.verbose && !config.json;
    let mut summary = BatchSummary::default();
    let mut html_sections = Vec::new();
    let start = Instant::now();

    for source in sources {
        let name = source.name();
        if progress {
            console.print(&styles.dim(format!("Analyzing {}...", name)));
        }

        let outcome = source
            .load()
            .map_err(ReviewError::Read)
            .and_then(|input| review_input(backend, &input, &options));

        if show_headers {
            writeln!(out, "==> {} <==", name)?;
        }

        match outcome {
            Ok(review) => {
                let issues = review.result.all_issues();
                let matches = match_rules(&session.rules, &issues);
                let findings = review.result.total_findings();
                summary.reviewed += 1;
                summary.findings += findings;
                summary.rules_triggered += matches.iter().filter(|m| m.triggered).count();

                if config.json {
                    write_json_review(out, &review, &matches)?;
                } else {
                    write_text_report(out, &review, &matches, config)?;
                }
                if config.html.is_some() {
                    html_sections.push(html_review_section(&review, &matches, config.diff_context()));
                }
                if progress {
                    console.print(&styles.success(format!("✓ {}: {} finding(s)", name, findings)));
                    if !review.table.has_changes() {
                        console.print(&styles.dim("  improved code is identical to the original"));
                    }
                }
            }
            Err(err) => {
                warn!(input = %name, kind = err.kind(), "review failed");
                eprintln!("Error processing {}: {}", name, err);

                if config.json {
                    write_json_error(out, &name, &err)?;
                }
                if config.html.is_some() {
                    html_sections.push(html_error_section(&name, &err));
                }
                summary.failures.push((name, err));
            }
        }

        if show_headers {
            writeln!(out)?; // Blank line between inputs
        }
        out.flush()?;
    }

    summary.elapsed = start.elapsed();

    if let Some(path) = &config.html {
        write_html_report(path, &html_sections)?;
    }

    Ok(summary)
}

// ─────────────────────────────────────────────────────────────────────────────
// Report Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Shown when the backend returned no improved code
const SUBSTITUTION_NOTICE: &str =
    "The reviewer did not generate improved code. Showing original.";

fn section_heading(title: &str) -> String {
    format!("── {} ──", title)
}

/// Text report for one review, sections in fixed order
fn write_text_report(
    out: &mut impl Write,
    review: &Review,
    matches: &[RuleMatch<'_>],
    config: &Config,
) -> io::Result<()> {
    for category in Category::ALL {
        if !config.shows(category.section()) {
            continue;
        }

        writeln!(out, "{}", section_heading(category.title()))?;
        let findings = review.result.findings(category);
        if findings.is_empty() {
            writeln!(out, "  {}", category.empty_message())?;
        } else {
            for finding in findings {
                writeln!(out, "  {} {}", category.bullet(), finding)?;
            }
        }
        writeln!(out)?;
    }

    let shows_code = config.shows(Section::Diff) || config.shows(Section::Improved);
    if shows_code && review.improved_substituted {
        writeln!(out, "! {}", SUBSTITUTION_NOTICE)?;
        writeln!(out)?;
    }

    if config.shows(Section::Diff) {
        writeln!(out, "{}", section_heading("Differences (Original → Improved)"))?;
        write_diff(out, &review.table, config)?;
        writeln!(out)?;
    }

    if config.shows(Section::Improved) {
        writeln!(out, "{}", section_heading("Final Improved Code (Full)"))?;
        for line in split_lines(&review.improved) {
            writeln!(out, "{}", line)?;
        }
        writeln!(out)?;
    }

    if config.shows(Section::Rules) {
        writeln!(out, "{}", section_heading("Rules Applied"))?;
        write_rule_report(out, matches)?;
    }

    Ok(())
}

fn write_rule_report(out: &mut impl Write, matches: &[RuleMatch<'_>]) -> io::Result<()> {
    let mut any = false;
    for m in matches.iter().filter(|m| m.triggered) {
        writeln!(out, "  ✔ {}", m.rule.label)?;
        any = true;
    }
    if !any {
        writeln!(out, "  No validation rules triggered.")?;
    }
    writeln!(out, "  ({})", RULE_MATCH_NOTE)
}

#[derive(Serialize)]
struct JsonReview<'a> {
    version: &'static str,
    file: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    improved_code_substituted: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rules: Vec<JsonRule<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<DiffStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonError>,
}

#[derive(Serialize)]
struct JsonRule<'a> {
    label: &'a str,
    keyword: &'a str,
    triggered: bool,
}

#[derive(Serialize)]
struct JsonError {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    message: String,
}

/// One JSON object per line
fn write_json_review(out: &mut impl Write, review: &Review, matches: &[RuleMatch<'_>]) -> Result<()> {
    let record = JsonReview {
        version: "1.0",
        file: &review.name,
        status: "ok",
        result: Some(&review.result),
        improved_code_substituted: Some(review.improved_substituted),
        rules: matches
            .iter()
            .map(|m| JsonRule {
                label: &m.rule.label,
                keyword: &m.rule.keyword,
                triggered: m.triggered,
            })
            .collect(),
        diff: Some(review.table.stats()),
        error: None,
    };

    let line = serde_json::to_string(&record).context("Failed to serialize JSON output")?;
    writeln!(out, "{}", line)?;
    Ok(())
}

fn write_json_error(out: &mut impl Write, name: &str, err: &ReviewError) -> Result<()> {
    let record = JsonReview {
        version: "1.0",
        file: name,
        status: "error",
        result: None,
        improved_code_substituted: None,
        rules: Vec::new(),
        diff: None,
        error: Some(JsonError {
            kind: err.kind(),
            status: err.status(),
            message: err.to_string(),
        }),
    };

    let line = serde_json::to_string(&record).context("Failed to serialize JSON output")?;
    writeln!(out, "{}", line)?;
    Ok(())
}

const HTML_STYLE: &str = r#"body {font-family: -apple-system, "Segoe UI", sans-serif; margin: 24px; color: #222;}
h1 {font-size: 28px; font-weight: 800;}
h2 {border-bottom: 1px solid #ddd; padding-bottom: 4px;}
ul.findings {padding-left: 20px;}
li.bug, li.custom {color: #b31d28;}
li.security {color: #8a6d00;}
li.smell {color: #0366d6;}
p.none {color: #22863a;}
p.notice {background: #fff5b1; padding: 6px;}
p.note {color: #888; font-size: 12px;}
p.error {background: #ffeef0; padding: 6px; white-space: pre-wrap;}
pre.code {background: #f6f8fa; padding: 8px; overflow-x: auto;}
table.diff {width: 100%; font-family: Consolas, monospace; font-size: 13px; border-collapse: collapse;}
table.diff td {white-space: pre-wrap; vertical-align: top;}
.diff_header {background: #f7f7f7; font-weight: bold; padding: 4px; text-align: right;}
.diff_next {background: #f0f0f0; padding: 4px; text-align: center;}
.diff_add {background: #e6ffed !important;}
.diff_sub {background: #ffeef0 !important;}
.diff_chg {background: #fff5b1 !important;}
td {padding: 2px 6px;}"#;

fn html_review_section(review: &Review, matches: &[RuleMatch<'_>], context: Option<usize>) -> String {
    let mut html = format!("<section>\n<h2>{}</h2>\n", html_escape(&review.name));

    for category in Category::ALL {
        html.push_str(&format!("<h3>{}</h3>\n", category.title()));
        let findings = review.result.findings(category);
        if findings.is_empty() {
            html.push_str(&format!("<p class=\"none\">{}</p>\n", category.empty_message()));
        } else {
            html.push_str("<ul class=\"findings\">\n");
            for finding in findings {
                html.push_str(&format!(
                    "<li class=\"{}\">{}</li>\n",
                    category.css_class(),
                    html_escape(finding)
                ));
            }
            html.push_str("</ul>\n");
        }
    }

    html.push_str("<h3>Differences (Original → Improved)</h3>\n");
    if review.improved_substituted {
        html.push_str(&format!("<p class=\"notice\">{}</p>\n", SUBSTITUTION_NOTICE));
    }
    html.push_str(&html_diff_table(&review.table, context));

    html.push_str("<h3>Final Improved Code (Full)</h3>\n");
    html.push_str(&format!(
        "<pre class=\"code\"><code class=\"language-java\">{}</code></pre>\n",
        html_escape(&review.improved)
    ));

    html.push_str("<h3>Rules Applied</h3>\n");
    let triggered: Vec<_> = matches.iter().filter(|m| m.triggered).collect();
    if triggered.is_empty() {
        html.push_str("<p class=\"none\">No validation rules triggered.</p>\n");
    } else {
        html.push_str("<ul>\n");
        for m in triggered {
            html.push_str(&format!("<li><strong>{}</strong></li>\n", html_escape(&m.rule.label)));
        }
        html.push_str("</ul>\n");
    }
    html.push_str(&format!("<p class=\"note\">{}</p>\n", RULE_MATCH_NOTE));

    html.push_str("</section>\n");
    html
}

fn html_error_section(name: &str, err: &ReviewError) -> String {
    format!(
        "<section>\n<h2>{}</h2>\n<p class=\"error\">{}</p>\n</section>\n",
        html_escape(name),
        html_escape(&err.to_string())
    )
}

fn html_document(sections: &[String]) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>Code Review Assistant</title>\n<style>\n{}\n</style>\n</head>\n<body>\n<h1>Code Review Assistant</h1>\n{}</body>\n</html>\n",
        HTML_STYLE,
        sections.concat()
    )
}

fn write_html_report(path: &Path, sections: &[String]) -> Result<()> {
    fs::write(path, html_document(sections))
        .with_context(|| format!("Failed to write HTML report: {}", path.display()))?;
    debug!(path = %path.display(), sections = sections.len(), "wrote HTML report");
    Ok(())
}

/// Print a run summary through the console
fn print_batch_summary(summary: &BatchSummary, console: &Console, styles: &VerboseStyle) {
    console.print("");
    console.print(&format!(
        "{} {} {}",
        styles.separator(),
        styles.header("Summary"),
        styles.separator()
    ));

    console.print(&format!(
        "  {} {} reviewed, {} failed",
        styles.stat_label("Inputs:"),
        summary.reviewed,
        summary.failures.len()
    ));

    console.print(&format!(
        "  {} {} reported, {} rule match(es)",
        styles.stat_label("Findings:"),
        summary.findings,
        summary.rules_triggered
    ));

    console.print(&format!(
        "  {} {:.2}s",
        styles.stat_label("Time:"),
        summary.elapsed.as_secs_f64()
    ));

    if !summary.failures.is_empty() {
        console.print(&format!(
            "  {} {}",
            styles.failure("Errors:"),
            summary.failures.len()
        ));
    }

    console.print("");
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::INVALID_ARGS,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_logging(args.verbose);

    // Handle subcommands first
    if let Some(command) = &args.command {
        let exit_code = match run_command(&args, command) {
            Ok(()) => exit_codes::SUCCESS,
            Err(err) => {
                eprintln!("Error: {:#}", err);
                exit_code_for_error(&err)
            }
        };
        std::process::exit(exit_code);
    }

    let exit_code = match run(args) {
        Ok(outcome) => {
            if outcome.check && outcome.findings > 0 {
                exit_codes::FINDINGS
            } else {
                exit_codes::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for_error(&err)
        }
    };

    std::process::exit(exit_code);
}

/// Run a subcommand
fn run_command(args: &Args, command: &Commands) -> Result<()> {
    match command {
        Commands::Rules => run_rules_command(args),
        Commands::Diff { original, improved } => run_diff_command(args, original, improved),
        Commands::Config { action } => run_config_command(args, action),
    }
}

/// Print the active rule catalog with the keyword derived from each rule
fn run_rules_command(args: &Args) -> Result<()> {
    let config = create_config(args)?;
    let mut stdout = io::stdout().lock();

    for (i, rule) in config.rule_catalog().iter().enumerate() {
        writeln!(stdout, "{:>2}. {}", i + 1, rule.label)?;
        writeln!(stdout, "    keyword: \"{}\"", rule.keyword)?;
    }

    Ok(())
}

/// Diff two local files with the configured diff options
fn run_diff_command(args: &Args, original: &Path, improved: &Path) -> Result<()> {
    let config = create_config(args)?;
    validate_display(&config)?;

    let old = read_source_file(original)?;
    let new = read_source_file(improved)?;
    let table = DiffTable::build(
        &old,
        &new,
        original.display().to_string(),
        improved.display().to_string(),
        &config.diff_options(),
    );

    let mut stdout = io::stdout().lock();
    write_diff(&mut stdout, &table, &config)?;

    if let Some(path) = &config.html {
        let section = format!(
            "<section>\n{}</section>\n",
            html_diff_table(&table, config.diff_context())
        );
        write_html_report(path, &[section])?;
    }

    Ok(())
}

fn run(args: Args) -> Result<RunOutcome> {
    validate_args(&args)?;

    let config = create_config(&args)?;
    validate_config(&config)?;
    let (console, styles) = build_console(config.color);

    let mut session = Session::new(config);
    if session.config.login {
        let expected = Credentials::from_parts(
            std::env::var("APP_USERNAME").ok(),
            std::env::var("APP_PASSWORD").ok(),
        );
        if expected.is_none() {
            console.print(&styles.warning(
                "Warning: login enabled but APP_USERNAME or APP_PASSWORD not set.",
            ));
        }
        let supplied = Credentials::from_parts(args.username.clone(), args.password.clone());
        session.login(expected.as_ref(), supplied.as_ref())?;
    }

    let sources = collect_sources(&args, &session.config, &console, &styles)?;
    if sources.is_empty() {
        eprintln!(
            "Warning: No files matched pattern '{}' in provided paths",
            session.config.glob
        );
        return Ok(RunOutcome {
            check: session.config.check,
            findings: 0,
        });
    }

    let backend = HttpBackend::new(
        session.config.backend_url.as_str(),
        Duration::from_secs(session.config.timeout_secs),
    )?;

    let mut stdout = io::stdout().lock();
    let summary = review_batch(&backend, &session, &sources, &mut stdout, &console, &styles)?;
    drop(stdout);

    if session.config.verbose && !session.config.json {
        print_batch_summary(&summary, &console, &styles);
    }

    if !summary.failures.is_empty() {
        let count = summary.failures.len();
        let names = summary
            .failures
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        if summary
            .failures
            .iter()
            .all(|(_, err)| matches!(err, ReviewError::EmptyInput))
        {
            return Err(EmptyInputError { count, names }.into());
        }

        anyhow::bail!("{} input(s) had errors: {}", count, names);
    }

    Ok(RunOutcome {
        check: session.config.check,
        findings: summary.findings,
    })
}
