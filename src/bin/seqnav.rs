//! Sequencing CLI
//!
//! Loads a package description (YAML) and replays a navigation script
//! against it, printing the outcome of each step.
//!
//! # Usage
//!
//! ```bash
//! # Replay a script
//! seqnav run --package course.yaml --script session.txt
//!
//! # Print the table of contents with rule evaluation
//! seqnav toc --package course.yaml --evaluate
//!
//! # List sequencing failure codes
//! seqnav codes -o json
//! ```
//!
//! Script lines, `#` starts a comment:
//!
//! ```text
//! start
//! choose quiz
//! valid continue
//! valid-to quiz
//! complete intro
//! points quiz 80
//! toc
//! save
//! exit-all
//! grade-begin
//! continue
//! grade-end
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scorm_seqnav::activity::{CompletionStatus, LessonStatus};
use scorm_seqnav::{
    ActivityId, MemoryStore, NavigationCommand, Navigator, NavigatorConfig, NavigatorError, PackageDefinition,
    SequencingCode, TocNode,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "seqnav")]
#[command(version)]
#[command(about = "Replay navigation scripts against a SCORM package")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,

    /// Navigator configuration (YAML)
    #[arg(long, short, global = true, env = "SEQNAV_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a navigation script
    Run {
        #[arg(short, long)]
        package: PathBuf,

        #[arg(short, long)]
        script: PathBuf,

        /// Print the sequencing log after the run
        #[arg(long)]
        log: bool,
    },

    /// Print the table of contents
    Toc {
        #[arg(short, long)]
        package: PathBuf,

        /// Evaluate sequencing rules per node (defaults to the config value)
        #[arg(long)]
        evaluate: Option<bool>,
    },

    /// List every sequencing failure code
    Codes,
}

// =============================================================================
// SCRIPT
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Navigate(NavigationCommand),
    Choose(String),
    Valid(NavigationCommand),
    ValidTo(String),
    Complete(String),
    Points(String, f32),
    Toc,
    Save,
    GradeBegin,
    GradeEnd,
}

fn parse_step(line: &str) -> Result<Step> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| anyhow!("empty step"))?;
    let mut arg = |name: &str| {
        words
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("'{verb}' needs {name}"))
    };
    let step = match verb {
        "choose" => Step::Choose(arg("an activity key")?),
        "valid" => Step::Valid(arg("a command")?.parse().map_err(|e: String| anyhow!(e))?),
        "valid-to" => Step::ValidTo(arg("an activity key")?),
        "complete" => Step::Complete(arg("an activity key")?),
        "points" => {
            let key = arg("an activity key")?;
            let points = arg("a number")?
                .parse()
                .with_context(|| format!("'{line}': points must be a number"))?;
            Step::Points(key, points)
        }
        "toc" => Step::Toc,
        "save" => Step::Save,
        "grade-begin" => Step::GradeBegin,
        "grade-end" => Step::GradeEnd,
        other => Step::Navigate(other.parse().map_err(|e: String| anyhow!(e))?),
    };
    if words.next().is_some() {
        bail!("'{line}': unexpected trailing words");
    }
    Ok(step)
}

fn parse_script(text: &str) -> Result<Vec<(usize, Step)>> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.split('#').next().unwrap_or("").trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            parse_step(line)
                .map(|step| (n, step))
                .with_context(|| format!("script line {n}"))
        })
        .collect()
}

// =============================================================================
// OUTCOMES
// =============================================================================

#[derive(Debug, Serialize)]
struct Outcome {
    line: usize,
    step: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid: Option<bool>,
    current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl Outcome {
    fn print(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(self)?),
            OutputFormat::Text => {
                let status = match (self.ok, self.valid) {
                    (true, Some(valid)) => format!("valid={valid}"),
                    (true, None) => "ok".to_string(),
                    (false, _) => format!("FAILED {}", self.code.unwrap_or("-")),
                };
                let current = self.current.as_deref().unwrap_or("-");
                print!("{:>4}  {:<24} {:<18} current={current}", self.line, self.step, status);
                match &self.detail {
                    Some(detail) => println!("  {detail}"),
                    None => println!(),
                }
            }
        }
        Ok(())
    }
}

fn lookup(navigator: &Navigator, key: &str) -> std::result::Result<ActivityId, NavigatorError> {
    navigator
        .data()
        .activity_key_to_activity(key)
        .ok_or_else(|| NavigatorError::UnknownActivity(key.to_string()))
}

async fn run_step(
    navigator: &mut Navigator,
    store: &MemoryStore,
    step: &Step,
) -> std::result::Result<(Option<bool>, Option<String>), NavigatorError> {
    match step {
        Step::Navigate(command) => navigator.navigate(*command).map(|_| (None, None)),
        Step::Choose(key) => navigator.navigate_to(key).map(|_| (None, None)),
        Step::Valid(command) => navigator
            .is_navigation_valid(*command)
            .map(|valid| (Some(valid), None)),
        Step::ValidTo(key) => navigator
            .is_navigation_to_valid(key)
            .map(|valid| (Some(valid), None)),
        Step::Complete(key) => {
            let id = lookup(navigator, key)?;
            navigator.update_activity(id, |model| {
                model.completion_status = CompletionStatus::Completed;
                model.lesson_status = LessonStatus::Completed;
            })?;
            Ok((None, None))
        }
        Step::Points(key, points) => {
            let id = lookup(navigator, key)?;
            navigator.set_evaluation_points(id, Some(*points))?;
            let total = navigator.data().total_points();
            Ok((None, Some(format!("total={total:?}"))))
        }
        Step::Toc => {
            let toc = navigator.load_table_of_contents(navigator.config().evaluate_toc_rules)?;
            Ok((None, Some(format!("valid: {}", toc.valid_keys().join(", ")))))
        }
        Step::GradeBegin => navigator.begin_auto_grading_mode().map(|_| (None, None)),
        Step::GradeEnd => navigator.end_auto_grading_mode().map(|_| (None, None)),
        Step::Save => {
            let count = navigator.save(store).await?;
            Ok((None, Some(format!("saved {count} activities"))))
        }
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

fn load_config(path: Option<&Path>) -> Result<NavigatorConfig> {
    match path {
        Some(path) => NavigatorConfig::load(path),
        None => NavigatorConfig::default().with_env_overrides(),
    }
}

fn load_navigator(package: &Path, config: NavigatorConfig) -> Result<Navigator> {
    let text = std::fs::read_to_string(package)
        .with_context(|| format!("reading package {}", package.display()))?;
    let package: PackageDefinition = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing package {}", package.display()))?;
    Ok(Navigator::new(&package, config)?)
}

async fn cmd_run(
    package: &Path,
    script: &Path,
    config: NavigatorConfig,
    format: OutputFormat,
    print_log: bool,
) -> Result<bool> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("reading script {}", script.display()))?;
    let steps = parse_script(&text)?;
    let mut navigator = load_navigator(package, config)?;
    let store = MemoryStore::new();
    debug!(steps = steps.len(), "replaying script");

    let mut all_ok = true;
    for (line, step) in &steps {
        let result = run_step(&mut navigator, &store, step).await;
        let current = navigator.current_activity().map(|a| a.key().to_string());
        let outcome = match result {
            Ok((valid, detail)) => Outcome {
                line: *line,
                step: format!("{step:?}"),
                ok: true,
                valid,
                current,
                code: None,
                detail,
            },
            Err(err) => {
                all_ok = false;
                Outcome {
                    line: *line,
                    step: format!("{step:?}"),
                    ok: false,
                    valid: None,
                    current,
                    code: err.sequencing_code().map(|c| c.code()),
                    detail: Some(err.to_string()),
                }
            }
        };
        outcome.print(format)?;
    }

    if print_log {
        if let Some(log) = navigator.sequencing_log() {
            println!("{}", log.to_json()?);
        }
    }
    Ok(all_ok)
}

fn print_toc(node: &TocNode, depth: usize) {
    let mark = if node.valid_to_navigate_to { "*" } else { " " };
    println!("{mark} {}{} ({})", "  ".repeat(depth), node.title, node.key);
    for child in &node.children {
        print_toc(child, depth + 1);
    }
}

fn cmd_toc(
    package: &Path,
    config: NavigatorConfig,
    evaluate: Option<bool>,
    format: OutputFormat,
) -> Result<()> {
    let evaluate = evaluate.unwrap_or(config.evaluate_toc_rules);
    let mut navigator = load_navigator(package, config)?;
    let toc = navigator.load_table_of_contents(evaluate)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&toc)?),
        OutputFormat::Text => print_toc(&toc, 0),
    }
    Ok(())
}

fn cmd_codes(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let codes: Vec<_> = SequencingCode::ALL
                .iter()
                .map(|c| serde_json::json!({ "code": c.code(), "message": c.message() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&codes)?);
        }
        OutputFormat::Text => {
            for code in SequencingCode::ALL {
                println!("{:<10} {}", code.code(), code.message());
            }
        }
    }
    Ok(())
}

async fn dispatch(cli: &Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Run {
            package,
            script,
            log,
        } => cmd_run(package, script, config, cli.format, *log).await,
        Commands::Toc { package, evaluate } => {
            cmd_toc(package, config, *evaluate, cli.format).map(|_| true)
        }
        Commands::Codes => cmd_codes(cli.format).map(|_| true),
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
