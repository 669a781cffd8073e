//! Command-line interface for contentgate.

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::detect::{self, CompiledRules, Detection, IngestOutcome, Scanner};
use crate::error::GovernanceError;
use crate::gate;
use crate::issue::{parse_csv, Issue, IssueDraft, IssueId, Severity, Status};
use crate::lifecycle::{Lifecycle, Resolution};
use crate::report::{self, Filter, Format};
use crate::rules::{self, RuleSet, TEMPLATES};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Content compliance governance - track sensitive claims until they are cleared.
///
/// contentgate keeps a ledger of compliance issues found in published content
/// (funding amounts, immigration claims, career outcomes, rankings), moves them
/// through remediation, and gates deployment on the blocking ones.
#[derive(Parser)]
#[command(name = "contentgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config YAML file (default: auto-discover)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger file, overriding config and environment
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Debug logging (ignored when CONTENTGATE_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a new compliance issue
    Add(AddArgs),
    /// List issues, optionally filtered
    #[command(visible_alias = "ls")]
    List(ListArgs),
    /// Show one issue in full
    Show(ShowArgs),
    /// Mark an issue as being worked on
    Start(StartArgs),
    /// Resolve an issue against the commit that fixed it
    Resolve(ResolveArgs),
    /// Defer an issue with a justification
    Defer(DeferArgs),
    /// Append a note to an issue
    Note(NoteArgs),
    /// Run the compliance gate
    #[command(visible_alias = "check")]
    Validate(ValidateArgs),
    /// Stakeholder summary of the ledger
    Report(ReportArgs),
    /// Detect sensitive content and record candidates
    Scan(ScanArgs),
    /// Manage detection rule sets
    #[command(subcommand)]
    Rules(RulesCommand),
}

#[derive(Args)]
pub struct AddArgs {
    /// Content item the issue concerns
    #[arg(long)]
    pub file: String,

    /// Issue type, e.g. missing-disclaimer
    #[arg(long = "type")]
    pub issue_type: String,

    /// blocker, high, medium, or low
    #[arg(long)]
    pub severity: Severity,

    /// Comma-separated content warning tags
    #[arg(long, default_value = "")]
    pub warnings: String,

    #[arg(long)]
    pub description: String,

    /// Required remediation step (repeatable)
    #[arg(long = "action")]
    pub actions: Vec<String>,

    /// Block deployment until resolved
    #[arg(long)]
    pub blocks_deployment: bool,

    /// Explicit id instead of the next in sequence
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only unresolved, deployment-blocking issues
    #[arg(long)]
    pub blocking_only: bool,

    #[arg(long)]
    pub severity: Option<Severity>,

    #[arg(long)]
    pub status: Option<Status>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: Format,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: Format,
}

#[derive(Args)]
pub struct StartArgs {
    pub id: String,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args)]
pub struct ResolveArgs {
    pub id: String,

    /// Commit that contains the fix
    #[arg(long)]
    pub commit: Option<String>,

    /// Who resolved it. Defaults to the configured operator, then $USER,
    /// $LOGNAME or $USERNAME, then `git config user.name`; required when none is set.
    #[arg(long)]
    pub by: Option<String>,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args)]
pub struct DeferArgs {
    pub id: String,

    /// Why remediation is postponed
    #[arg(long)]
    pub reason: String,
}

#[derive(Args)]
pub struct NoteArgs {
    pub id: String,
    pub text: String,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Fail (exit 1) when blocking issues remain
    #[arg(long)]
    pub strict: bool,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: Format,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Output format: pretty, json, or markdown
    #[arg(short, long, default_value = "pretty")]
    pub format: Format,
}

#[derive(Args)]
pub struct ScanArgs {
    /// File or directory to scan
    pub path: PathBuf,

    /// Rule set YAML (default: configured, then built-in)
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Report candidates without recording them
    #[arg(long)]
    pub dry_run: bool,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: Format,
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// Write a rule set from a template
    Init(RulesInitArgs),
    /// List available templates
    List,
    /// Validate a rule set file
    Check(RulesCheckArgs),
}

#[derive(Args)]
pub struct RulesInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "contentgate-rules.yaml")]
    pub output: PathBuf,

    /// Template to use
    #[arg(short, long, default_value = "default")]
    pub template: String,
}

#[derive(Args)]
pub struct RulesCheckArgs {
    pub file: PathBuf,
}

/// Dispatch a parsed command line. Returns the process exit code.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        // Rule templates need no ledger or config.
        Commands::Rules(RulesCommand::Init(args)) => run_rules_init(&args),
        Commands::Rules(RulesCommand::List) => list_templates(),
        Commands::Rules(RulesCommand::Check(args)) => run_rules_check(&args),
        command => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(ledger) = cli.ledger {
                config.ledger = ledger;
            }
            dispatch(&config, command)
        }
    }
}

fn dispatch(config: &Config, command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Add(args) => run_add(config, args),
        Commands::List(args) => run_list(config, &args),
        Commands::Show(args) => run_show(config, &args),
        Commands::Start(args) => run_start(config, &args),
        Commands::Resolve(args) => run_resolve(config, args),
        Commands::Defer(args) => run_defer(config, &args),
        Commands::Note(args) => run_note(config, &args),
        Commands::Validate(args) => run_validate(config, &args),
        Commands::Report(args) => run_report(config, &args),
        Commands::Scan(args) => run_scan(config, &args),
        Commands::Rules(_) => Ok(EXIT_SUCCESS),
    }
}

/// Print an error the way every command reports failure, and pick the exit code.
pub fn report_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<GovernanceError>() {
        Some(gov) => {
            eprintln!("error[{}]: {}", gov.kind(), gov);
            eprintln!("hint: {}", gov.hint());
        }
        None => {
            eprintln!("error: {}", err);
            for cause in err.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
        }
    }
    EXIT_ERROR
}

fn run_add(config: &Config, args: AddArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let draft = IssueDraft::new(args.file, args.issue_type, args.severity, args.description)
        .warnings(parse_csv(&args.warnings))
        .actions(args.actions.into_iter().filter(|a| !a.trim().is_empty()))
        .blocking(args.blocks_deployment);

    let issue = match args.id {
        Some(id) => {
            let id = IssueId::from(id.trim());
            if !id.is_well_formed() {
                return Err(GovernanceError::Validation(format!(
                    "issue id {:?} must look like PREFIX-NNN",
                    id.as_str()
                ))
                .into());
            }
            draft.validate()?;
            ledger.append(Issue::from_draft(id, draft, Utc::now()))?
        }
        None => ledger.append_new(draft)?,
    };

    println!("Created {} ({}, {})", issue.id, issue.severity, issue.status);
    if issue.blocks_deployment {
        println!("{} blocks deployment until resolved", issue.id);
    }
    Ok(EXIT_SUCCESS)
}

fn run_list(config: &Config, args: &ListArgs) -> anyhow::Result<i32> {
    let snapshot = config.ledger().list_all()?;
    let filter = Filter {
        status: args.status,
        severity: args.severity,
        blocking_only: args.blocking_only,
    };
    let issues = filter.apply(&snapshot);

    match args.format {
        Format::Json => println!("{}", report::render_json_issues(&issues)?),
        _ => report::write_pretty_list(&issues),
    }
    Ok(EXIT_SUCCESS)
}

fn run_show(config: &Config, args: &ShowArgs) -> anyhow::Result<i32> {
    let issue = config.ledger().get(&IssueId::from(args.id.as_str()))?;
    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&issue)?),
        _ => report::write_pretty_issue(&issue),
    }
    Ok(EXIT_SUCCESS)
}

fn run_start(config: &Config, args: &StartArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let id = IssueId::from(args.id.as_str());
    let issue = Lifecycle::new(&ledger).start(&id, args.note.as_deref())?;
    println!("{} is {}", issue.id, issue.status);
    Ok(EXIT_SUCCESS)
}

fn run_resolve(config: &Config, args: ResolveArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let resolution = Resolution {
        commit: args.commit,
        resolved_by: args.by.or_else(|| config.default_resolver()),
        note: args.note,
    };
    let issue = Lifecycle::new(&ledger).resolve(&IssueId::from(args.id.as_str()), resolution)?;
    println!(
        "Resolved {} in {} by {}",
        issue.id,
        issue.assigned_commit.as_deref().unwrap_or_default(),
        issue.resolved_by.as_deref().unwrap_or_default()
    );
    Ok(EXIT_SUCCESS)
}

fn run_defer(config: &Config, args: &DeferArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let issue = Lifecycle::new(&ledger).defer(&IssueId::from(args.id.as_str()), &args.reason)?;
    println!("Deferred {}", issue.id);
    if issue.blocks_deployment {
        eprintln!("warning: {} still blocks deployment", issue.id);
    }
    Ok(EXIT_SUCCESS)
}

fn run_note(config: &Config, args: &NoteArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let issue = Lifecycle::new(&ledger).annotate(&IssueId::from(args.id.as_str()), &args.text)?;
    println!("Added note to {} ({} total)", issue.id, issue.notes.len());
    Ok(EXIT_SUCCESS)
}

fn run_validate(config: &Config, args: &ValidateArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let result = gate::evaluate_ledger(&ledger, args.strict);
    let ledger_str = ledger.path().to_string_lossy().to_string();

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => report::write_pretty_gate(&ledger_str, &result),
    }
    Ok(result.exit_code())
}

fn run_report(config: &Config, args: &ReportArgs) -> anyhow::Result<i32> {
    let ledger = config.ledger();
    let snapshot = ledger.list_all()?;
    let ledger_str = ledger.path().to_string_lossy().to_string();

    match args.format {
        Format::Json => println!("{}", report::render_json_report(&ledger_str, &snapshot)?),
        Format::Markdown => print!("{}", report::render_markdown(&ledger_str, &snapshot)),
        Format::Pretty => report::write_pretty_report(&ledger_str, &snapshot),
    }
    Ok(EXIT_SUCCESS)
}

/// JSON shape of `scan` output.
#[derive(Serialize)]
struct ScanOutput<'a> {
    root: String,
    scanned: usize,
    dry_run: bool,
    detection: &'a Detection,
    created: Vec<&'a Issue>,
    skipped: usize,
}

fn run_scan(config: &Config, args: &ScanArgs) -> anyhow::Result<i32> {
    let rule_set = config.rule_set(args.rules.as_deref())?;

    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot access path {}", args.path.display()))?;
    let base = if root.is_dir() {
        root.clone()
    } else {
        root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone())
    };

    let scanner = Scanner::new(&base, rule_set)?;
    let files = scanner.collect_files(&root)?;
    if files.is_empty() {
        eprintln!("warning: no files to scan");
    }
    let result = scanner.scan(&files)?;

    let outcome: Option<IngestOutcome> = if args.dry_run {
        None
    } else {
        Some(detect::ingest(&config.ledger(), &result.detection)?)
    };

    let root_str = args.path.to_string_lossy().to_string();
    match args.format {
        Format::Json => {
            let output = ScanOutput {
                root: root_str,
                scanned: result.scanned,
                dry_run: args.dry_run,
                detection: &result.detection,
                created: outcome.iter().flat_map(|o| o.created.iter()).collect(),
                skipped: outcome.as_ref().map_or(0, |o| o.skipped.len()),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => report::write_pretty_scan(&root_str, result.scanned, &result.detection, outcome.as_ref()),
    }
    Ok(EXIT_SUCCESS)
}

fn run_rules_init(args: &RulesInitArgs) -> anyhow::Result<i32> {
    let template = match TEMPLATES.iter().find(|t| t.name == args.template) {
        Some(t) => t,
        None => {
            eprintln!("error: unknown template {:?}", args.template);
            eprintln!("Run 'contentgate rules list' to see available templates");
            return Ok(EXIT_ERROR);
        }
    };

    if args.output.exists() {
        eprintln!("error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }

    std::fs::write(&args.output, template.content)
        .with_context(|| format!("writing rule set {}", args.output.display()))?;

    println!("Created {} from template '{}'", args.output.display(), template.name);
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to match your content policy", args.output.display());
    println!("  2. Run: contentgate scan . --rules {} --dry-run", args.output.display());

    Ok(EXIT_SUCCESS)
}

fn list_templates() -> anyhow::Result<i32> {
    println!("Available templates:");
    println!();

    for template in TEMPLATES {
        let name = if template.name == "default" {
            format!("{} (built-in)", template.name)
        } else {
            template.name.to_string()
        };
        println!("  {:<20} {}", name, template.description);
    }

    println!();
    println!("Usage:");
    println!("  contentgate rules init --template <name>");

    Ok(EXIT_SUCCESS)
}

fn run_rules_check(args: &RulesCheckArgs) -> anyhow::Result<i32> {
    let rule_set = match RuleSet::parse_file(&args.file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error parsing rule set {}: {}", args.file.display(), e);
            return Ok(EXIT_FAILED);
        }
    };
    if let Err(e) = rules::validate(&rule_set) {
        eprintln!("error: invalid rule set: {}", e);
        return Ok(EXIT_FAILED);
    }
    let compiled = CompiledRules::compile(&rule_set)?;

    println!(
        "{}: {} rule{} OK",
        args.file.display(),
        compiled.len(),
        if compiled.len() == 1 { "" } else { "s" }
    );
    for name in compiled.rule_names() {
        println!("  - {}", name);
    }
    Ok(EXIT_SUCCESS)
}
