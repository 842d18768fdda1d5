use anyhow::Result;
use clap::Parser;
use log::{debug, warn};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::types::{Environment, RetryBudget, TeardownConfig};
use crate::core::escalate::{Decision, DecisionContext, DecisionProvider, PolicyDecision};
use crate::core::orchestrator::{TeardownOrchestrator, TeardownOutcome};
use crate::kernel::mount;

/// Marker file naming the real underlying storage root of an environment
/// (encrypted-storage indirection). Its content is the alternate root path.
const STORAGE_ROOT_MARKER: &str = ".unbox-root";

#[derive(Parser)]
#[command(
    name = "unbox",
    author,
    version,
    about = "Tear down chroot-based isolated environments"
)]
struct Cli {
    /// Environments to tear down (directory names under the root)
    names: Vec<String>,

    /// Tear down every environment under the root
    #[arg(short, long)]
    all: bool,

    /// Skip the usage gate and accept the risk
    #[arg(short, long)]
    force: bool,

    /// Auto-confirm signaling instead of prompting
    #[arg(short, long)]
    yes: bool,

    /// Escalate straight to the strongest signal (implies --yes)
    #[arg(short = 'x', long)]
    escalate: bool,

    /// Retry forever instead of escalating
    #[arg(short, long)]
    patient: bool,

    /// Failed unmount passes before a decision point
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Pause between passes in milliseconds
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,

    /// Directory containing the environments
    #[arg(short, long, default_value = "/var/lib/unbox")]
    root: PathBuf,

    /// Shared host-media bind point name inside each environment
    #[arg(long, default_value = "media")]
    media_dir: String,

    /// Shared restricted-path override to release after the run, if unused
    #[arg(long)]
    shared_root: Option<PathBuf>,

    /// Remove the environment directory after it clears
    #[arg(short, long)]
    delete: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

/// Prompting provider: asks the operator at each decision point.
struct PromptProvider;

impl DecisionProvider for PromptProvider {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Decision {
        eprintln!(
            "Environment '{}' is still busy after {} unmount attempt(s).",
            ctx.env_name, ctx.attempts
        );
        for record in ctx.blockers {
            eprintln!("  pid {:>7}  {}", record.pid, record.cmdline);
        }
        loop {
            eprint!(
                "Send {:?} to these processes? [s]ignal / [k]ill -9 / [l]ist / [a]bort: ",
                ctx.strength.as_signal()
            );
            let _ = io::stderr().flush();

            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
                // stdin closed mid-prompt, treat as a decline
                return Decision::Abort;
            }
            match line.trim().to_lowercase().as_str() {
                "s" | "y" | "yes" => return Decision::Proceed,
                "k" => return Decision::Escalate,
                "l" => return Decision::ListOnly,
                "a" | "n" | "no" => return Decision::Abort,
                _ => eprintln!("Please answer s, k, l, or a."),
            }
        }
    }

    fn interactive(&self) -> bool {
        true
    }
}

fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

/// Pick the decision provider from the flags: fixed policies for
/// --escalate/--yes, the prompt when a terminal is attached, and a fixed
/// deny otherwise (budget exhausted with nobody to ask).
fn build_provider(cli: &Cli) -> Box<dyn DecisionProvider> {
    if cli.escalate {
        Box::new(PolicyDecision(Decision::Escalate))
    } else if cli.yes {
        Box::new(PolicyDecision(Decision::Proceed))
    } else if stdin_is_tty() {
        Box::new(PromptProvider)
    } else {
        Box::new(PolicyDecision(Decision::Abort))
    }
}

/// Resolve one environment name to its on-disk record, applying the
/// storage-root marker indirection when present.
fn resolve_environment(root: &Path, name: &str) -> Environment {
    let path = root.join(name);
    let mut env = Environment::new(name, &path);

    let marker = path.join(STORAGE_ROOT_MARKER);
    match fs::read_to_string(&marker) {
        Ok(content) => {
            let target = PathBuf::from(content.trim());
            if target.exists() {
                debug!(
                    "{}: storage root marker points at {}",
                    name,
                    target.display()
                );
                env.alternate_root = Some(target);
            } else {
                warn!(
                    "{}: marker names missing root {}, using nominal path",
                    name,
                    target.display()
                );
            }
        }
        Err(_) => {}
    }

    env
}

/// All environment directories under the root, sorted by name.
fn discover_environments(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Recursive delete of a cleared environment, refused while anything is
/// still mounted beneath it.
fn delete_environment(env: &Environment) -> Result<()> {
    let path = env.teardown_path();
    let canonical = fs::canonicalize(path)?;
    if !mount::targets_under(&canonical)?.is_empty() {
        anyhow::bail!(
            "refusing to delete {}: mounts still present",
            canonical.display()
        );
    }
    fs::remove_dir_all(&canonical)?;
    if env.alternate_root.is_some() && env.path.exists() {
        fs::remove_dir_all(&env.path)?;
    }
    eprintln!("Deleted {}", env.name);
    Ok(())
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    if !cfg!(target_os = "linux") {
        eprintln!("Error: unbox requires Linux mount and /proc semantics");
        std::process::exit(1);
    }

    if unsafe { libc::geteuid() } != 0 {
        eprintln!("Warning: unbox usually needs root to unmount and signal");
        eprintln!("Running unprivileged may hide foreign processes and fail unmounts");
    }

    let names = if cli.all {
        discover_environments(&cli.root)?
    } else if cli.names.is_empty() {
        anyhow::bail!("no environments named; pass names or --all");
    } else {
        cli.names.clone()
    };

    let config = TeardownConfig {
        envs_root: cli.root.clone(),
        force: cli.force,
        retry_budget: if cli.patient {
            RetryBudget::Patient
        } else {
            RetryBudget::Limited(cli.retries.max(1))
        },
        pause_ms: cli.pause_ms,
        media_dir: cli.media_dir.clone(),
        shared_root: cli.shared_root.clone(),
    };

    let envs: Vec<Environment> = names
        .iter()
        .map(|name| resolve_environment(&config.envs_root, name))
        .collect();

    let provider = build_provider(&cli);
    let orchestrator = TeardownOrchestrator::new(&config, provider.as_ref());
    let summary = orchestrator.run(&envs)?;

    if cli.delete {
        for (env, report) in envs.iter().zip(&summary.reports) {
            if report.outcome.is_cleared() && env.teardown_path().exists() {
                if let Err(e) = delete_environment(env) {
                    eprintln!("Warning: failed to delete {}: {}", env.name, e);
                }
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for report in &summary.reports {
            match &report.outcome {
                TeardownOutcome::Cleared => eprintln!("{}: cleared", report.name),
                TeardownOutcome::NotFound => eprintln!("{}: not found", report.name),
                TeardownOutcome::InUse { blockers } => {
                    eprintln!("{}: in use, not touched", report.name);
                    for b in blockers {
                        eprintln!("  pid {:>7}  {}", b.pid, b.cmdline);
                    }
                }
                TeardownOutcome::Aborted { reason } => {
                    eprintln!("{}: aborted ({:?})", report.name, reason);
                }
            }
        }
    }

    if summary.failed {
        std::process::exit(1);
    }
    Ok(())
}
