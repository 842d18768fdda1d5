//! Per-environment teardown control flow
//!
//! Drives the usage gate, the slave-propagation guard, and the
//! unmount/escalation loop, then aggregates one outcome per environment.
//! Environments are processed sequentially; every pass re-reads the process
//! and mount tables since both change between retries.

use crate::config::types::{
    AbortReason, Environment, Result, TeardownConfig,
};
use crate::core::escalate::{
    DecisionContext, DecisionProvider, EscalationAction, EscalationController,
};
use crate::core::{teardown, usage};
use crate::kernel::{mount, proc, signal};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Serializable view of a blocking process for reports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockerInfo {
    pub pid: i32,
    pub root: PathBuf,
    pub cmdline: String,
}

impl From<&proc::ProcessRecord> for BlockerInfo {
    fn from(r: &proc::ProcessRecord) -> Self {
        Self {
            pid: r.pid,
            root: r.root.clone(),
            cmdline: r.cmdline.clone(),
        }
    }
}

/// Final outcome for one environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// No mount targets remain under the environment
    Cleared,
    /// Environment path absent on disk
    NotFound,
    /// Usage gate found live claimants and force was not set
    InUse { blockers: Vec<BlockerInfo> },
    /// Teardown gave up mid-run
    Aborted { reason: AbortReason },
}

impl TeardownOutcome {
    pub fn is_cleared(&self) -> bool {
        matches!(self, TeardownOutcome::Cleared)
    }
}

/// One environment's report in the run summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: TeardownOutcome,
}

/// Aggregated result of a whole run. One failure flag across all
/// environments; the CLI turns it into the process exit code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<EnvReport>,
    pub failed: bool,
}

/// Mid-run race rule: a blocker that was never signaled this run means
/// another teardown-worthy claimant started using the environment while we
/// were tearing it down. Processes we already signaled may linger while
/// they shut down and are not fresh claimants. With the gate forced open
/// `in_use` is always false and the check is disabled.
pub(crate) fn race_detected(
    in_use: bool,
    blockers: &[&proc::ProcessRecord],
    signaled: &HashSet<i32>,
) -> bool {
    in_use && blockers.iter().any(|r| !signaled.contains(&r.pid))
}

pub struct TeardownOrchestrator<'a> {
    cfg: &'a TeardownConfig,
    provider: &'a dyn DecisionProvider,
}

impl<'a> TeardownOrchestrator<'a> {
    pub fn new(cfg: &'a TeardownConfig, provider: &'a dyn DecisionProvider) -> Self {
        Self { cfg, provider }
    }

    /// Tear down every environment in turn, then release the shared
    /// restricted-path override if nothing still claims it.
    pub fn run(&self, envs: &[Environment]) -> Result<RunSummary> {
        let mut reports = Vec::with_capacity(envs.len());
        let mut failed = false;

        for env in envs {
            let outcome = self.teardown_env(env)?;
            match &outcome {
                TeardownOutcome::Cleared => info!("{}: cleared", env.name),
                TeardownOutcome::NotFound => warn!("{}: not found", env.name),
                TeardownOutcome::InUse { blockers } => {
                    warn!("{}: in use by {} process(es)", env.name, blockers.len());
                }
                TeardownOutcome::Aborted { reason } => {
                    warn!("{}: aborted ({:?})", env.name, reason);
                }
            }
            failed |= !outcome.is_cleared();
            reports.push(EnvReport {
                name: env.name.clone(),
                outcome,
            });
        }

        if let Some(shared) = &self.cfg.shared_root {
            self.release_shared_root(shared, envs)?;
        }

        Ok(RunSummary { reports, failed })
    }

    /// The per-environment control flow: gate, guard, unmount/escalate.
    pub fn teardown_env(&self, env: &Environment) -> Result<TeardownOutcome> {
        let snap = proc::snapshot()?;
        self.teardown_env_with(env, &snap)
    }

    /// Gate and tear down against a caller-supplied process snapshot.
    /// Later passes inside the unmount loop still re-scan fresh.
    pub fn teardown_env_with(
        &self,
        env: &Environment,
        snap: &proc::ProcessSnapshot,
    ) -> Result<TeardownOutcome> {
        let path = env.teardown_path();
        if !path.exists() {
            return Ok(TeardownOutcome::NotFound);
        }
        let canonical = fs::canonicalize(path)?;
        info!("tearing down {} at {}", env.name, canonical.display());

        // usage gate: never unmount or signal under a live claimant
        let (in_use, blockers) = usage::is_in_use(snap, &canonical, self.cfg.force);
        if in_use {
            return Ok(TeardownOutcome::InUse {
                blockers: blockers.iter().map(|r| BlockerInfo::from(*r)).collect(),
            });
        }

        if mount::targets_under(&canonical)?.is_empty() {
            // nothing mounted, no escalation machinery needed
            return Ok(TeardownOutcome::Cleared);
        }

        self.unmount_loop(env, &canonical)
    }

    fn unmount_loop(&self, env: &Environment, canonical: &Path) -> Result<TeardownOutcome> {
        let media = canonical.join(&self.cfg.media_dir);
        let mut ctl = EscalationController::new(self.cfg.retry_budget, self.provider);
        let mut signaled: HashSet<i32> = HashSet::new();

        loop {
            // keep host-wide media mounts out of the blast radius before
            // every attempt; idempotent, skipped when not mounted
            mount::guard_shared_bind(&media)?;

            let pass = teardown::unmount_pass(canonical)?;
            if pass.cleared() {
                ctl.note_cleared();
                return Ok(TeardownOutcome::Cleared);
            }
            info!(
                "{}: {} mount(s) still held",
                env.name,
                pass.remaining.len()
            );

            // re-validate usage on every failed pass
            let snap = proc::snapshot()?;
            let (in_use, fresh) = usage::is_in_use(&snap, canonical, self.cfg.force);
            if race_detected(in_use, &fresh, &signaled) {
                warn!("{}: new claimant appeared mid-teardown", env.name);
                ctl.abort(AbortReason::RaceDetected);
                return Ok(TeardownOutcome::Aborted {
                    reason: AbortReason::RaceDetected,
                });
            }

            if ctl.note_failed_pass() {
                let contained = usage::contained(&snap, canonical);
                let ctx = DecisionContext {
                    env_name: &env.name,
                    attempts: ctl.attempts(),
                    strength: ctl.strength(),
                    blockers: &contained,
                };
                match ctl.resolve(&ctx) {
                    EscalationAction::Signal(strength) => {
                        // fresh listing: pids from the decision context may
                        // have exited while the decision was pending
                        let snap = proc::snapshot()?;
                        let targets = usage::contained(&snap, canonical);
                        info!(
                            "{}: signaling {} process(es) with {:?}",
                            env.name,
                            targets.len(),
                            strength
                        );
                        for record in &targets {
                            signal::send(record.pid, strength);
                            signaled.insert(record.pid);
                        }
                        ctl.note_signaled();
                    }
                    EscalationAction::ListOnly => {
                        for record in &contained {
                            info!(
                                "{}: blocked by pid {} (root {}): {}",
                                env.name,
                                record.pid,
                                record.root.display(),
                                record.cmdline
                            );
                        }
                    }
                    EscalationAction::Abort(reason) => {
                        return Ok(TeardownOutcome::Aborted { reason });
                    }
                }
            }

            thread::sleep(Duration::from_millis(self.cfg.pause_ms));
        }
    }

    /// Release the shared restricted-path override, but only when a fresh
    /// scan shows no process rooted under it and no environment that
    /// resolves into it still has mounts. Usage-based on purpose:
    /// last-writer-wins bookkeeping is unsafe for kernel-owned state.
    fn release_shared_root(&self, shared: &Path, envs: &[Environment]) -> Result<()> {
        if !mount::is_mounted(shared)? {
            return Ok(());
        }

        let snap = proc::snapshot()?;
        if !usage::contained(&snap, shared).is_empty() {
            info!(
                "shared root {} still in use by processes, keeping",
                shared.display()
            );
            return Ok(());
        }

        for env in envs {
            let path = env.teardown_path();
            if !path.starts_with(shared) || !path.exists() {
                continue;
            }
            let canonical = fs::canonicalize(path)?;
            if !mount::targets_under(&canonical)?.is_empty() {
                info!(
                    "shared root {} still claimed by {}, keeping",
                    shared.display(),
                    env.name
                );
                return Ok(());
            }
        }

        info!("releasing shared root {}", shared.display());
        mount::detach(shared);
        Ok(())
    }
}
