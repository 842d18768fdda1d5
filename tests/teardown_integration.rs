//! Integration tests for the teardown engine
//!
//! These exercise cross-module flows on the real host: live /proc
//! snapshots, mount-free environment teardown, and the escalation state
//! machine driven by scripted decision providers. No test mounts anything.

use std::cell::Cell;

use unbox::config::types::{
    AbortReason, Environment, RetryBudget, SignalStrength, TeardownConfig,
};
use unbox::core::escalate::{
    Decision, DecisionContext, DecisionProvider, EscalationAction, EscalationController,
    EscalationState, PolicyDecision,
};
use unbox::core::usage;
use unbox::kernel::proc;
use unbox::{TeardownOrchestrator, TeardownOutcome};

/// Provider that replays a fixed script of answers.
struct ScriptedProvider {
    script: Vec<Decision>,
    next: Cell<usize>,
}

impl ScriptedProvider {
    fn new(script: Vec<Decision>) -> Self {
        Self {
            script,
            next: Cell::new(0),
        }
    }
}

impl DecisionProvider for ScriptedProvider {
    fn decide(&self, _ctx: &DecisionContext<'_>) -> Decision {
        let idx = self.next.get();
        self.next.set(idx + 1);
        self.script[idx.min(self.script.len() - 1)]
    }

    fn interactive(&self) -> bool {
        true
    }
}

#[test]
fn test_live_snapshot_sees_this_process_as_claimant_of_root() {
    let snap = proc::snapshot().unwrap();
    let me = std::process::id() as i32;

    // the test runner runs with root "/", so "/" is contained usage
    let listed = usage::contained(&snap, std::path::Path::new("/"));
    assert!(listed.iter().any(|r| r.pid == me));
}

#[test]
fn test_force_empties_blocker_list_on_live_host() {
    let snap = proc::snapshot().unwrap();
    let (in_use, blockers) = usage::is_in_use(&snap, std::path::Path::new("/"), true);
    assert!(!in_use);
    assert!(blockers.is_empty());
}

#[test]
fn test_mount_free_environments_clear_end_to_end() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let cfg = TeardownConfig::default();
    let policy = PolicyDecision(Decision::Abort);
    let orch = TeardownOrchestrator::new(&cfg, &policy);

    let envs = vec![
        Environment::new("a", a.path()),
        Environment::new("b", b.path()),
    ];
    let summary = orch.run(&envs).unwrap();
    assert!(!summary.failed);
    assert!(summary.reports.iter().all(|r| r.outcome.is_cleared()));
}

#[test]
fn test_missing_environment_fails_the_run_but_not_other_envs() {
    let ok = tempfile::tempdir().unwrap();
    let cfg = TeardownConfig::default();
    let policy = PolicyDecision(Decision::Abort);
    let orch = TeardownOrchestrator::new(&cfg, &policy);

    let envs = vec![
        Environment::new("ghost", "/nonexistent/unbox/envs/ghost"),
        Environment::new("ok", ok.path()),
    ];
    let summary = orch.run(&envs).unwrap();
    assert!(summary.failed);
    assert!(matches!(
        summary.reports[0].outcome,
        TeardownOutcome::NotFound
    ));
    assert!(summary.reports[1].outcome.is_cleared());
}

#[test]
fn test_interactive_list_then_confirm_then_escalate_cycle() {
    // operator first lists, then confirms the graceful signal; the cycle
    // after a completed graceful round is forceful
    let provider = ScriptedProvider::new(vec![Decision::ListOnly, Decision::Proceed]);
    let mut ctl = EscalationController::new(RetryBudget::Limited(2), &provider);

    assert!(!ctl.note_failed_pass());
    assert!(ctl.note_failed_pass());

    let ctx = DecisionContext {
        env_name: "baz",
        attempts: ctl.attempts(),
        strength: ctl.strength(),
        blockers: &[],
    };
    assert_eq!(ctl.resolve(&ctx), EscalationAction::ListOnly);

    // counter untouched: next failure reopens the decision point
    assert!(ctl.note_failed_pass());
    let ctx = DecisionContext {
        env_name: "baz",
        attempts: ctl.attempts(),
        strength: ctl.strength(),
        blockers: &[],
    };
    assert_eq!(
        ctl.resolve(&ctx),
        EscalationAction::Signal(SignalStrength::Term)
    );
    ctl.note_signaled();

    // graceful round done, everything from here on is forceful
    assert_eq!(ctl.strength(), SignalStrength::Kill);
    assert_eq!(ctl.state(), EscalationState::Trying);
}

#[test]
fn test_interactive_decline_aborts_as_user_declined() {
    let provider = ScriptedProvider::new(vec![Decision::Abort]);
    let mut ctl = EscalationController::new(RetryBudget::Limited(1), &provider);

    assert!(ctl.note_failed_pass());
    let ctx = DecisionContext {
        env_name: "baz",
        attempts: ctl.attempts(),
        strength: ctl.strength(),
        blockers: &[],
    };
    assert_eq!(
        ctl.resolve(&ctx),
        EscalationAction::Abort(AbortReason::UserDeclined)
    );
}

#[test]
fn test_summary_serializes_for_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TeardownConfig::default();
    let policy = PolicyDecision(Decision::Abort);
    let orch = TeardownOrchestrator::new(&cfg, &policy);

    let summary = orch
        .run(&[Environment::new("solo", dir.path())])
        .unwrap();
    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"name\":\"solo\""));
    assert!(json.contains("\"outcome\":\"cleared\""));
    assert!(json.contains("\"failed\":false"));
}
