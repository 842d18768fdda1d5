//! Escalation state machine
//!
//! Owns the per-environment retry budget and the decision about signaling
//! blocking processes when unmounting stalls. The machine is pure state:
//! all I/O (signal delivery, prompts, sleeps) happens in the caller, which
//! keeps every transition unit-testable.

use crate::config::types::{AbortReason, RetryBudget, SignalStrength};
use crate::kernel::proc::ProcessRecord;
use log::debug;

/// Controller lifecycle:
/// `Trying -> AwaitingDecision -> Escalating -> Trying`, terminal
/// `Cleared` / `Aborted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationState {
    Trying,
    AwaitingDecision,
    Escalating,
    Cleared,
    Aborted(AbortReason),
}

/// Operator (or policy) answer at a decision point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Send the current signal strength
    Proceed,
    /// Jump to the strongest signal and send it
    Escalate,
    /// List blockers, change nothing
    ListOnly,
    /// Give up on this environment
    Abort,
}

/// Context handed to a decision provider.
pub struct DecisionContext<'a> {
    pub env_name: &'a str,
    pub attempts: u32,
    pub strength: SignalStrength,
    pub blockers: &'a [&'a ProcessRecord],
}

/// Pluggable confirmation capability. Non-interactive policies are fixed
/// answers; the CLI supplies a prompting implementation.
pub trait DecisionProvider {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Decision;

    /// Whether a human is behind the answers. Distinguishes `UserDeclined`
    /// from `BudgetExhausted` when the decision is `Abort`.
    fn interactive(&self) -> bool {
        false
    }
}

/// Fixed-policy provider: always answers the same.
pub struct PolicyDecision(pub Decision);

impl DecisionProvider for PolicyDecision {
    fn decide(&self, _ctx: &DecisionContext<'_>) -> Decision {
        self.0
    }
}

/// Per-environment retry bookkeeping. Owned by the controller for one
/// teardown run, discarded afterward.
#[derive(Clone, Copy, Debug)]
pub struct RetryState {
    pub attempts: u32,
    pub strength: SignalStrength,
    pub budget: RetryBudget,
}

/// What the caller must do after a decision point resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationAction {
    /// Signal every current blocker with this strength
    Signal(SignalStrength),
    /// Print blockers, then keep trying (attempt counter untouched)
    ListOnly,
    /// Stop tearing this environment down
    Abort(AbortReason),
}

pub struct EscalationController<'a> {
    state: EscalationState,
    retry: RetryState,
    provider: &'a dyn DecisionProvider,
}

impl<'a> EscalationController<'a> {
    pub fn new(budget: RetryBudget, provider: &'a dyn DecisionProvider) -> Self {
        Self {
            state: EscalationState::Trying,
            retry: RetryState {
                attempts: 0,
                strength: SignalStrength::Term,
                budget,
            },
            provider,
        }
    }

    pub fn state(&self) -> EscalationState {
        self.state
    }

    pub fn strength(&self) -> SignalStrength {
        self.retry.strength
    }

    pub fn attempts(&self) -> u32 {
        self.retry.attempts
    }

    /// No targets remain. Terminal.
    pub fn note_cleared(&mut self) {
        self.state = EscalationState::Cleared;
    }

    /// Abort from outside the decision path (race detection).
    pub fn abort(&mut self, reason: AbortReason) {
        self.state = EscalationState::Aborted(reason);
    }

    /// Record one failed unmount pass. Returns true when the budget is
    /// exhausted and a decision is now due. A patient budget never leaves
    /// `Trying`.
    pub fn note_failed_pass(&mut self) -> bool {
        debug_assert_eq!(self.state, EscalationState::Trying);
        self.retry.attempts += 1;
        match self.retry.budget {
            RetryBudget::Patient => false,
            RetryBudget::Limited(n) => {
                if self.retry.attempts >= n {
                    debug!(
                        "retry budget exhausted after {} pass(es)",
                        self.retry.attempts
                    );
                    self.state = EscalationState::AwaitingDecision;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Resolve a decision point via the provider.
    pub fn resolve(&mut self, ctx: &DecisionContext<'_>) -> EscalationAction {
        debug_assert_eq!(self.state, EscalationState::AwaitingDecision);
        match self.provider.decide(ctx) {
            Decision::Proceed => {
                self.state = EscalationState::Escalating;
                EscalationAction::Signal(self.retry.strength)
            }
            Decision::Escalate => {
                self.retry.strength = SignalStrength::Kill;
                self.state = EscalationState::Escalating;
                EscalationAction::Signal(self.retry.strength)
            }
            Decision::ListOnly => {
                // back to Trying with the counter intact: the next failed
                // pass re-opens the decision point immediately
                self.state = EscalationState::Trying;
                EscalationAction::ListOnly
            }
            Decision::Abort => {
                let reason = if self.provider.interactive() {
                    AbortReason::UserDeclined
                } else {
                    AbortReason::BudgetExhausted
                };
                self.state = EscalationState::Aborted(reason);
                EscalationAction::Abort(reason)
            }
        }
    }

    /// Signals were delivered; resume trying with a fresh attempt budget.
    ///
    /// A graceful round that did not clear the tree is not repeated: once
    /// any signal cycle completes, strength is pinned to the strongest
    /// level for the rest of the run. Strength never decreases.
    pub fn note_signaled(&mut self) {
        debug_assert_eq!(self.state, EscalationState::Escalating);
        self.retry.strength = SignalStrength::Kill;
        self.retry.attempts = 0;
        self.state = EscalationState::Trying;
    }
}
