//! Pass serialization and trigger coalescing.
//!
//! ```text
//! Idle --trigger--> ReconcilePending --begin--> Reconciling --complete--> Idle
//!                                                    |
//!                                   trigger while reconciling sets `pending`,
//!                                   complete then returns to ReconcilePending
//! ```
//!
//! Any number of triggers while a pass is in flight collapse into a single
//! follow-up pass.

/// Controller pass state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Idle,
    ReconcilePending,
    Reconciling {
        /// A trigger arrived after this pass read its snapshot.
        pending: bool,
    },
}

impl std::fmt::Display for PassState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassState::Idle => write!(f, "idle"),
            PassState::ReconcilePending => write!(f, "reconcile_pending"),
            PassState::Reconciling { pending: false } => write!(f, "reconciling"),
            PassState::Reconciling { pending: true } => write!(f, "reconciling+pending"),
        }
    }
}

/// Tracks the pass state machine. Not thread-safe; owned by the event loop.
#[derive(Debug, Default)]
pub struct PassGate {
    state: PassState,
    coalesced: u64,
}

impl PassGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Triggers absorbed into an already pending pass.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Request a pass. Returns true if this trigger created new work.
    pub fn trigger(&mut self) -> bool {
        match self.state {
            PassState::Idle => {
                self.state = PassState::ReconcilePending;
                true
            }
            PassState::Reconciling { pending: false } => {
                self.state = PassState::Reconciling { pending: true };
                true
            }
            PassState::ReconcilePending | PassState::Reconciling { pending: true } => {
                self.coalesced += 1;
                false
            }
        }
    }

    /// Start the pending pass, if any.
    pub fn begin(&mut self) -> bool {
        match self.state {
            PassState::ReconcilePending => {
                self.state = PassState::Reconciling { pending: false };
                true
            }
            _ => false,
        }
    }

    /// Finish the in-flight pass. Returns true if another pass is pending.
    pub fn complete(&mut self) -> bool {
        match self.state {
            PassState::Reconciling { pending: true } => {
                self.state = PassState::ReconcilePending;
                true
            }
            PassState::Reconciling { pending: false } => {
                self.state = PassState::Idle;
                false
            }
            other => other == PassState::ReconcilePending,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == PassState::Idle
    }
}
