//! Program and claim status state machines.

use chrono::Utc;
use tracing::debug;

use crate::error::DomainError;
use crate::types::{ClaimStatus, Program, ProgramStatus};

/// Outcome of a program status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Status before the update
    pub previous: ProgramStatus,
    /// Status after the update
    pub current: ProgramStatus,
    /// Whether the anchor id was changed
    pub anchor_changed: bool,
}

impl StatusChange {
    pub fn status_changed(&self) -> bool {
        self.previous != self.current
    }

    /// Nothing was written.
    pub fn is_noop(&self) -> bool {
        !self.status_changed() && !self.anchor_changed
    }
}

/// Program lifecycle: DRAFT → ACTIVE → ARCHIVED.
///
/// ACTIVE → DRAFT is forbidden and ARCHIVED has no outgoing transitions.
/// Same-state requests always succeed without mutation.
pub struct ProgramLifecycle;

impl ProgramLifecycle {
    /// Resolve a requested status against the current one.
    pub fn transition(
        current: ProgramStatus,
        requested: ProgramStatus,
    ) -> Result<ProgramStatus, DomainError> {
        use ProgramStatus::*;

        match (current, requested) {
            (c, r) if c == r => Ok(c),
            (Active, Draft) => Err(DomainError::illegal(current, requested)),
            (Archived, _) => Err(DomainError::illegal(current, requested)),
            (Draft, Active) | (Draft, Archived) | (Active, Archived) => Ok(requested),
            _ => Err(DomainError::illegal(current, requested)),
        }
    }

    /// Apply a status update and optional anchor id to a program.
    ///
    /// The program is untouched when the transition is rejected.
    pub fn apply(
        program: &mut Program,
        requested: ProgramStatus,
        onchain_id: Option<String>,
    ) -> Result<StatusChange, DomainError> {
        let previous = program.status;
        let next = Self::transition(previous, requested)?;

        let anchor_changed = match onchain_id {
            Some(id) if program.onchain_id.as_deref() != Some(id.as_str()) => {
                program.onchain_id = Some(id);
                true
            }
            _ => false,
        };

        program.status = next;

        let change = StatusChange {
            previous,
            current: next,
            anchor_changed,
        };

        if !change.is_noop() {
            program.updated_at = Utc::now();
        }

        debug!(
            program_id = %program.id,
            from = %previous,
            to = %next,
            anchor_changed,
            "Program status resolved"
        );

        Ok(change)
    }
}

/// Result of a claim status advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAdvance {
    /// Claim is already in the target state
    NoOp,
    /// Claim moves to the target state
    Apply(ClaimStatus),
}

/// Claim lifecycle: PENDING → {APPROVED → DISBURSED | REJECTED}.
pub struct ClaimLifecycle;

impl ClaimLifecycle {
    /// Resolve an advance request. Requests for the current state are no-ops.
    pub fn advance(current: ClaimStatus, target: ClaimStatus) -> Result<ClaimAdvance, DomainError> {
        use ClaimStatus::*;

        if current == target {
            return Ok(ClaimAdvance::NoOp);
        }

        match (current, target) {
            (Pending, Approved) | (Pending, Rejected) | (Approved, Disbursed) => {
                Ok(ClaimAdvance::Apply(target))
            }
            _ => Err(DomainError::illegal(current, target)),
        }
    }
}
