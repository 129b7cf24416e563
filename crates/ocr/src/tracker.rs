use serde::Serialize;
use thiserror::Error;

use crate::types::{BlockId, Role, RowId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("amount block {block} already claimed as {existing}, refused {attempted}")]
    AlreadyClaimed {
        block: BlockId,
        existing: Role,
        attempted: Role,
    },
    #[error("amount block {0} is outside this run")]
    UnknownBlock(BlockId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub block: BlockId,
    pub role: Role,
    pub row: RowId,
}

/// Claim ledger over amount blocks: each block takes at most one role per run.
///
/// Slots are indexed by [`BlockId`], so the ledger is sized once at ingestion.
#[derive(Debug, Clone)]
pub struct AmountUsageTracker {
    slots: Vec<Option<Claim>>,
}

impl AmountUsageTracker {
    pub fn new(block_count: usize) -> Self {
        Self { slots: vec![None; block_count] }
    }

    pub fn claim(&mut self, block: BlockId, role: Role, row: RowId) -> Result<(), ClaimError> {
        let slot = self
            .slots
            .get_mut(block.0)
            .ok_or(ClaimError::UnknownBlock(block))?;
        if let Some(existing) = slot {
            return Err(ClaimError::AlreadyClaimed {
                block,
                existing: existing.role,
                attempted: role,
            });
        }
        *slot = Some(Claim { block, role, row });
        tracing::debug!(%block, %role, %row, "claimed amount");
        Ok(())
    }

    pub fn is_claimed(&self, block: BlockId) -> bool {
        self.slots.get(block.0).is_some_and(Option::is_some)
    }

    pub fn role_of(&self, block: BlockId) -> Option<Role> {
        self.slots.get(block.0).copied().flatten().map(|c| c.role)
    }

    /// Every claim, in block order.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.slots.iter().flatten()
    }

    pub fn count(&self, role: Role) -> usize {
        self.claims().filter(|c| c.role == role).count()
    }
}

/// Records a claim, turning a refusal into an `error_log` line instead of aborting the run.
pub(crate) fn claim_or_log(
    tracker: &mut AmountUsageTracker,
    error_log: &mut Vec<String>,
    block: BlockId,
    role: Role,
    row: RowId,
) -> bool {
    match tracker.claim(block, role, row) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "double claim refused");
            error_log.push(e.to_string());
            false
        }
    }
}
