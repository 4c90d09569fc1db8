//! Block lifecycle states
//!
//! ```text
//! Idle --begin_block--> BlockOpen --end_block--> Ended --commit--> Idle
//!   ^                       |                      |
//!   +--------reset----------+----------reset-------+
//! ```

use crate::executor::PendingBlock;

#[derive(Debug)]
pub enum LifecycleState {
    /// No open block
    Idle,
    /// Between begin_block and end_block; deliver_tx is legal
    BlockOpen(PendingBlock),
    /// Between end_block and commit
    Ended(PendingBlock),
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::BlockOpen(_) => "BlockOpen",
            Self::Ended(_) => "Ended",
        }
    }

    /// Block currently open or awaiting commit
    pub fn pending(&self) -> Option<&PendingBlock> {
        match self {
            Self::Idle => None,
            Self::BlockOpen(block) | Self::Ended(block) => Some(block),
        }
    }
}
