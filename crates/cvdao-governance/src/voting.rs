//! Weighted vote tallying.
//!
//! One vote per address per proposal, weighted by snapshot power and
//! immutable once cast.

use std::collections::BTreeMap;
use std::fmt;

use cvdao_types::{Address, VotingPower};
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Vote support options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteSupport {
    /// Vote against
    Against,
    /// Vote in favor
    For,
    /// Abstain (counts toward quorum only)
    Abstain,
}

impl VoteSupport {
    /// Numeric code used by external callers.
    pub fn code(&self) -> u8 {
        match self {
            VoteSupport::Against => 0,
            VoteSupport::For => 1,
            VoteSupport::Abstain => 2,
        }
    }
}

impl TryFrom<u8> for VoteSupport {
    type Error = GovernanceError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(VoteSupport::Against),
            1 => Ok(VoteSupport::For),
            2 => Ok(VoteSupport::Abstain),
            other => Err(GovernanceError::InvalidArgument(format!(
                "Unknown vote support code {}",
                other
            ))),
        }
    }
}

impl fmt::Display for VoteSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoteSupport::Against => "Against",
            VoteSupport::For => "For",
            VoteSupport::Abstain => "Abstain",
        };
        f.write_str(name)
    }
}

/// What a single voter cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub support: VoteSupport,
    pub weight: VotingPower,
}

/// Running totals and voter set for one proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_votes: VotingPower,
    pub against_votes: VotingPower,
    pub abstain_votes: VotingPower,
    receipts: BTreeMap<Address, VoteReceipt>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `voter`'s vote with `weight`.
    ///
    /// Fails without touching the tally if the voter already voted, the
    /// weight is zero, or a bucket would overflow.
    pub fn record(
        &mut self,
        voter: Address,
        support: VoteSupport,
        weight: VotingPower,
    ) -> Result<(), GovernanceError> {
        if self.receipts.contains_key(&voter) {
            return Err(GovernanceError::AlreadyVoted(voter.to_string()));
        }
        if weight == 0 {
            return Err(GovernanceError::ZeroWeight(voter.to_string()));
        }

        // the grand total bounds every bucket
        self.total()
            .checked_add(weight)
            .ok_or_else(|| GovernanceError::InvalidArgument("Vote weight overflows tally".to_string()))?;

        match support {
            VoteSupport::For => self.for_votes += weight,
            VoteSupport::Against => self.against_votes += weight,
            VoteSupport::Abstain => self.abstain_votes += weight,
        }
        self.receipts.insert(voter, VoteReceipt { support, weight });
        Ok(())
    }

    /// Get total votes cast.
    pub fn total(&self) -> VotingPower {
        self.for_votes + self.against_votes + self.abstain_votes
    }

    /// Participation meets `required`.
    pub fn quorum_reached(&self, required: VotingPower) -> bool {
        self.total() >= required
    }

    /// Strict majority of decisive votes in favor.
    pub fn vote_succeeded(&self) -> bool {
        self.for_votes > self.against_votes
    }

    /// Check if voter has voted.
    pub fn has_voted(&self, voter: &Address) -> bool {
        self.receipts.contains_key(voter)
    }

    pub fn receipt(&self, voter: &Address) -> Option<VoteReceipt> {
        self.receipts.get(voter).copied()
    }

    pub fn voter_count(&self) -> usize {
        self.receipts.len()
    }

    /// Voters in address order.
    pub fn voters(&self) -> impl Iterator<Item = &Address> {
        self.receipts.keys()
    }
}
