//! Proposal lifecycle management.
//!
//! Proposals go through states: Pending -> Active -> Succeeded/Defeated -> Queued -> Executed.
//! Pending, Active, Succeeded and Defeated are always derived from the clock
//! and the tally. Queued, Executed and Canceled are latched by explicit
//! operations and never recomputed away.

use std::collections::BTreeMap;
use std::fmt;

use cvdao_types::{Address, Amount, Timestamp, VotingPower};
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;
use crate::ledger::VotingPowerLedger;
use crate::params::{ProposalParams, ProposalType};
use crate::voting::VoteTally;

/// Proposal status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    /// Created, voting not yet open
    Pending,
    /// Voting is open
    Active,
    /// Voting closed with quorum and a majority for
    Succeeded,
    /// Scheduled for execution
    Queued,
    /// Funds transferred
    Executed,
    /// Voting closed without quorum or majority
    Defeated,
    /// Withdrawn before voting closed
    Canceled,
}

impl ProposalState {
    /// Numeric code used by external callers.
    pub fn code(&self) -> u8 {
        match self {
            ProposalState::Pending => 0,
            ProposalState::Active => 1,
            ProposalState::Succeeded => 2,
            ProposalState::Queued => 3,
            ProposalState::Executed => 4,
            ProposalState::Defeated => 5,
            ProposalState::Canceled => 6,
        }
    }

    /// No operation can move the proposal out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Executed | ProposalState::Defeated | ProposalState::Canceled
        )
    }

    /// Set by an explicit operation rather than derived from time.
    pub fn is_latched(&self) -> bool {
        matches!(
            self,
            ProposalState::Queued | ProposalState::Executed | ProposalState::Canceled
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Funding proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique proposal ID
    pub id: u64,
    /// Proposer address
    pub proposer: Address,
    /// Transfer target
    pub recipient: Address,
    /// Transfer quantity
    pub amount: Amount,
    /// Description
    pub description: String,
    /// Proposal type
    pub proposal_type: ProposalType,
    /// Parameters fixed at creation
    pub params: ProposalParams,
    pub created_at: Timestamp,
    /// Snapshot time for voting power and supply
    pub voting_start: Timestamp,
    pub voting_end: Timestamp,
    pub tally: VoteTally,
    /// Earliest execution time, set when queued
    pub eta: Option<Timestamp>,
    pub executed_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    latched: Option<ProposalState>,
}

impl Proposal {
    /// Resolve the state at `now`.
    ///
    /// `snapshot_supply` is only consulted once voting has closed, and
    /// receives `voting_start`.
    pub fn state_at<F>(&self, now: Timestamp, snapshot_supply: F) -> ProposalState
    where
        F: FnOnce(Timestamp) -> VotingPower,
    {
        if let Some(latched) = self.latched {
            return latched;
        }
        if now < self.voting_start {
            return ProposalState::Pending;
        }
        if now < self.voting_end {
            return ProposalState::Active;
        }

        let required = self.params.quorum_votes(snapshot_supply(self.voting_start));
        if self.tally.quorum_reached(required) && self.tally.vote_succeeded() {
            ProposalState::Succeeded
        } else {
            ProposalState::Defeated
        }
    }

    /// Resolve the state at `now` against a ledger.
    pub fn state(&self, now: Timestamp, ledger: &dyn VotingPowerLedger) -> ProposalState {
        self.state_at(now, |at| ledger.total_supply(at))
    }

    /// Latched state, if any.
    pub fn latched(&self) -> Option<ProposalState> {
        self.latched
    }

    pub(crate) fn latch(&mut self, state: ProposalState) {
        debug_assert!(state.is_latched());
        self.latched = Some(state);
    }

    /// Undo a latch taken optimistically before an external call.
    pub(crate) fn restore_latch(&mut self, previous: Option<ProposalState>) {
        self.latched = previous;
    }
}

/// Everything needed to create a proposal.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub proposer: Address,
    pub recipient: Address,
    pub amount: Amount,
    pub description: String,
    pub proposal_type: ProposalType,
}

/// Proposal registry managing all proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRegistry {
    proposals: BTreeMap<u64, Proposal>,
    next_id: u64,
}

impl ProposalRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self {
            proposals: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Create a new proposal.
    ///
    /// Voting opens `voting_delay` seconds after `now` so that the snapshot never
    /// lands on the creation instant.
    pub fn create(
        &mut self,
        new: NewProposal,
        params: ProposalParams,
        voting_delay: u64,
        now: Timestamp,
    ) -> Result<u64, GovernanceError> {
        if new.amount == 0 {
            return Err(GovernanceError::InvalidArgument("Amount must be greater than zero".to_string()));
        }
        if new.recipient.is_zero() {
            return Err(GovernanceError::InvalidArgument("Recipient cannot be the zero address".to_string()));
        }
        let voting_start = now
            .checked_add(voting_delay)
            .ok_or_else(|| GovernanceError::InvalidArgument("Voting start overflows".to_string()))?;
        let voting_end = voting_start
            .checked_add(params.voting_period)
            .ok_or_else(|| GovernanceError::InvalidArgument("Voting end overflows".to_string()))?;

        let id = self.next_id;
        self.next_id = id + 1;

        let proposal = Proposal {
            id,
            proposer: new.proposer,
            recipient: new.recipient,
            amount: new.amount,
            description: new.description,
            proposal_type: new.proposal_type,
            params,
            created_at: now,
            voting_start,
            voting_end,
            tally: VoteTally::new(),
            eta: None,
            executed_at: None,
            canceled_at: None,
            latched: None,
        };

        self.proposals.insert(id, proposal);
        Ok(id)
    }

    /// Get a proposal.
    pub fn get(&self, id: u64) -> Result<&Proposal, GovernanceError> {
        self.proposals.get(&id).ok_or(GovernanceError::ProposalNotFound(id))
    }

    /// Get a proposal mutably.
    pub fn get_mut(&mut self, id: u64) -> Result<&mut Proposal, GovernanceError> {
        self.proposals.get_mut(&id).ok_or(GovernanceError::ProposalNotFound(id))
    }

    /// Number of proposals ever created; also the id of the latest one.
    pub fn count(&self) -> u64 {
        self.next_id.saturating_sub(1)
    }

    /// Resolve a proposal's state.
    pub fn state(
        &self,
        id: u64,
        now: Timestamp,
        ledger: &dyn VotingPowerLedger,
    ) -> Result<ProposalState, GovernanceError> {
        Ok(self.get(id)?.state(now, ledger))
    }

    /// Latch Canceled. Only Pending or Active proposals can be canceled.
    pub fn cancel(
        &mut self,
        id: u64,
        now: Timestamp,
        ledger: &dyn VotingPowerLedger,
    ) -> Result<(), GovernanceError> {
        let proposal = self.get_mut(id)?;
        let state = proposal.state(now, ledger);
        if !matches!(state, ProposalState::Pending | ProposalState::Active) {
            return Err(GovernanceError::InvalidState(format!(
                "Cannot cancel proposal {} in state {}",
                id, state
            )));
        }

        proposal.latch(ProposalState::Canceled);
        proposal.canceled_at = Some(now);
        Ok(())
    }

    /// Get all proposals in id order.
    pub fn all(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Ids of proposals currently in `state`.
    pub fn by_state(
        &self,
        state: ProposalState,
        now: Timestamp,
        ledger: &dyn VotingPowerLedger,
    ) -> Vec<u64> {
        self.proposals
            .values()
            .filter(|p| p.state(now, ledger) == state)
            .map(|p| p.id)
            .collect()
    }
}

impl Default for ProposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}
