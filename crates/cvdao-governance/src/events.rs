//! Governance event log.

use cvdao_types::{Address, Amount, Timestamp, VotingPower};
use serde::{Deserialize, Serialize};

use crate::access::Role;
use crate::params::ProposalType;
use crate::voting::VoteSupport;

/// Observable state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GovernanceEvent {
    ProposalCreated {
        id: u64,
        proposer: Address,
        recipient: Address,
        amount: Amount,
        proposal_type: ProposalType,
        voting_start: Timestamp,
        voting_end: Timestamp,
        description: String,
    },
    VoteCast {
        id: u64,
        voter: Address,
        support: VoteSupport,
        weight: VotingPower,
        reason: Option<String>,
    },
    ProposalQueued {
        id: u64,
        eta: Timestamp,
    },
    ProposalExecuted {
        id: u64,
        recipient: Address,
        amount: Amount,
    },
    ProposalCanceled {
        id: u64,
    },
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
}

/// Event stamped with the time it was emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: Timestamp,
    pub event: GovernanceEvent,
}
