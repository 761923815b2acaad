//! Execution delay between success and execution.
//!
//! Queueing a succeeded proposal records `eta = now + execution_delay(type)`;
//! execution is refused until the clock reaches it.

use std::collections::BTreeMap;

use cvdao_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;
use crate::ledger::VotingPowerLedger;
use crate::proposal::{Proposal, ProposalState};

/// Index of queued proposals and their etas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelockQueue {
    scheduled: BTreeMap<u64, Timestamp>,
}

impl TimelockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every proposal latched Queued, keyed by its eta.
    pub fn from_proposals<'a>(
        proposals: impl IntoIterator<Item = &'a Proposal>,
    ) -> Result<Self, GovernanceError> {
        let mut scheduled = BTreeMap::new();
        for proposal in proposals {
            if proposal.latched() != Some(ProposalState::Queued) {
                continue;
            }
            let eta = proposal.eta.ok_or_else(|| {
                GovernanceError::InvalidArgument(format!("Queued proposal {} has no eta", proposal.id))
            })?;
            scheduled.insert(proposal.id, eta);
        }
        Ok(Self { scheduled })
    }

    /// Queue a succeeded proposal. Returns its eta.
    pub fn schedule(
        &mut self,
        proposal: &mut Proposal,
        now: Timestamp,
        ledger: &dyn VotingPowerLedger,
    ) -> Result<Timestamp, GovernanceError> {
        let state = proposal.state(now, ledger);
        if state != ProposalState::Succeeded {
            return Err(GovernanceError::InvalidState(format!(
                "Proposal {} must be Succeeded to queue, is {}",
                proposal.id, state
            )));
        }

        let eta = now
            .checked_add(proposal.params.execution_delay)
            .ok_or_else(|| GovernanceError::InvalidArgument("Eta overflows".to_string()))?;

        proposal.eta = Some(eta);
        proposal.latch(ProposalState::Queued);
        self.scheduled.insert(proposal.id, eta);
        Ok(eta)
    }

    /// Check a proposal is queued and due. Returns its eta.
    pub fn ensure_ready(&self, proposal: &Proposal, now: Timestamp) -> Result<Timestamp, GovernanceError> {
        match (proposal.latched(), proposal.eta) {
            (Some(ProposalState::Queued), Some(eta)) if now >= eta => Ok(eta),
            (Some(ProposalState::Queued), Some(eta)) => Err(GovernanceError::InvalidState(format!(
                "Proposal {} not executable until {} (now {})",
                proposal.id, eta, now
            ))),
            (latched, _) => Err(GovernanceError::InvalidState(format!(
                "Proposal {} is not queued ({:?})",
                proposal.id, latched
            ))),
        }
    }

    /// Drop a proposal from the index once executed.
    pub fn complete(&mut self, id: u64) -> Option<Timestamp> {
        self.scheduled.remove(&id)
    }

    pub fn eta(&self, id: u64) -> Option<Timestamp> {
        self.scheduled.get(&id).copied()
    }

    /// Queued ids whose eta has passed, earliest eta first.
    pub fn ready(&self, now: Timestamp) -> Vec<u64> {
        let mut due: Vec<(Timestamp, u64)> = self
            .scheduled
            .iter()
            .filter(|(_, eta)| **eta <= now)
            .map(|(id, eta)| (*eta, *id))
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamsTable, ProposalType};
    use crate::proposal::{NewProposal, ProposalRegistry};
    use crate::voting::VoteSupport;
    use cvdao_types::{Address, VotingPower};

    struct FixedSupply(VotingPower);

    impl VotingPowerLedger for FixedSupply {
        fn get_votes(&self, _: &Address, _: Timestamp) -> VotingPower {
            0
        }
        fn total_supply(&self, _: Timestamp) -> VotingPower {
            self.0
        }
    }

    fn succeeded(registry: &mut ProposalRegistry, proposal_type: ProposalType) -> (u64, Timestamp) {
        let params = ParamsTable::default().get(proposal_type);
        let id = registry
            .create(
                NewProposal {
                    proposer: Address::from_bytes([1u8; 20]),
                    recipient: Address::from_bytes([2u8; 20]),
                    amount: 10,
                    description: "Ops budget".to_string(),
                    proposal_type,
                },
                params,
                1,
                100,
            )
            .unwrap();
        let proposal = registry.get_mut(id).unwrap();
        proposal.tally.record(Address::from_bytes([3u8; 20]), VoteSupport::For, 5_000).unwrap();
        (id, proposal.voting_end)
    }

    #[test]
    fn test_schedule_sets_eta_from_type_delay() {
        let mut registry = ProposalRegistry::new();
        let mut queue = TimelockQueue::new();
        let (id, end) = succeeded(&mut registry, ProposalType::Standard);
        let ledger = FixedSupply(10_000);

        let proposal = registry.get_mut(id).unwrap();
        let eta = queue.schedule(proposal, end, &ledger).unwrap();

        assert_eq!(eta, end + 86_400);
        assert_eq!(proposal.eta, Some(eta));
        assert_eq!(proposal.state(end, &ledger), ProposalState::Queued);
        assert_eq!(queue.eta(id), Some(eta));
    }

    #[test]
    fn test_schedule_twice_fails() {
        let mut registry = ProposalRegistry::new();
        let mut queue = TimelockQueue::new();
        let (id, end) = succeeded(&mut registry, ProposalType::Operational);
        let ledger = FixedSupply(10_000);

        queue.schedule(registry.get_mut(id).unwrap(), end, &ledger).unwrap();
        let err = queue.schedule(registry.get_mut(id).unwrap(), end, &ledger).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState(_)));
    }

    #[test]
    fn test_schedule_requires_succeeded() {
        let mut registry = ProposalRegistry::new();
        let mut queue = TimelockQueue::new();
        let (id, end) = succeeded(&mut registry, ProposalType::Operational);

        // still active
        let ledger = FixedSupply(10_000);
        assert!(queue.schedule(registry.get_mut(id).unwrap(), end - 1, &ledger).is_err());

        // quorum missed against a huge supply
        let ledger = FixedSupply(1_000_000_000);
        assert!(queue.schedule(registry.get_mut(id).unwrap(), end, &ledger).is_err());
        assert!(queue.is_empty());
        assert_eq!(registry.get(id).unwrap().eta, None);
    }

    #[test]
    fn test_ensure_ready_waits_for_eta() {
        let mut registry = ProposalRegistry::new();
        let mut queue = TimelockQueue::new();
        let (id, end) = succeeded(&mut registry, ProposalType::HighConviction);
        let ledger = FixedSupply(10_000);

        let eta = queue.schedule(registry.get_mut(id).unwrap(), end, &ledger).unwrap();
        let proposal = registry.get(id).unwrap();

        assert!(queue.ensure_ready(proposal, eta - 1).is_err());
        assert_eq!(queue.ensure_ready(proposal, eta).unwrap(), eta);
    }

    #[test]
    fn test_from_proposals_indexes_only_queued() {
        let mut registry = ProposalRegistry::new();
        let mut queue = TimelockQueue::new();
        let ledger = FixedSupply(10_000);

        let (queued, end) = succeeded(&mut registry, ProposalType::Standard);
        let (_open, _) = succeeded(&mut registry, ProposalType::Standard);
        let eta = queue.schedule(registry.get_mut(queued).unwrap(), end, &ledger).unwrap();

        let rebuilt = TimelockQueue::from_proposals(registry.all()).unwrap();
        assert_eq!(rebuilt, queue);
        assert_eq!(rebuilt.ready(eta), vec![queued]);
    }

    #[test]
    fn test_from_proposals_rejects_queued_without_eta() {
        let mut registry = ProposalRegistry::new();
        let (id, _) = succeeded(&mut registry, ProposalType::Operational);
        registry.get_mut(id).unwrap().latch(ProposalState::Queued);

        let err = TimelockQueue::from_proposals(registry.all()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_ready_orders_by_eta() {
        let mut registry = ProposalRegistry::new();
        let mut queue = TimelockQueue::new();
        let ledger = FixedSupply(10_000);

        let (slow, slow_end) = succeeded(&mut registry, ProposalType::HighConviction);
        let (fast, fast_end) = succeeded(&mut registry, ProposalType::Operational);
        let slow_eta = queue.schedule(registry.get_mut(slow).unwrap(), slow_end, &ledger).unwrap();
        queue.schedule(registry.get_mut(fast).unwrap(), fast_end, &ledger).unwrap();

        assert_eq!(queue.ready(fast_end), vec![fast]);
        assert_eq!(queue.ready(slow_eta), vec![fast, slow]);

        queue.complete(fast);
        assert_eq!(queue.ready(slow_eta), vec![slow]);
        assert_eq!(queue.len(), 1);
    }
}
