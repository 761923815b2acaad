//! Treasury payout for queued proposals.

use std::sync::Arc;

use cvdao_types::{Address, Timestamp};

use crate::error::GovernanceError;
use crate::proposal::{Proposal, ProposalState};
use crate::treasury::Treasury;

/// Moves funds for a due proposal through the treasury's withdraw capability.
pub struct ExecutionDispatcher {
    treasury: Arc<dyn Treasury>,
    /// Identity presented to the treasury as withdraw caller
    caller: Address,
}

impl ExecutionDispatcher {
    pub fn new(treasury: Arc<dyn Treasury>, caller: Address) -> Self {
        Self { treasury, caller }
    }

    /// Latch Executed, then withdraw. A failed withdraw restores the previous
    /// latch so the proposal stays queued for a retry.
    pub fn dispatch(&self, proposal: &mut Proposal, now: Timestamp) -> Result<(), GovernanceError> {
        let previous = proposal.latched();
        proposal.latch(ProposalState::Executed);
        proposal.executed_at = Some(now);

        if let Err(e) = self
            .treasury
            .withdraw(&self.caller, &proposal.recipient, proposal.amount)
        {
            proposal.restore_latch(previous);
            proposal.executed_at = None;
            tracing::warn!(proposal_id = proposal.id, error = %e, "treasury withdraw failed");
            return Err(e.into());
        }

        Ok(())
    }

    pub fn treasury(&self) -> &Arc<dyn Treasury> {
        &self.treasury
    }
}

impl std::fmt::Debug for ExecutionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionDispatcher")
            .field("caller", &self.caller)
            .field("treasury_balance", &self.treasury.balance())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::clock::ManualClock;
    use crate::params::{ParamsTable, ProposalType};
    use crate::proposal::{NewProposal, ProposalRegistry};
    use crate::treasury::Vault;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn queued_proposal(amount: u128) -> Proposal {
        let mut registry = ProposalRegistry::new();
        let id = registry
            .create(
                NewProposal {
                    proposer: addr(1),
                    recipient: addr(2),
                    amount,
                    description: "Audit".to_string(),
                    proposal_type: ProposalType::Operational,
                },
                ParamsTable::default().get(ProposalType::Operational),
                1,
                100,
            )
            .unwrap();
        let mut proposal = registry.get(id).unwrap().clone();
        proposal.latch(ProposalState::Queued);
        proposal.eta = Some(200);
        proposal
    }

    fn vault(balance: u128, executor: Address) -> Arc<Vault> {
        let vault = Arc::new(Vault::new(addr(9), Arc::new(ManualClock::new(0))));
        vault.grant_role(&addr(9), Role::Executor, executor).unwrap();
        vault.deposit(addr(9), balance).unwrap();
        vault
    }

    #[test]
    fn test_dispatch_transfers_and_latches() {
        let vault = vault(1_000, addr(7));
        let dispatcher = ExecutionDispatcher::new(vault.clone(), addr(7));
        let mut proposal = queued_proposal(400);

        dispatcher.dispatch(&mut proposal, 300).unwrap();

        assert_eq!(proposal.latched(), Some(ProposalState::Executed));
        assert_eq!(proposal.executed_at, Some(300));
        assert_eq!(vault.balance(), 600);
        assert_eq!(vault.paid_to(&addr(2)), 400);
    }

    #[test]
    fn test_insufficient_funds_keeps_queued() {
        let vault = vault(100, addr(7));
        let dispatcher = ExecutionDispatcher::new(vault.clone(), addr(7));
        let mut proposal = queued_proposal(400);

        let err = dispatcher.dispatch(&mut proposal, 300).unwrap_err();

        assert_eq!(err, GovernanceError::InsufficientFunds { requested: 400, available: 100 });
        assert_eq!(proposal.latched(), Some(ProposalState::Queued));
        assert_eq!(proposal.executed_at, None);
        assert_eq!(vault.balance(), 100);
    }

    #[test]
    fn test_missing_treasury_role_keeps_queued() {
        let vault = vault(1_000, addr(8));
        let dispatcher = ExecutionDispatcher::new(vault.clone(), addr(7));
        let mut proposal = queued_proposal(400);

        let err = dispatcher.dispatch(&mut proposal, 300).unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthorized { .. }));
        assert_eq!(proposal.latched(), Some(ProposalState::Queued));
        assert_eq!(vault.balance(), 1_000);
    }
}
