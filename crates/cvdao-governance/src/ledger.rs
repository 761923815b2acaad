//! Voting-power ledger boundary and a staking reference implementation.
//!
//! Governance only consumes snapshot reads. A snapshot at time `t` reflects
//! every stake change recorded strictly before `t`, so a read taken in the
//! same second as a stake is stale and a read one second later is current.

use std::collections::HashMap;
use std::sync::Arc;

use cvdao_types::{Address, Amount, Timestamp, VotingPower};
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::error::GovernanceError;

/// Voting power minted per base unit staked.
pub const DEFAULT_POWER_RATIO: u128 = 1_000;

/// Snapshot reads over stake-derived voting power.
pub trait VotingPowerLedger: Send + Sync {
    /// Power held by `account` as of `at`.
    fn get_votes(&self, account: &Address, at: Timestamp) -> VotingPower;

    /// Total power in existence as of `at`.
    fn total_supply(&self, at: Timestamp) -> VotingPower;
}

/// Value recorded at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Checkpoint {
    at: Timestamp,
    value: VotingPower,
}

/// Append-only checkpoint history.
#[derive(Debug, Default, Clone)]
struct History(Vec<Checkpoint>);

impl History {
    fn latest(&self) -> VotingPower {
        self.0.last().map(|c| c.value).unwrap_or(0)
    }

    /// Value of the last checkpoint strictly before `at`.
    fn before(&self, at: Timestamp) -> VotingPower {
        let idx = self.0.partition_point(|c| c.at < at);
        if idx == 0 {
            0
        } else {
            self.0[idx - 1].value
        }
    }

    fn push(&mut self, at: Timestamp, value: VotingPower) {
        match self.0.last_mut() {
            Some(last) if last.at == at => last.value = value,
            _ => self.0.push(Checkpoint { at, value }),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    staked: HashMap<Address, Amount>,
    votes: HashMap<Address, History>,
    supply: History,
}

/// Stake-to-power ledger with per-account and total-supply checkpoints.
pub struct StakingLedger {
    clock: Arc<dyn Clock>,
    ratio: u128,
    state: RwLock<LedgerState>,
}

impl StakingLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ratio(clock, DEFAULT_POWER_RATIO)
    }

    pub fn with_ratio(clock: Arc<dyn Clock>, ratio: u128) -> Self {
        Self {
            clock,
            ratio,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Lock `value` and mint `value * ratio` voting power to `account`.
    ///
    /// Returns the power minted.
    pub fn stake(&self, account: Address, value: Amount) -> Result<VotingPower, GovernanceError> {
        if value == 0 {
            return Err(GovernanceError::InvalidArgument("Cannot stake zero".to_string()));
        }
        let minted = value
            .checked_mul(self.ratio)
            .ok_or_else(|| GovernanceError::InvalidArgument("Stake overflows voting power".to_string()))?;

        let now = self.clock.now();
        let mut state = self.state.write();

        let staked = state.staked.get(&account).copied().unwrap_or(0);
        let new_staked = staked
            .checked_add(value)
            .ok_or_else(|| GovernanceError::InvalidArgument("Stake overflows balance".to_string()))?;
        let current = state.votes.get(&account).map(History::latest).unwrap_or(0);
        let new_votes = current
            .checked_add(minted)
            .ok_or_else(|| GovernanceError::InvalidArgument("Stake overflows voting power".to_string()))?;
        let new_supply = state
            .supply
            .latest()
            .checked_add(minted)
            .ok_or_else(|| GovernanceError::InvalidArgument("Stake overflows total supply".to_string()))?;

        state.staked.insert(account, new_staked);
        state.votes.entry(account).or_default().push(now, new_votes);
        state.supply.push(now, new_supply);

        tracing::debug!(%account, value, minted, at = now, "stake recorded");
        Ok(minted)
    }

    /// Release `value` of `account`'s stake, burning the matching power.
    pub fn unstake(&self, account: Address, value: Amount) -> Result<VotingPower, GovernanceError> {
        if value == 0 {
            return Err(GovernanceError::InvalidArgument("Cannot unstake zero".to_string()));
        }

        let now = self.clock.now();
        let mut state = self.state.write();

        let staked = state.staked.get(&account).copied().unwrap_or(0);
        if staked < value {
            return Err(GovernanceError::InsufficientFunds {
                requested: value,
                available: staked,
            });
        }
        // staked * ratio never overflowed on the way in, so this cannot either
        let burned = value * self.ratio;
        let current = state.votes.get(&account).map(History::latest).unwrap_or(0);
        let new_supply = state.supply.latest().saturating_sub(burned);

        state.staked.insert(account, staked - value);
        state
            .votes
            .entry(account)
            .or_default()
            .push(now, current.saturating_sub(burned));
        state.supply.push(now, new_supply);

        tracing::debug!(%account, value, burned, at = now, "unstake recorded");
        Ok(burned)
    }

    /// Live staked balance.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.state.read().staked.get(account).copied().unwrap_or(0)
    }

    /// Live voting power, including changes made this second.
    pub fn current_votes(&self, account: &Address) -> VotingPower {
        self.state
            .read()
            .votes
            .get(account)
            .map(History::latest)
            .unwrap_or(0)
    }

    /// Power held by `account` as of now (stale for stakes made this second).
    pub fn votes_now(&self, account: &Address) -> VotingPower {
        self.get_votes(account, self.clock.now())
    }

    pub fn ratio(&self) -> u128 {
        self.ratio
    }
}

impl VotingPowerLedger for StakingLedger {
    fn get_votes(&self, account: &Address, at: Timestamp) -> VotingPower {
        self.state
            .read()
            .votes
            .get(account)
            .map(|h| h.before(at))
            .unwrap_or(0)
    }

    fn total_supply(&self, at: Timestamp) -> VotingPower {
        self.state.read().supply.before(at)
    }
}

impl std::fmt::Debug for StakingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("StakingLedger")
            .field("ratio", &self.ratio)
            .field("stakers", &state.staked.len())
            .field("supply", &state.supply.latest())
            .finish()
    }
}
