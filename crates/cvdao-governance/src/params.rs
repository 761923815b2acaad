//! Per-type proposal parameters.

use std::fmt;

use cvdao_types::units::SECONDS_PER_DAY;
use cvdao_types::VotingPower;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Category of funding proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    /// Large, long-horizon allocations: long vote, high quorum, delayed execution
    HighConviction,
    /// Regular allocations
    Standard,
    /// Small running costs: short vote, low quorum, immediate execution
    Operational,
}

impl ProposalType {
    pub const ALL: [ProposalType; 3] = [
        ProposalType::HighConviction,
        ProposalType::Standard,
        ProposalType::Operational,
    ];

    /// Numeric code used by external callers.
    pub fn code(&self) -> u8 {
        match self {
            ProposalType::HighConviction => 0,
            ProposalType::Standard => 1,
            ProposalType::Operational => 2,
        }
    }
}

impl TryFrom<u8> for ProposalType {
    type Error = GovernanceError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ProposalType::HighConviction),
            1 => Ok(ProposalType::Standard),
            2 => Ok(ProposalType::Operational),
            other => Err(GovernanceError::InvalidArgument(format!(
                "Unknown proposal type code {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalType::HighConviction => "HighConviction",
            ProposalType::Standard => "Standard",
            ProposalType::Operational => "Operational",
        };
        f.write_str(name)
    }
}

/// Timing and quorum rules for one proposal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalParams {
    /// Length of the voting window (seconds)
    pub voting_period: u64,
    /// Participation required, in basis points of snapshot supply
    pub quorum_bps: u16,
    /// Wait between queueing and earliest execution (seconds)
    pub execution_delay: u64,
}

impl ProposalParams {
    /// Votes needed to reach quorum given the snapshot supply.
    ///
    /// Rounded up, so a total of at least this many votes always meets
    /// `quorum_bps / 10_000` of the supply exactly.
    pub fn quorum_votes(&self, total_supply: VotingPower) -> VotingPower {
        let bps = VotingPower::from(self.quorum_bps);
        let denom = VotingPower::from(BPS_DENOMINATOR);
        // split to keep supply * bps from overflowing
        let scaled_rem = (total_supply % denom) * bps;
        let round_up = VotingPower::from(scaled_rem % denom != 0);
        (total_supply / denom) * bps + scaled_rem / denom + round_up
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.voting_period == 0 {
            return Err(GovernanceError::InvalidArgument("Voting period cannot be 0".to_string()));
        }
        if self.quorum_bps == 0 || self.quorum_bps > BPS_DENOMINATOR {
            return Err(GovernanceError::InvalidArgument(format!(
                "Quorum must be within 1..={} bps, got {}",
                BPS_DENOMINATOR, self.quorum_bps
            )));
        }
        Ok(())
    }
}

/// Lookup table of parameters by proposal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsTable {
    pub high_conviction: ProposalParams,
    pub standard: ProposalParams,
    pub operational: ProposalParams,
}

impl Default for ParamsTable {
    fn default() -> Self {
        Self {
            high_conviction: ProposalParams {
                voting_period: 7 * SECONDS_PER_DAY,
                quorum_bps: 2_000, // 20%
                execution_delay: 2 * SECONDS_PER_DAY,
            },
            standard: ProposalParams {
                voting_period: 3 * SECONDS_PER_DAY,
                quorum_bps: 1_000, // 10%
                execution_delay: SECONDS_PER_DAY,
            },
            operational: ProposalParams {
                voting_period: SECONDS_PER_DAY,
                quorum_bps: 500, // 5%
                execution_delay: 0,
            },
        }
    }
}

impl ParamsTable {
    pub fn get(&self, proposal_type: ProposalType) -> ProposalParams {
        match proposal_type {
            ProposalType::HighConviction => self.high_conviction,
            ProposalType::Standard => self.standard,
            ProposalType::Operational => self.operational,
        }
    }

    pub fn set(&mut self, proposal_type: ProposalType, params: ProposalParams) {
        match proposal_type {
            ProposalType::HighConviction => self.high_conviction = params,
            ProposalType::Standard => self.standard = params,
            ProposalType::Operational => self.operational = params,
        }
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        for proposal_type in ProposalType::ALL {
            self.get(proposal_type)
                .validate()
                .map_err(|e| match e {
                    GovernanceError::InvalidArgument(msg) => {
                        GovernanceError::Config(format!("{}: {}", proposal_type, msg))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }
}
