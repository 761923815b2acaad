//! CVDAO Governance - Stake-weighted treasury governance engine.
//!
//! This crate provides:
//! - Role-based access control (admin, proposer, executor)
//! - Snapshot voting power from a staking ledger
//! - Proposal lifecycle with per-type voting period, quorum and delay
//! - Timelocked execution of treasury payouts
//! - TOML configuration and a serializable governor snapshot

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod governor;
pub mod ledger;
pub mod params;
pub mod proposal;
pub mod timelock;
pub mod treasury;
pub mod voting;

pub use access::{AccessControl, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GovernorConfig;
pub use error::GovernanceError;
pub use events::{EventRecord, GovernanceEvent};
pub use governor::{Governor, GovernorSnapshot};
pub use ledger::{StakingLedger, VotingPowerLedger};
pub use params::{ParamsTable, ProposalParams, ProposalType};
pub use proposal::{Proposal, ProposalState};
pub use treasury::{Treasury, TreasuryError, Vault};
pub use voting::{VoteReceipt, VoteSupport};
