//! CVDAO Types - Primitive type definitions for the CVDAO governance engine.
//!
//! This crate provides:
//! - Addresses (20-byte, Bech32m encoded)
//! - Amount, voting power and timestamp units

pub mod address;
pub mod units;
pub mod error;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use units::{Amount, Timestamp, VotingPower};
pub use error::TypesError;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Address, Amount, Timestamp, TypesError, VotingPower};
    pub use crate::units::{parse_units, ONE_UNIT, SECONDS_PER_DAY, SECONDS_PER_HOUR};
}
