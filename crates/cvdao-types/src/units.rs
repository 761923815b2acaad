//! Amount, voting power and time units.

use crate::error::TypesError;

/// Native token amount, in base units (18 decimals).
pub type Amount = u128;

/// Voting power, in base units.
pub type VotingPower = u128;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Decimal places of [`Amount`].
pub const DECIMALS: u32 = 18;

/// One whole token in base units (10^18).
pub const ONE_UNIT: Amount = 1_000_000_000_000_000_000;

pub const SECONDS_PER_HOUR: u64 = 3_600;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Convert whole tokens into base units.
pub fn parse_units(whole: u128) -> Result<Amount, TypesError> {
    whole
        .checked_mul(ONE_UNIT)
        .ok_or(TypesError::AmountOverflow { whole })
}
