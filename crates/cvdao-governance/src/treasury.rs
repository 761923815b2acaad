//! Treasury boundary and an in-memory vault.
//!
//! The governor only ever calls [`Treasury::withdraw`]. Custody, deposits and
//! the treasury's own role set live on the implementation side.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cvdao_types::{Address, Amount, Timestamp};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::access::{AccessControl, Role};
use crate::clock::Clock;
use crate::error::GovernanceError;

/// Errors reported by a treasury withdraw.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TreasuryError {
    #[error("Caller {0} is not a treasury executor")]
    Unauthorized(Address),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    #[error("Invalid recipient: zero address")]
    InvalidRecipient,
}

impl From<TreasuryError> for GovernanceError {
    fn from(e: TreasuryError) -> Self {
        match e {
            TreasuryError::Unauthorized(caller) => GovernanceError::Unauthorized {
                account: caller.to_string(),
                role: Role::Executor,
            },
            TreasuryError::InsufficientFunds { requested, available } => {
                GovernanceError::InsufficientFunds { requested, available }
            }
            TreasuryError::InvalidRecipient => {
                GovernanceError::InvalidArgument(TreasuryError::InvalidRecipient.to_string())
            }
        }
    }
}

/// Gated fund custody.
pub trait Treasury: Send + Sync {
    /// Transfer `amount` to `recipient`. `caller` must hold the treasury's
    /// executor capability.
    fn withdraw(&self, caller: &Address, recipient: &Address, amount: Amount) -> Result<(), TreasuryError>;

    /// Currently held funds.
    fn balance(&self) -> Amount;
}

/// Type of vault movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

/// Vault movement record.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultTransaction {
    pub tx_type: TransactionType,
    pub amount: Amount,
    /// Depositor or withdraw caller
    pub counterparty: Address,
    /// Set for withdrawals
    pub recipient: Option<Address>,
    pub at: Timestamp,
}

#[derive(Debug, Default)]
struct VaultState {
    balance: Amount,
    paid: HashMap<Address, Amount>,
    transactions: Vec<VaultTransaction>,
}

/// In-memory treasury with its own Admin/Executor role set.
pub struct Vault {
    clock: Arc<dyn Clock>,
    roles: RwLock<AccessControl>,
    state: Mutex<VaultState>,
}

impl Vault {
    pub fn new(admin: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            roles: RwLock::new(AccessControl::new(admin)),
            state: Mutex::new(VaultState::default()),
        }
    }

    /// Grant a vault role. Typically the governor's address gets Executor.
    pub fn grant_role(&self, caller: &Address, role: Role, account: Address) -> Result<(), GovernanceError> {
        self.roles.write().grant_role(caller, role, account)
    }

    pub fn revoke_role(&self, caller: &Address, role: Role, account: &Address) -> Result<(), GovernanceError> {
        self.roles.write().revoke_role(caller, role, account)
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.roles.read().has_role(role, account)
    }

    /// Accept funds.
    pub fn deposit(&self, source: Address, amount: Amount) -> Result<(), GovernanceError> {
        let mut state = self.state.lock();
        state.balance = state
            .balance
            .checked_add(amount)
            .ok_or_else(|| GovernanceError::InvalidArgument("Deposit overflows balance".to_string()))?;
        let at = self.clock.now();
        state.transactions.push(VaultTransaction {
            tx_type: TransactionType::Deposit,
            amount,
            counterparty: source,
            recipient: None,
            at,
        });
        tracing::debug!(%source, amount, "treasury deposit");
        Ok(())
    }

    /// Total ever withdrawn to `recipient`.
    pub fn paid_to(&self, recipient: &Address) -> Amount {
        self.state.lock().paid.get(recipient).copied().unwrap_or(0)
    }

    pub fn transactions(&self) -> Vec<VaultTransaction> {
        self.state.lock().transactions.clone()
    }
}

impl Treasury for Vault {
    fn withdraw(&self, caller: &Address, recipient: &Address, amount: Amount) -> Result<(), TreasuryError> {
        if !self.roles.read().has_role(Role::Executor, caller) {
            tracing::warn!(%caller, "treasury withdraw rejected: not an executor");
            return Err(TreasuryError::Unauthorized(*caller));
        }
        if recipient.is_zero() {
            return Err(TreasuryError::InvalidRecipient);
        }

        let mut state = self.state.lock();
        if state.balance < amount {
            return Err(TreasuryError::InsufficientFunds {
                requested: amount,
                available: state.balance,
            });
        }

        state.balance -= amount;
        *state.paid.entry(*recipient).or_insert(0) += amount;
        let at = self.clock.now();
        state.transactions.push(VaultTransaction {
            tx_type: TransactionType::Withdrawal,
            amount,
            counterparty: *caller,
            recipient: Some(*recipient),
            at,
        });

        tracing::info!(%caller, %recipient, amount, "treasury withdrawal");
        Ok(())
    }

    fn balance(&self) -> Amount {
        self.state.lock().balance
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Vault")
            .field("balance", &state.balance)
            .field("transactions", &state.transactions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn funded_vault() -> Vault {
        let vault = Vault::new(addr(1), Arc::new(ManualClock::new(100)));
        vault.grant_role(&addr(1), Role::Executor, addr(9)).unwrap();
        vault.deposit(addr(1), 1_000).unwrap();
        vault
    }

    #[test]
    fn test_vault_deposit() {
        let vault = Vault::new(addr(1), Arc::new(ManualClock::new(100)));
        vault.deposit(addr(2), 500).unwrap();

        assert_eq!(vault.balance(), 500);
        assert_eq!(vault.transactions().len(), 1);
        assert_eq!(vault.transactions()[0].tx_type, TransactionType::Deposit);
    }

    #[test]
    fn test_withdraw_moves_exact_amount() {
        let vault = funded_vault();

        vault.withdraw(&addr(9), &addr(5), 300).unwrap();
        assert_eq!(vault.balance(), 700);
        assert_eq!(vault.paid_to(&addr(5)), 300);
    }

    #[test]
    fn test_withdraw_requires_executor() {
        let vault = funded_vault();

        let err = vault.withdraw(&addr(2), &addr(5), 1).unwrap_err();
        assert_eq!(err, TreasuryError::Unauthorized(addr(2)));
        assert_eq!(vault.balance(), 1_000);
    }

    #[test]
    fn test_withdraw_insufficient_funds() {
        let vault = funded_vault();

        let err = vault.withdraw(&addr(9), &addr(5), 1_001).unwrap_err();
        assert_eq!(err, TreasuryError::InsufficientFunds { requested: 1_001, available: 1_000 });
        assert_eq!(vault.balance(), 1_000);
        assert_eq!(vault.paid_to(&addr(5)), 0);
    }

    #[test]
    fn test_withdraw_to_zero_address_fails() {
        let vault = funded_vault();
        assert_eq!(
            vault.withdraw(&addr(9), &Address::ZERO, 1),
            Err(TreasuryError::InvalidRecipient)
        );
    }

    #[test]
    fn test_treasury_error_maps_into_governance_error() {
        let err: GovernanceError = TreasuryError::InsufficientFunds { requested: 2, available: 1 }.into();
        assert_eq!(err, GovernanceError::InsufficientFunds { requested: 2, available: 1 });
    }
}
