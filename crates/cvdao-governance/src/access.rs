//! Role-based access control.
//!
//! A plain capability set: role -> member addresses, with predicate checks
//! that gated operations call before mutating anything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cvdao_types::Address;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Named privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes every role, including itself
    Admin,
    /// May submit proposals
    Proposer,
    /// May trigger execution of queued proposals
    Executor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Proposer, Role::Executor];

    /// Canonical role identifier.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "DEFAULT_ADMIN_ROLE",
            Role::Proposer => "PROPOSER_ROLE",
            Role::Executor => "EXECUTOR_ROLE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Role membership sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    /// Create with `admin` as the sole Admin holder.
    pub fn new(admin: Address) -> Self {
        let mut members = BTreeMap::new();
        members.insert(Role::Admin, BTreeSet::from([admin]));
        Self { members }
    }

    /// Check role membership.
    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }

    /// Fail with `Unauthorized` unless `account` holds `role`.
    pub fn ensure_role(&self, role: Role, account: &Address) -> Result<(), GovernanceError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            tracing::warn!(%role, %account, "privileged call rejected");
            Err(GovernanceError::Unauthorized {
                account: account.to_string(),
                role,
            })
        }
    }

    /// Grant `role` to `account`. Caller must be Admin.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<(), GovernanceError> {
        self.ensure_role(Role::Admin, caller)?;

        if account.is_zero() {
            return Err(GovernanceError::InvalidArgument(
                "Cannot grant a role to the zero address".to_string(),
            ));
        }
        if self.has_role(role, &account) {
            return Err(GovernanceError::InvalidArgument(format!(
                "{} already holds {}",
                account, role
            )));
        }

        self.members.entry(role).or_default().insert(account);
        tracing::info!(%role, %account, %caller, "role granted");
        Ok(())
    }

    /// Revoke `role` from `account`. Caller must be Admin.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<(), GovernanceError> {
        self.ensure_role(Role::Admin, caller)?;
        self.remove(role, account)?;
        tracing::info!(%role, %account, %caller, "role revoked");
        Ok(())
    }

    /// Drop a role the caller holds itself.
    pub fn renounce_role(&mut self, caller: &Address, role: Role) -> Result<(), GovernanceError> {
        self.remove(role, caller)?;
        tracing::info!(%role, account = %caller, "role renounced");
        Ok(())
    }

    /// Current holders of `role`, in address order.
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn remove(&mut self, role: Role, account: &Address) -> Result<(), GovernanceError> {
        let removed = self
            .members
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false);

        if removed {
            Ok(())
        } else {
            Err(GovernanceError::InvalidArgument(format!(
                "{} does not hold {}",
                account, role
            )))
        }
    }
}
