//! Caller identity and role checks
//!
//! Operations never inspect a platform caller primitive. Each call carries a
//! [`CallContext`] and the vault consults its injected [`AccessPolicy`].

use pinocchio::pubkey::Pubkey;
use serde::Serialize;

/// Privileged roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    /// Updates risk parameters
    Manager,
    /// Updates rebalance and discount parameters
    Admin,
    /// Trading settlement callbacks (send/receive assets)
    PnlHandler,
    /// Open PnL settlement, advances epochs
    OpenPnlFeed,
}

/// Identity and clock of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Pubkey,
    /// Unix timestamp in seconds
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: Pubkey, now: u64) -> Self {
        Self { caller, now }
    }
}

pub trait AccessPolicy: Send {
    fn has_role(&self, who: &Pubkey, role: Role) -> bool;
}

/// One identity per role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleRegistry {
    pub manager: Pubkey,
    pub admin: Pubkey,
    pub pnl_handler: Pubkey,
    pub open_pnl_feed: Pubkey,
}

impl AccessPolicy for RoleRegistry {
    fn has_role(&self, who: &Pubkey, role: Role) -> bool {
        let holder = match role {
            Role::Manager => &self.manager,
            Role::Admin => &self.admin,
            Role::PnlHandler => &self.pnl_handler,
            Role::OpenPnlFeed => &self.open_pnl_feed,
        };
        holder == who
    }
}
