//! Share balances and allowances

use std::collections::BTreeMap;

use pinocchio::pubkey::Pubkey;
use vault_math::*;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareLedger {
    balances: BTreeMap<Pubkey, i128>,
    allowances: BTreeMap<(Pubkey, Pubkey), i128>,
    total_supply: i128,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> i128 {
        self.total_supply
    }

    pub fn balance_of(&self, who: &Pubkey) -> i128 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Pubkey, spender: &Pubkey) -> i128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, to: &Pubkey, shares: i128) -> MathResult<()> {
        self.total_supply = add(self.total_supply, shares)?;
        let balance = add(self.balance_of(to), shares)?;
        self.set_balance(to, balance);
        Ok(())
    }

    pub fn burn(&mut self, from: &Pubkey, shares: i128) -> VaultResult<()> {
        let balance = self.balance_of(from);
        if shares > balance {
            return Err(VaultError::InsufficientBalance);
        }
        self.set_balance(from, balance - shares);
        self.total_supply = sub(self.total_supply, shares)?;
        Ok(())
    }

    /// Move shares between accounts without touching the supply
    pub fn move_shares(&mut self, from: &Pubkey, to: &Pubkey, shares: i128) -> VaultResult<()> {
        let from_balance = self.balance_of(from);
        if shares > from_balance {
            return Err(VaultError::InsufficientBalance);
        }
        self.set_balance(from, from_balance - shares);
        let to_balance = add(self.balance_of(to), shares)?;
        self.set_balance(to, to_balance);
        Ok(())
    }

    pub fn approve(&mut self, owner: &Pubkey, spender: &Pubkey, shares: i128) {
        if shares == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), shares);
        }
    }

    /// Consume allowance; an owner acting for itself spends nothing
    pub fn spend_allowance(
        &mut self,
        owner: &Pubkey,
        spender: &Pubkey,
        shares: i128,
    ) -> VaultResult<()> {
        if owner == spender {
            return Ok(());
        }
        let allowance = self.allowance(owner, spender);
        if allowance == i128::MAX {
            return Ok(());
        }
        if shares > allowance {
            return Err(VaultError::InsufficientAllowance);
        }
        self.approve(owner, spender, allowance - shares);
        Ok(())
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Pubkey, &i128)> {
        self.balances.iter()
    }

    fn set_balance(&mut self, who: &Pubkey, balance: i128) {
        if balance == 0 {
            self.balances.remove(who);
        } else {
            self.balances.insert(*who, balance);
        }
    }
}
