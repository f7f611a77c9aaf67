// ============================================================================
// Participant Ledger
// Balances, energy inventory and escrow for continuous-auction settlement
// ============================================================================

use crate::error::{MarketError, MarketResult};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Funds and energy held by one participant.
///
/// Reserved amounts back the participant's own resting orders: an ask
/// reserves inventory, a bid reserves `price x quantity` of balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Account {
    pub balance: Decimal,
    pub inventory: Decimal,
    pub reserved_balance: Decimal,
    pub reserved_inventory: Decimal,
}

impl Account {
    pub fn new(balance: Decimal, inventory: Decimal) -> Self {
        Self {
            balance,
            inventory,
            ..Self::default()
        }
    }

    pub fn total_balance(&self) -> Decimal {
        self.balance + self.reserved_balance
    }

    pub fn total_inventory(&self) -> Decimal {
        self.inventory + self.reserved_inventory
    }
}

/// Participant accounts. Unknown participants hold an empty account.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: HashMap<String, Account>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit available balance and inventory
    pub fn deposit(&mut self, participant: &str, balance: Decimal, inventory: Decimal) {
        let account = self.entry(participant);
        account.balance += balance;
        account.inventory += inventory;
    }

    pub fn account(&self, participant: &str) -> Account {
        self.accounts.get(participant).copied().unwrap_or_default()
    }

    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    pub fn check_funds(&self, participant: &str, required: Decimal) -> MarketResult<()> {
        let available = self.account(participant).balance;
        if available < required {
            return Err(MarketError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }

    pub fn check_inventory(&self, participant: &str, required: Decimal) -> MarketResult<()> {
        let available = self.account(participant).inventory;
        if available < required {
            return Err(MarketError::InsufficientInventory {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Move balance into escrow for a resting bid
    pub fn reserve_funds(&mut self, participant: &str, amount: Decimal) -> MarketResult<()> {
        self.check_funds(participant, amount)?;
        let account = self.entry(participant);
        account.balance -= amount;
        account.reserved_balance += amount;
        Ok(())
    }

    /// Move inventory into escrow for a resting ask
    pub fn reserve_inventory(&mut self, participant: &str, quantity: Decimal) -> MarketResult<()> {
        self.check_inventory(participant, quantity)?;
        let account = self.entry(participant);
        account.inventory -= quantity;
        account.reserved_inventory += quantity;
        Ok(())
    }

    pub fn release_funds(&mut self, participant: &str, amount: Decimal) {
        let account = self.entry(participant);
        let amount = amount.min(account.reserved_balance);
        account.reserved_balance -= amount;
        account.balance += amount;
    }

    pub fn release_inventory(&mut self, participant: &str, quantity: Decimal) {
        let account = self.entry(participant);
        let quantity = quantity.min(account.reserved_inventory);
        account.reserved_inventory -= quantity;
        account.inventory += quantity;
    }

    /// Taker buys `quantity` from a resting ask at `price`.
    ///
    /// Funds must already have been checked; the seller's inventory comes
    /// out of escrow.
    pub fn settle_resting_ask(
        &mut self,
        seller: &str,
        buyer: &str,
        quantity: Decimal,
        price: Decimal,
    ) {
        let value = price * quantity;

        let seller_account = self.entry(seller);
        seller_account.reserved_inventory -= quantity;
        seller_account.balance += value;

        let buyer_account = self.entry(buyer);
        buyer_account.balance -= value;
        buyer_account.inventory += quantity;
    }

    /// Taker sells `quantity` into a resting bid at `price`.
    ///
    /// Inventory must already have been checked; the buyer pays out of
    /// escrow.
    pub fn settle_resting_bid(
        &mut self,
        buyer: &str,
        seller: &str,
        quantity: Decimal,
        price: Decimal,
    ) {
        let value = price * quantity;

        let buyer_account = self.entry(buyer);
        buyer_account.reserved_balance -= value;
        buyer_account.inventory += quantity;

        let seller_account = self.entry(seller);
        seller_account.inventory -= quantity;
        seller_account.balance += value;
    }

    /// Sum of (balance + reserved) and (inventory + reserved) over all
    /// accounts; settlement never changes either total.
    pub fn totals(&self) -> (Decimal, Decimal) {
        self.accounts.values().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(balance, inventory), account| {
                (
                    balance + account.total_balance(),
                    inventory + account.total_inventory(),
                )
            },
        )
    }

    fn entry(&mut self, participant: &str) -> &mut Account {
        self.accounts.entry(participant.to_string()).or_default()
    }
}
