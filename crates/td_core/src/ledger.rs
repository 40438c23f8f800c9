//! Currency ledger.
//!
//! A single non-negative balance. Grants and spends are all-or-nothing
//! and announce themselves on the [`EventBus`].

use serde::{Deserialize, Serialize};

use crate::events::{EventBus, SimEvent};

/// The player's spendable currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Ledger {
    balance: i32,
}

impl Ledger {
    /// Create a ledger with a starting balance (negative values clamp to 0).
    #[must_use]
    pub fn new(starting_balance: i32) -> Self {
        Self {
            balance: starting_balance.max(0),
        }
    }

    /// Current balance.
    #[must_use]
    pub const fn balance(&self) -> i32 {
        self.balance
    }

    /// Check if the balance covers `amount`.
    #[must_use]
    pub const fn can_afford(&self, amount: i32) -> bool {
        amount <= self.balance
    }

    /// Add currency. Non-positive amounts are ignored.
    ///
    /// Returns `true` if the balance changed.
    pub fn grant(&mut self, amount: i32, bus: &mut EventBus) -> bool {
        if amount <= 0 {
            return false;
        }
        self.balance = self.balance.saturating_add(amount);
        tracing::debug!(amount, balance = self.balance, "Currency granted");
        bus.emit(SimEvent::GoldGained { amount });
        bus.emit(SimEvent::BalanceChanged {
            balance: self.balance,
        });
        true
    }

    /// Spend currency if available.
    ///
    /// Fails without touching the balance when `amount` is non-positive or
    /// exceeds the balance.
    pub fn try_spend(&mut self, amount: i32, bus: &mut EventBus) -> bool {
        if amount <= 0 || amount > self.balance {
            return false;
        }
        self.balance -= amount;
        tracing::debug!(amount, balance = self.balance, "Currency spent");
        bus.emit(SimEvent::GoldSpent { amount });
        bus.emit(SimEvent::BalanceChanged {
            balance: self.balance,
        });
        true
    }
}
