//! Economy ledger - append-only currency accounting
//!
//! Every mutation appends a [`LedgerEntry`] before touching the running
//! balance, so the entry log is a complete audit trail. Accounts shard per
//! participant id in a `DashMap`; unrelated participants never contend.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RequestError;

/// Why a ledger entry exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Balance carried in from the profile at round entry
    Opening,
    Delivery,
    Purchase,
    Kill,
    Refund,
}

/// One append-only accounting record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub participant_id: Uuid,
    /// Signed currency delta (positive for credits)
    pub delta: i64,
    pub reason: LedgerReason,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Account {
    balance: i64,
    entries: Vec<LedgerEntry>,
}

/// Authoritative currency state for all participants
#[derive(Debug, Default)]
pub struct EconomyLedger {
    accounts: DashMap<Uuid, Account>,
}

impl EconomyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account at round entry, seeded from the persisted profile.
    /// Reopening an existing account keeps its current state.
    pub fn open_account(&self, participant_id: Uuid, opening_balance: i64) {
        self.accounts.entry(participant_id).or_insert(Account {
            balance: opening_balance.max(0),
            entries: Vec::new(),
        });
    }

    /// Close an account at round exit, returning the final balance for
    /// persistence.
    pub fn close_account(&self, participant_id: Uuid) -> Option<i64> {
        self.accounts.remove(&participant_id).map(|(_, a)| a.balance)
    }

    /// Credit currency. Returns the new balance.
    pub fn credit(
        &self,
        participant_id: Uuid,
        amount: i64,
        reason: LedgerReason,
    ) -> Result<i64, RequestError> {
        let mut account = self
            .accounts
            .get_mut(&participant_id)
            .ok_or(RequestError::NotFound)?;
        account.entries.push(LedgerEntry {
            participant_id,
            delta: amount,
            reason,
            at: Utc::now(),
        });
        account.balance += amount;
        Ok(account.balance)
    }

    /// Debit currency. Fails with `InsufficientFunds` (appending nothing)
    /// if the debit would drive the balance negative.
    pub fn debit(
        &self,
        participant_id: Uuid,
        amount: i64,
        reason: LedgerReason,
    ) -> Result<i64, RequestError> {
        let mut account = self
            .accounts
            .get_mut(&participant_id)
            .ok_or(RequestError::NotFound)?;
        if account.balance - amount < 0 {
            return Err(RequestError::InsufficientFunds);
        }
        account.entries.push(LedgerEntry {
            participant_id,
            delta: -amount,
            reason,
            at: Utc::now(),
        });
        account.balance -= amount;
        Ok(account.balance)
    }

    pub fn balance(&self, participant_id: Uuid) -> Result<i64, RequestError> {
        self.accounts
            .get(&participant_id)
            .map(|a| a.balance)
            .ok_or(RequestError::NotFound)
    }

    /// Audit-trail query
    pub fn entries(&self, participant_id: Uuid) -> Vec<LedgerEntry> {
        self.accounts
            .get(&participant_id)
            .map(|a| a.entries.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(balance: i64) -> (EconomyLedger, Uuid) {
        let ledger = EconomyLedger::new();
        let id = Uuid::new_v4();
        ledger.open_account(id, balance);
        (ledger, id)
    }

    #[test]
    fn credit_and_debit_update_balance() {
        let (ledger, id) = ledger_with(0);
        assert_eq!(ledger.credit(id, 100, LedgerReason::Delivery).unwrap(), 100);
        assert_eq!(ledger.debit(id, 40, LedgerReason::Purchase).unwrap(), 60);
        assert_eq!(ledger.balance(id).unwrap(), 60);
    }

    #[test]
    fn overdraft_fails_and_applies_nothing() {
        let (ledger, id) = ledger_with(100);
        let err = ledger.debit(id, 150, LedgerReason::Purchase).unwrap_err();
        assert_eq!(err, RequestError::InsufficientFunds);
        assert_eq!(ledger.balance(id).unwrap(), 100);
        // Failed debit leaves no audit entry
        assert!(ledger.entries(id).is_empty());
    }

    #[test]
    fn balance_never_negative_across_any_sequence() {
        let (ledger, id) = ledger_with(50);
        let ops: [(i64, bool); 6] = [
            (30, false),
            (100, true),
            (90, false),
            (200, false),
            (40, true),
            (5, false),
        ];
        for (amount, is_credit) in ops {
            if is_credit {
                ledger.credit(id, amount, LedgerReason::Refund).unwrap();
            } else {
                let _ = ledger.debit(id, amount, LedgerReason::Purchase);
            }
            assert!(ledger.balance(id).unwrap() >= 0);
        }
    }

    #[test]
    fn entries_form_an_audit_trail() {
        let (ledger, id) = ledger_with(0);
        ledger.credit(id, 120, LedgerReason::Delivery).unwrap();
        ledger.credit(id, 25, LedgerReason::Kill).unwrap();
        ledger.debit(id, 50, LedgerReason::Purchase).unwrap();

        let entries = ledger.entries(id);
        assert_eq!(entries.len(), 3);
        let folded: i64 = entries.iter().map(|e| e.delta).sum();
        assert_eq!(folded, ledger.balance(id).unwrap());
    }

    #[test]
    fn unknown_account_is_not_found() {
        let ledger = EconomyLedger::new();
        assert_eq!(
            ledger.balance(Uuid::new_v4()).unwrap_err(),
            RequestError::NotFound
        );
    }

    #[test]
    fn close_account_returns_final_balance() {
        let (ledger, id) = ledger_with(75);
        assert_eq!(ledger.close_account(id), Some(75));
        assert!(ledger.balance(id).is_err());
    }
}
