// ⚖️ Reconciliation Engine - Draft vs. recent ledger history
//
// A draft is a likely duplicate when the ledger already has a transaction
// with the exact same amount dated within a few days of it. Otherwise the
// draft becomes a new transaction, booked against the account the resolver
// picks for its counterparty (or the fallback "(no name)" destination).

use crate::entities::{AccountIndex, AccountKind};
use crate::extraction::TransactionDraft;
use crate::ledger::{Destination, LedgerTransaction, NewTransaction, TransactionKind, FALLBACK_DESTINATION};
use crate::resolver::{AccountResolver, Resolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DUPLICATE WINDOW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicateWindow {
    /// How many days before the draft date an existing transaction may be (default: 3)
    pub days_before: i64,

    /// How many days after the draft date an existing transaction may be (default: 3)
    pub days_after: i64,
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        DuplicateWindow {
            days_before: 3,
            days_after: 3,
        }
    }
}

impl DuplicateWindow {
    /// Compare calendar days (UTC), not elapsed hours
    pub fn contains(&self, draft_date: DateTime<Utc>, existing_date: DateTime<Utc>) -> bool {
        let diff = (existing_date.date_naive() - draft_date.date_naive()).num_days();
        diff >= -self.days_before && diff <= self.days_after
    }
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation<'a> {
    /// The ledger already seems to have this transaction
    LikelyDuplicate { existing: &'a LedgerTransaction },

    /// Nothing similar found; record this
    Create {
        transaction: NewTransaction,
        resolution: Resolution<'a>,
    },
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    pub resolver: AccountResolver,
    pub window: DuplicateWindow,
}

impl Reconciler {
    pub fn new(resolver: AccountResolver, window: DuplicateWindow) -> Self {
        Reconciler { resolver, window }
    }

    /// Decide between "likely duplicate" and "create".
    ///
    /// `date` is the draft's transaction date after any fallback the caller applied.
    pub fn reconcile<'a>(
        &self,
        draft: &TransactionDraft,
        date: DateTime<Utc>,
        recent: &'a [LedgerTransaction],
        accounts: &'a AccountIndex,
    ) -> Reconciliation<'a> {
        match self.find_existing(draft, date, recent) {
            Some(existing) => Reconciliation::LikelyDuplicate { existing },
            None => {
                let resolution = self.resolver.resolve(&draft.destination_name, accounts);
                Reconciliation::Create {
                    transaction: build_transaction(draft, date, &resolution),
                    resolution,
                }
            }
        }
    }

    /// First recent transaction with the same amount inside the date window
    pub fn find_existing<'a>(
        &self,
        draft: &TransactionDraft,
        date: DateTime<Utc>,
        recent: &'a [LedgerTransaction],
    ) -> Option<&'a LedgerTransaction> {
        recent
            .iter()
            .find(|tx| tx.amount == draft.amount && self.window.contains(date, tx.date))
    }

}

/// Build the transaction to create for a draft with no existing match
fn build_transaction(draft: &TransactionDraft, date: DateTime<Utc>, resolution: &Resolution) -> NewTransaction {
    let (destination, kind) = match resolution.account() {
        Some(account) => {
            let kind = if account.kind == AccountKind::Asset {
                TransactionKind::Transfer
            } else {
                TransactionKind::Withdrawal
            };
            (
                Destination::Existing {
                    id: account.id.clone(),
                    name: account.name.clone(),
                },
                kind,
            )
        }
        None => (
            Destination::Named(FALLBACK_DESTINATION.to_string()),
            TransactionKind::Withdrawal,
        ),
    };

    NewTransaction {
        date,
        amount: draft.amount,
        description: format!("Uncategorized transaction to {}", draft.destination_name),
        source_account_id: draft.source_account_id.clone(),
        destination,
        kind,
    }
}

// ============================================================================
// TESTS
// ============================================================================
