// 📒 Ledger Boundary - What the scanner needs from the ledger
// Accounts and recent history come in once per run; new transactions go out.

use crate::entities::AccountRecord;
use crate::extraction::DollarAmount;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Destination used when no existing account matches the counterparty.
/// Accounts are never created on purpose; the ledger may create this one implicitly.
pub const FALLBACK_DESTINATION: &str = "(no name)";

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// A transaction already recorded in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub date: DateTime<Utc>,
    pub amount: DollarAmount,
    pub description: String,

    /// Title of the split group, when the ledger has one
    pub group_title: Option<String>,

    pub destination_name: Option<String>,
}

impl LedgerTransaction {
    /// Group title if present, otherwise the description
    pub fn title(&self) -> &str {
        self.group_title.as_deref().unwrap_or(&self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money leaves an asset account for an expense (or unknown) account
    Withdrawal,

    /// Money moves between two asset accounts
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Destination {
    /// Book against an existing account
    Existing { id: String, name: String },

    /// Book against a name; the ledger decides what account that is
    Named(String),
}

impl Destination {
    pub fn name(&self) -> &str {
        match self {
            Destination::Existing { name, .. } => name,
            Destination::Named(name) => name,
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            Destination::Existing { id, .. } => Some(id),
            Destination::Named(_) => None,
        }
    }
}

/// A transaction the scanner wants the ledger to record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: DateTime<Utc>,
    pub amount: DollarAmount,
    pub description: String,
    pub source_account_id: String,
    pub destination: Destination,
    pub kind: TransactionKind,
}

// ============================================================================
// LEDGER TRAIT
// ============================================================================

/// Ledger collaborator. The SQLite-backed implementation lives in `db`.
pub trait Ledger {
    /// Every account the ledger knows, unfiltered
    fn accounts(&self) -> Result<Vec<AccountRecord>>;

    /// Transactions dated on or after `since`, newest first
    fn recent_transactions(&self, since: DateTime<Utc>) -> Result<Vec<LedgerTransaction>>;

    /// Record a transaction and return its ledger id
    fn create_transaction(&self, transaction: &NewTransaction) -> Result<String>;
}
