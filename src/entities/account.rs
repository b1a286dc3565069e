// 💳 Account Entity - Ledger accounts known at the start of a run
//
// Accounts are fetched once per run. Each one gets a "clean name"
// (alphanumerics only, lowercased) computed when the index is built;
// the index is immutable afterwards, so it can be shared across threads.

use serde::{Deserialize, Serialize};

// ============================================================================
// ACCOUNT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Checking, savings, cash (money the user holds)
    Asset,

    /// Shops, merchants, payees
    Expense,

    /// Employers, interest sources
    Revenue,

    /// Credit cards, loans
    Liability,

    /// Opening balances; never a destination
    #[serde(rename = "initial-balance")]
    InitialBalance,

    /// Reconciliation and anything the ledger adds later
    #[serde(other)]
    Other,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Expense => "expense",
            AccountKind::Revenue => "revenue",
            AccountKind::Liability => "liability",
            AccountKind::InitialBalance => "initial-balance",
            AccountKind::Other => "other",
        }
    }

    /// Lenient parse used for stored values; unknown kinds become Other
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "asset" => AccountKind::Asset,
            "expense" => AccountKind::Expense,
            "revenue" => AccountKind::Revenue,
            "liability" => AccountKind::Liability,
            "initial-balance" | "initial_balance" => AccountKind::InitialBalance,
            _ => AccountKind::Other,
        }
    }
}

// ============================================================================
// ACCOUNT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Ledger identifier
    pub id: String,

    /// Display name, e.g. "Kwik Trip"
    pub name: String,

    pub kind: AccountKind,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AccountRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        AccountRecord {
            id: id.into(),
            name: name.into(),
            kind,
            active: true,
        }
    }

    /// Whether a withdrawal may land on this account.
    /// Inactive, revenue and initial-balance accounts are never destinations.
    pub fn is_destination_candidate(&self) -> bool {
        self.active && !matches!(self.kind, AccountKind::Revenue | AccountKind::InitialBalance)
    }
}

/// Strip everything but ASCII letters and digits, then lowercase.
///
/// "Kwik Trip #1234" → "kwiktrip1234", "ACME_Corp." → "acmecorp", "Café" → "caf"
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ============================================================================
// ACCOUNT INDEX
// ============================================================================

/// Accounts plus their cached clean names, in the order they were given
#[derive(Debug, Clone, Default)]
pub struct AccountIndex {
    accounts: Vec<AccountRecord>,
    clean_names: Vec<String>,
}

impl AccountIndex {
    /// Build the index. Clean names are computed here and never again.
    pub fn new(accounts: Vec<AccountRecord>) -> Self {
        let clean_names = accounts.iter().map(|a| clean_name(&a.name)).collect();
        AccountIndex {
            accounts,
            clean_names,
        }
    }

    /// Keep only accounts a withdrawal may be booked against
    pub fn destination_candidates(accounts: Vec<AccountRecord>) -> Self {
        Self::new(
            accounts
                .into_iter()
                .filter(AccountRecord::is_destination_candidate)
                .collect(),
        )
    }

    /// (account, clean name) pairs in input order
    pub fn entries(&self) -> impl Iterator<Item = (&AccountRecord, &str)> {
        self.accounts
            .iter()
            .zip(self.clean_names.iter().map(String::as_str))
    }

    pub fn accounts(&self) -> &[AccountRecord] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
