// Mail Ledger - Core Library
// Turns bank notification emails into ledger transactions

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod extraction;     // Body → transaction draft
pub mod ledger;
pub mod mail;
pub mod notify;
pub mod reconciliation; // Draft vs. recent ledger history
pub mod resolver;       // Counterparty name → account
pub mod rules;
pub mod scanner;

// Re-export commonly used types
pub use config::{CompiledConfig, CompiledMailbox, MailboxRules, ScannerConfig, Settings};
pub use db::{
    Event, SqliteLedger,
    setup_database, load_accounts_csv, upsert_accounts, get_accounts,
    get_transactions_since, insert_transaction, insert_event, get_events_for_entity,
    verify_count,
};
pub use entities::{AccountIndex, AccountKind, AccountRecord};
pub use error::{ConfigError, ExtractionError};
pub use extraction::{extract, DollarAmount, TransactionDraft};
pub use ledger::{Destination, Ledger, LedgerTransaction, NewTransaction, TransactionKind};
pub use mail::{EmlDirectory, MailMessage, MailSource};
pub use notify::{LogNotifier, NoOpNotifier, Notifier};
pub use reconciliation::{DuplicateWindow, Reconciler, Reconciliation};
pub use resolver::{AccountResolver, MatchThresholds, Resolution};
pub use rules::{ProcessingRule, RuleSet};
pub use scanner::{
    run, Evaluation, MessageError, MessageOutcome, MessageReport, RunContext, RunOptions,
    RunSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
