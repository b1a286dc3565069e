// 🔔 Notifications - Markdown messages about what the scanner did
// Every processed email produces exactly one message: created, matched or unparsable.

use crate::extraction::{DollarAmount, TransactionDraft};
use crate::ledger::LedgerTransaction;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

const DATE_FORMAT: &str = "%b %d, %Y";

pub trait Notifier {
    fn notify(&self, markdown: &str) -> Result<()>;
}

/// Writes every message to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, markdown: &str) -> Result<()> {
        info!(target: "notification", "{}", markdown);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _markdown: &str) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

fn transaction_url(ledger_url: &str, id: &str) -> String {
    format!("{}/transactions/show/{}", ledger_url, id)
}

fn dollars(amount: &DollarAmount) -> String {
    format!("${}", amount)
}

/// A new transaction was recorded (or would have been, in dry-run)
pub fn created_message(
    ledger_url: &str,
    transaction_id: &str,
    draft: &TransactionDraft,
    matched_account: &str,
    date: DateTime<Utc>,
    dry_run: bool,
) -> String {
    let prefix = if dry_run { "Test " } else { "" };

    format!(
        "## {}[New Transaction Created From Email]({})\n\
         \n\
         Please confirm:\n\
         \n\
         **Destination**: {} -> {}\n\
         **Amount**: {}\n\
         **Date**: {}",
        prefix,
        transaction_url(ledger_url, transaction_id),
        draft.destination_name,
        matched_account,
        dollars(&draft.amount),
        date.format(DATE_FORMAT),
    )
}

/// The email looks like a transaction the ledger already has
pub fn matched_message(ledger_url: &str, draft: &TransactionDraft, existing: &LedgerTransaction) -> String {
    format!(
        "## New Transaction Email Matched\n\
         \n\
         Found an existing transaction [{}]({}).\n\
         \n\
         Please confirm:\n\
         \n\
         **Destination**: {} ({})\n\
         **Amount**: {}\n\
         **Date**: {}",
        existing.title(),
        transaction_url(ledger_url, &existing.id),
        draft.destination_name,
        existing.destination_name.as_deref().unwrap_or(""),
        dollars(&draft.amount),
        existing.date.format(DATE_FORMAT),
    )
}

pub fn unparsable_message(uid: u32, message_id: &str) -> String {
    format!(
        "## Unparsable Email\n\
         \n\
         An email was received that could not be parsed. \
         This may be a bug or it may be an irrelevant email.\n\
         \n\
         **UID**: {}\n\
         **Message ID**: {}",
        uid, message_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft() -> TransactionDraft {
        TransactionDraft {
            amount: DollarAmount::new(12, 5),
            transaction_date: None,
            destination_name: "KWIK TRIP #1234".to_string(),
            source_account_id: "1".to_string(),
            rule_name: "debit".to_string(),
        }
    }

    #[test]
    fn test_created_message() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        let message = created_message("https://ledger.example", "42", &draft(), "Kwik Trip", date, false);

        assert_eq!(
            message,
            "## [New Transaction Created From Email](https://ledger.example/transactions/show/42)\n\
             \n\
             Please confirm:\n\
             \n\
             **Destination**: KWIK TRIP #1234 -> Kwik Trip\n\
             **Amount**: $12.05\n\
             **Date**: Mar 05, 2024"
        );
    }

    #[test]
    fn test_created_message_dry_run_prefix() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        let message = created_message("", "0", &draft(), "(no name)", date, true);
        assert!(message.starts_with("## Test [New Transaction Created From Email](/transactions/show/0)"));
    }

    #[test]
    fn test_matched_message_uses_existing_details() {
        let existing = LedgerTransaction {
            id: "77".to_string(),
            date: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
            amount: DollarAmount::new(12, 5),
            description: "Gas".to_string(),
            group_title: Some("Road trip".to_string()),
            destination_name: Some("Kwik Trip".to_string()),
        };

        let message = matched_message("https://ledger.example", &draft(), &existing);
        assert!(message.contains("[Road trip](https://ledger.example/transactions/show/77)"));
        assert!(message.contains("**Destination**: KWIK TRIP #1234 (Kwik Trip)"));
        assert!(message.contains("**Date**: Mar 04, 2024"));
    }

    #[test]
    fn test_unparsable_message() {
        let message = unparsable_message(9, "<abc@bank.example>");
        assert!(message.starts_with("## Unparsable Email"));
        assert!(message.contains("**UID**: 9\n**Message ID**: <abc@bank.example>"));
    }

    #[test]
    fn test_notifiers_accept_messages() {
        assert!(LogNotifier.notify("hello").is_ok());
        assert!(NoOpNotifier.notify("hello").is_ok());
    }
}
