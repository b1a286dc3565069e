// End-to-end runs: mail source → extraction → reconciliation → SQLite ledger → notifications

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use std::collections::HashSet;

use mail_ledger::{
    run, upsert_accounts, verify_count, AccountKind, AccountRecord, Destination, DollarAmount, Ledger,
    MailMessage, MailSource, MessageOutcome, NewTransaction, Notifier, RunContext, RunOptions,
    ScannerConfig, SqliteLedger, TransactionKind,
};

const CONFIG: &str = r#"{
    "processEmails": [
        {
            "fromEmail": "alerts@bank.example",
            "processingSteps": [
                {
                    "optionName": "debit card purchase",
                    "discriminator": { "type": "plainTextBodyRegex", "regex": "came out of your account" },
                    "sourceAccountId": "1",
                    "extractionSteps": [
                        { "regex": "\\$([\\d,]+)\\.(\\d\\d)", "targetFields": [
                            { "groupNumber": 1, "targetField": "dollars" },
                            { "groupNumber": 2, "targetField": "cents" } ] },
                        { "regex": "at (.+)$", "targetFields": [
                            { "groupNumber": 1, "targetField": "destinationAccount" } ] },
                        { "regex": "^Date: (.+)$", "targetFields": [
                            { "groupNumber": 1, "targetField": "transactionDate", "timeZone": "America/Chicago" } ] }
                    ]
                }
            ]
        }
    ]
}"#;

// ============================================================================
// TEST DOUBLES
// ============================================================================

#[derive(Default)]
struct MemoryMailbox {
    messages: Vec<MailMessage>,
    read: HashSet<u32>,
}

impl MemoryMailbox {
    fn add(&mut self, body: &str) -> u32 {
        let uid = self.messages.len() as u32 + 1;
        self.messages.push(MailMessage {
            uid,
            message_id: format!("<m{}@bank.example>", uid),
            from: "Bank <alerts@bank.example>".to_string(),
            envelope_date: None,
            body: Some(body.to_string()),
        });
        uid
    }
}

impl MailSource for MemoryMailbox {
    fn fetch_unseen(&mut self, from_email: &str) -> Result<Vec<MailMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.from.contains(from_email) && !self.read.contains(&m.uid))
            .cloned()
            .collect())
    }

    fn mark_read(&mut self, message: &MailMessage) -> Result<()> {
        self.read.insert(message.uid);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: RefCell<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, markdown: &str) -> Result<()> {
        self.messages.borrow_mut().push(markdown.to_string());
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
}

fn seeded_ledger() -> SqliteLedger {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    upsert_accounts(
        ledger.connection(),
        &[
            AccountRecord::new("1", "Checking", AccountKind::Asset),
            AccountRecord::new("10", "Savings", AccountKind::Asset),
            AccountRecord::new("20", "Kwik Trip", AccountKind::Expense),
            AccountRecord::new("30", "Employer", AccountKind::Revenue),
        ],
    )
    .unwrap();

    ledger
        .create_transaction(&NewTransaction {
            date: Utc.with_ymd_and_hms(2024, 3, 14, 18, 0, 0).unwrap(),
            amount: DollarAmount::new(7, 50),
            description: "Lunch".to_string(),
            source_account_id: "1".to_string(),
            destination: Destination::Named("Deli".to_string()),
            kind: TransactionKind::Withdrawal,
        })
        .unwrap();

    ledger
}

fn run_once(
    ledger: &SqliteLedger,
    mailbox: &mut MemoryMailbox,
    notifier: &RecordingNotifier,
    dry_run: bool,
) -> mail_ledger::RunSummary {
    let config = ScannerConfig::from_json_str(CONFIG).unwrap().compile().unwrap();
    let mut context = RunContext::load(&config, ledger, now()).unwrap();
    let options = RunOptions {
        dry_run,
        ledger_url: "https://ledger.example".to_string(),
    };

    run(&config, &mut context, mailbox, ledger, notifier, &options).unwrap()
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_full_run_outcomes() {
    let ledger = seeded_ledger();
    let notifier = RecordingNotifier::default();
    let mut mailbox = MemoryMailbox::default();

    let created = mailbox.add("$12.34 came out of your account at KWIK TRIP #1234\nDate: 03/15/24\n");
    let matched = mailbox.add("$7.50 came out of your account at Deli\nDate: 03/15/24\n");
    let unparsable = mailbox.add("Your monthly statement is ready");
    let failed = mailbox.add("$5.00 came out of your account\nDate: 03/15/24\n");

    let summary = run_once(&ledger, &mut mailbox, &notifier, false);

    assert_eq!(summary.created, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.unparsable, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total(), 4);
    assert!(matches!(summary.reports[1].outcome, MessageOutcome::Duplicate { ref existing_id } if existing_id == "1"));

    // Failed emails stay unread; everything else is marked read
    assert!(mailbox.read.contains(&created));
    assert!(mailbox.read.contains(&matched));
    assert!(mailbox.read.contains(&unparsable));
    assert!(!mailbox.read.contains(&failed));

    assert_eq!(verify_count(ledger.connection()).unwrap(), 2);
    let recorded = ledger.recent_transactions(now() - chrono::Duration::days(30)).unwrap();
    let new_tx = recorded.iter().find(|tx| tx.amount == DollarAmount::new(12, 34)).unwrap();
    assert_eq!(new_tx.destination_name.as_deref(), Some("Kwik Trip"));
    assert_eq!(new_tx.description, "Uncategorized transaction to KWIK TRIP #1234");
    assert_eq!(new_tx.date, Utc.with_ymd_and_hms(2024, 3, 15, 5, 0, 0).unwrap());

    // One notification per processed email, failures excluded
    let messages = notifier.messages.borrow();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("## [New Transaction Created From Email](https://ledger.example/transactions/show/"));
    assert!(messages[0].contains("**Destination**: KWIK TRIP #1234 -> Kwik Trip"));
    assert!(messages[0].contains("**Amount**: $12.34"));
    assert!(messages[1].starts_with("## New Transaction Email Matched"));
    assert!(messages[1].contains("[Lunch](https://ledger.example/transactions/show/1)"));
    assert!(messages[2].contains("**UID**: 3"));
    assert!(messages[2].contains("**Message ID**: <m3@bank.example>"));
}

#[test]
fn test_oversized_amount_fails_only_its_email() {
    let ledger = seeded_ledger();
    let notifier = RecordingNotifier::default();
    let mut mailbox = MemoryMailbox::default();
    let huge = mailbox.add("$100,000,000,000,000,000.00 came out of your account at Kwik Trip\nDate: 03/15/24\n");
    let normal = mailbox.add("$12.34 came out of your account at Kwik Trip\nDate: 03/15/24\n");

    let summary = run_once(&ledger, &mut mailbox, &notifier, false);

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.created, 1);
    assert!(matches!(summary.reports[0].outcome, MessageOutcome::Failed { ref reason } if reason.contains("dollars")));
    assert!(!mailbox.read.contains(&huge));
    assert!(mailbox.read.contains(&normal));
    assert_eq!(verify_count(ledger.connection()).unwrap(), 2);
}

#[test]
fn test_dry_run_creates_and_marks_nothing() {
    let ledger = seeded_ledger();
    let notifier = RecordingNotifier::default();
    let mut mailbox = MemoryMailbox::default();
    mailbox.add("$12.34 came out of your account at KWIK TRIP #1234\nDate: 03/15/24\n");
    mailbox.add("Your monthly statement is ready");

    let summary = run_once(&ledger, &mut mailbox, &notifier, true);

    assert_eq!(summary.created, 1);
    assert_eq!(summary.unparsable, 1);
    assert_eq!(
        summary.reports[0].outcome,
        MessageOutcome::Created {
            transaction_id: "0".to_string()
        }
    );
    assert!(mailbox.read.is_empty());
    assert_eq!(verify_count(ledger.connection()).unwrap(), 1);

    let messages = notifier.messages.borrow();
    assert!(messages[0].starts_with("## Test [New Transaction Created From Email](https://ledger.example/transactions/show/0)"));
}

#[test]
fn test_same_purchase_twice_in_one_run() {
    let ledger = seeded_ledger();
    let notifier = RecordingNotifier::default();
    let mut mailbox = MemoryMailbox::default();
    mailbox.add("$500.00 came out of your account at Savings transfer\nDate: 03/18/24\n");
    mailbox.add("$500.00 came out of your account at Savings transfer\nDate: 03/18/24\n");

    let summary = run_once(&ledger, &mut mailbox, &notifier, false);

    assert_eq!(summary.created, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(verify_count(ledger.connection()).unwrap(), 2);
}

#[test]
fn test_second_run_sees_nothing_new() {
    let ledger = seeded_ledger();
    let notifier = RecordingNotifier::default();
    let mut mailbox = MemoryMailbox::default();
    mailbox.add("$12.34 came out of your account at KWIK TRIP #1234\nDate: 03/15/24\n");
    mailbox.add("$5.00 came out of your account\nDate: 03/15/24\n");

    run_once(&ledger, &mut mailbox, &notifier, false);
    let second = run_once(&ledger, &mut mailbox, &notifier, false);

    // Only the failed email comes back, and fails again
    assert_eq!(second.total(), 1);
    assert_eq!(second.failed, 1);
    assert_eq!(verify_count(ledger.connection()).unwrap(), 2);
}
