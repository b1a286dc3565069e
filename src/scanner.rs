// 📨 Mail Scanner - One pass over every configured mailbox
//
// For each unseen email: extract a draft, check the ledger for a likely
// duplicate, otherwise record a new transaction, then notify and mark
// the email read. A bad email is reported and skipped; it never stops
// the run.

use crate::config::CompiledConfig;
use crate::entities::AccountIndex;
use crate::error::ExtractionError;
use crate::extraction::{extract, TransactionDraft};
use crate::ledger::{Ledger, LedgerTransaction, NewTransaction};
use crate::mail::{MailMessage, MailSource};
use crate::notify::{created_message, matched_message, unparsable_message, Notifier};
use crate::reconciliation::{Reconciler, Reconciliation};
use crate::resolver::{AccountResolver, Resolution};
use crate::rules::RuleSet;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// RUN CONTEXT
// ============================================================================

/// Everything fetched from the ledger once per run
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Accounts a withdrawal may land on
    pub accounts: AccountIndex,

    /// Recent ledger history, newest first
    pub recent: Vec<LedgerTransaction>,

    pub reconciler: Reconciler,
}

impl RunContext {
    pub fn new(accounts: AccountIndex, recent: Vec<LedgerTransaction>, reconciler: Reconciler) -> Self {
        RunContext {
            accounts,
            recent,
            reconciler,
        }
    }

    /// Fetch accounts and the last `lookback_days` of history
    pub fn load(config: &CompiledConfig, ledger: &dyn Ledger, now: DateTime<Utc>) -> Result<Self> {
        let accounts = ledger.accounts().context("Failed to load ledger accounts")?;
        let accounts = AccountIndex::destination_candidates(accounts);

        let since = now - Duration::days(config.lookback_days);
        let recent = ledger
            .recent_transactions(since)
            .context("Failed to load recent ledger transactions")?;

        info!(
            accounts = accounts.len(),
            recent = recent.len(),
            since = %since.date_naive(),
            "ledger snapshot loaded"
        );

        let reconciler = Reconciler::new(
            AccountResolver::new(config.matching),
            config.duplicate_window,
        );

        Ok(Self::new(accounts, recent, reconciler))
    }

    /// Decide what to do with one email, without side effects
    pub fn evaluate(&self, rules: &RuleSet, message: &MailMessage) -> Result<Evaluation<'_>, MessageError> {
        let body = match &message.body {
            Some(body) => body,
            None => return Ok(Evaluation::Unparsable),
        };

        let draft = match extract(body, rules) {
            Ok(draft) => draft,
            Err(e) if e.is_unparsable() => return Ok(Evaluation::Unparsable),
            Err(e) => return Err(e.into()),
        };

        let date = draft
            .transaction_date
            .or(message.envelope_date)
            .ok_or(MessageError::MissingDate)?;

        let reconciliation = self
            .reconciler
            .reconcile(&draft, date, &self.recent, &self.accounts);

        Ok(Evaluation::Reconciled {
            draft,
            date,
            reconciliation,
        })
    }

    /// Later emails in the same run should see transactions created by earlier ones
    fn record_created(&mut self, id: String, transaction: &NewTransaction) {
        self.recent.insert(
            0,
            LedgerTransaction {
                id,
                date: transaction.date,
                amount: transaction.amount,
                description: transaction.description.clone(),
                group_title: None,
                destination_name: Some(transaction.destination.name().to_string()),
            },
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<'a> {
    /// No text body, or no rule recognised the email
    Unparsable,

    Reconciled {
        draft: TransactionDraft,
        /// Transaction date, or the envelope date when the rule had none
        date: DateTime<Utc>,
        reconciliation: Reconciliation<'a>,
    },
}

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Error)]
pub enum MessageError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no transaction date in the email body and no Date header")]
    MissingDate,

    #[error("ledger rejected the transaction: {0}")]
    Ledger(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// New transaction recorded ("0" in dry-run)
    Created { transaction_id: String },

    /// Ledger already had it
    Duplicate { existing_id: String },

    Unparsable,

    /// Left unread so it can be retried
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageReport {
    pub uid: u32,
    pub message_id: String,
    pub outcome: MessageOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub created: usize,
    pub duplicates: usize,
    pub unparsable: usize,
    pub failed: usize,
    pub reports: Vec<MessageReport>,
}

impl RunSummary {
    fn record(&mut self, message: &MailMessage, outcome: MessageOutcome) {
        match &outcome {
            MessageOutcome::Created { .. } => self.created += 1,
            MessageOutcome::Duplicate { .. } => self.duplicates += 1,
            MessageOutcome::Unparsable => self.unparsable += 1,
            MessageOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(MessageReport {
            uid: message.uid,
            message_id: message.message_id.clone(),
            outcome,
        });
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }
}

// ============================================================================
// RUN
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Create nothing and mark nothing read; notifications say "Test"
    pub dry_run: bool,

    /// Base URL for transaction links in notifications
    pub ledger_url: String,
}

/// What to do after evaluation, detached from the run context borrow
enum Plan {
    Unparsable,
    Duplicate {
        draft: TransactionDraft,
        existing: LedgerTransaction,
    },
    Create {
        draft: TransactionDraft,
        date: DateTime<Utc>,
        transaction: NewTransaction,
    },
}

/// Scan every configured mailbox once
pub fn run(
    config: &CompiledConfig,
    context: &mut RunContext,
    source: &mut dyn MailSource,
    ledger: &dyn Ledger,
    notifier: &dyn Notifier,
    options: &RunOptions,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for mailbox in &config.mailboxes {
        let messages = source
            .fetch_unseen(&mailbox.from_email)
            .with_context(|| format!("Failed to fetch emails from {}", mailbox.from_email))?;

        info!(from = %mailbox.from_email, count = messages.len(), "processing emails");

        for message in &messages {
            let outcome = process_message(context, &mailbox.rules, message, ledger, notifier, options);

            if !options.dry_run && !matches!(outcome, MessageOutcome::Failed { .. }) {
                if let Err(e) = source.mark_read(message) {
                    warn!(uid = message.uid, error = %e, "failed to mark email read");
                }
            }

            summary.record(message, outcome);
        }
    }

    info!(
        created = summary.created,
        duplicates = summary.duplicates,
        unparsable = summary.unparsable,
        failed = summary.failed,
        dry_run = options.dry_run,
        "run complete"
    );

    Ok(summary)
}

fn process_message(
    context: &mut RunContext,
    rules: &RuleSet,
    message: &MailMessage,
    ledger: &dyn Ledger,
    notifier: &dyn Notifier,
    options: &RunOptions,
) -> MessageOutcome {
    let plan = match context.evaluate(rules, message) {
        Ok(Evaluation::Unparsable) => Plan::Unparsable,
        Ok(Evaluation::Reconciled {
            draft,
            reconciliation: Reconciliation::LikelyDuplicate { existing },
            ..
        }) => Plan::Duplicate {
            draft,
            existing: existing.clone(),
        },
        Ok(Evaluation::Reconciled {
            draft,
            date,
            reconciliation: Reconciliation::Create { transaction, resolution },
        }) => {
            log_resolution(message.uid, &draft, &resolution);
            Plan::Create {
                draft,
                date,
                transaction,
            }
        }
        Err(e) => {
            warn!(uid = message.uid, message_id = %message.message_id, error = %e, "skipping email");
            return MessageOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    let (markdown, outcome) = match plan {
        Plan::Unparsable => {
            info!(uid = message.uid, message_id = %message.message_id, "unparsable email");
            (
                unparsable_message(message.uid, &message.message_id),
                MessageOutcome::Unparsable,
            )
        }
        Plan::Duplicate { draft, existing } => {
            info!(
                uid = message.uid,
                amount = %draft.amount,
                destination = %draft.destination_name,
                existing_id = %existing.id,
                "close match found"
            );
            (
                matched_message(&options.ledger_url, &draft, &existing),
                MessageOutcome::Duplicate {
                    existing_id: existing.id,
                },
            )
        }
        Plan::Create {
            draft,
            date,
            transaction,
        } => {
            let transaction_id = if options.dry_run {
                "0".to_string()
            } else {
                match ledger.create_transaction(&transaction) {
                    Ok(id) => id,
                    Err(e) => {
                        let error = MessageError::Ledger(format!("{:#}", e));
                        warn!(uid = message.uid, error = %error, "skipping email");
                        return MessageOutcome::Failed {
                            reason: error.to_string(),
                        };
                    }
                }
            };

            info!(
                uid = message.uid,
                amount = %draft.amount,
                destination = %draft.destination_name,
                date = %date,
                transaction_id = %transaction_id,
                "no close match, transaction created"
            );

            if !options.dry_run {
                context.record_created(transaction_id.clone(), &transaction);
            }

            (
                created_message(
                    &options.ledger_url,
                    &transaction_id,
                    &draft,
                    transaction.destination.name(),
                    date,
                    options.dry_run,
                ),
                MessageOutcome::Created { transaction_id },
            )
        }
    };

    if let Err(e) = notifier.notify(&markdown) {
        warn!(uid = message.uid, error = %e, "notification failed");
    }

    outcome
}

fn log_resolution(uid: u32, draft: &TransactionDraft, resolution: &Resolution) {
    match resolution {
        Resolution::Overlap { account, length } => {
            debug!(uid, name = %draft.destination_name, account = %account.name, length, "matched account by overlap")
        }
        Resolution::EditDistance { account, distance } => {
            debug!(uid, name = %draft.destination_name, account = %account.name, distance, "matched account by edit distance")
        }
        Resolution::NoMatch => {
            debug!(uid, name = %draft.destination_name, "no matching account, using fallback")
        }
    }
}
