// 🔎 Extraction Engine - Message body → transaction draft
// Pick the first rule whose discriminator matches, then run its steps in order.
// Later steps may overwrite fields written by earlier ones (last write wins).

use crate::error::ExtractionError;
use crate::rules::{Binding, CompiledRule, RuleSet};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// DRAFT TYPES
// ============================================================================

/// Largest dollar value whose total in cents (with any cents) still fits an i64
pub const MAX_DOLLARS: u64 = ((i64::MAX - 99) / 100) as u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DollarAmount {
    pub dollars: u64,
    /// Always 0-99
    pub cents: u8,
}

impl DollarAmount {
    pub fn new(dollars: u64, cents: u8) -> Self {
        DollarAmount { dollars, cents }
    }

    /// None when the amount is too large to count in i64 cents
    pub fn total_cents(&self) -> Option<i64> {
        i64::try_from(self.dollars)
            .ok()?
            .checked_mul(100)?
            .checked_add(i64::from(self.cents))
    }

    /// Inverse of total_cents; negative amounts are taken by magnitude
    pub fn from_cents(cents: i64) -> Self {
        let cents = cents.unsigned_abs();
        DollarAmount {
            dollars: cents / 100,
            cents: (cents % 100) as u8,
        }
    }
}

impl fmt::Display for DollarAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.dollars, self.cents)
    }
}

/// Fields pulled out of one message by one rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub amount: DollarAmount,

    /// None when the rule has no transactionDate binding
    pub transaction_date: Option<DateTime<Utc>>,

    /// Counterparty as written in the email (trimmed, not normalized)
    pub destination_name: String,

    pub source_account_id: String,

    /// Name of the rule that produced this draft
    pub rule_name: String,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Run the first matching rule over the body
pub fn extract(body: &str, rules: &RuleSet) -> Result<TransactionDraft, ExtractionError> {
    let rule = rules
        .select(body)
        .ok_or(ExtractionError::NoDiscriminatorMatch)?;

    apply_rule(rule, body)
}

/// Run every extraction step of an already-selected rule
pub fn apply_rule(rule: &CompiledRule, body: &str) -> Result<TransactionDraft, ExtractionError> {
    let mut draft = TransactionDraft {
        source_account_id: rule.source_account_id.clone(),
        rule_name: rule.name.clone(),
        ..TransactionDraft::default()
    };

    for step in &rule.steps {
        let captures = step.regex.captures(body).ok_or_else(|| {
            ExtractionError::StepPatternNotFound {
                rule: rule.name.clone(),
                pattern: step.pattern.clone(),
            }
        })?;

        for binding in &step.bindings {
            // Groups that didn't take part in the match read as ""
            let text = captures
                .get(binding.group())
                .map(|m| m.as_str())
                .unwrap_or("");

            match binding {
                Binding::Dollars { .. } => draft.amount.dollars = parse_dollars(text)?,
                Binding::Cents { .. } => draft.amount.cents = parse_cents(text)?,
                Binding::TransactionDate {
                    format, time_zone, ..
                } => {
                    draft.transaction_date = Some(parse_transaction_date(text, format, time_zone)?)
                }
                Binding::DestinationAccount { .. } => {
                    draft.destination_name = text.trim().to_string()
                }
            }
        }
    }

    Ok(draft)
}

// ============================================================================
// FIELD COERCION
// ============================================================================

/// "1,234" → 1234. Anything that isn't digits and commas is an error,
/// and so is anything above MAX_DOLLARS.
pub fn parse_dollars(text: &str) -> Result<u64, ExtractionError> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    let invalid = || ExtractionError::InvalidAmount {
        field: "dollars",
        value: text.to_string(),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    match digits.parse::<u64>() {
        Ok(dollars) if dollars <= MAX_DOLLARS => Ok(dollars),
        _ => Err(invalid()),
    }
}

pub fn parse_cents(text: &str) -> Result<u8, ExtractionError> {
    let digits = text.trim();
    let valid = (1..=2).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());

    match digits.parse::<u8>() {
        Ok(cents) if valid && cents <= 99 => Ok(cents),
        _ => Err(ExtractionError::InvalidAmount {
            field: "cents",
            value: text.to_string(),
        }),
    }
}

/// Parse a local date/time written in `zone` and convert it to UTC.
///
/// Date-only formats resolve to local midnight. Ambiguous local times (DST
/// fall-back) take the earlier instant.
pub fn parse_transaction_date(
    text: &str,
    format: &str,
    zone: &str,
) -> Result<DateTime<Utc>, ExtractionError> {
    let tz: Tz = zone
        .parse()
        .map_err(|_| ExtractionError::TimeZoneResolutionFailure {
            zone: zone.to_string(),
        })?;

    let value = text.trim();
    let local = match NaiveDateTime::parse_from_str(value, format) {
        Ok(datetime) => datetime,
        Err(datetime_err) => match NaiveDate::parse_from_str(value, format) {
            Ok(date) => date.and_time(NaiveTime::MIN),
            Err(_) => {
                return Err(ExtractionError::InvalidDate {
                    value: value.to_string(),
                    format: format.to_string(),
                    reason: datetime_err.to_string(),
                })
            }
        },
    };

    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ExtractionError::NonexistentLocalTime {
            value: value.to_string(),
            zone: zone.to_string(),
        })
}

// ============================================================================
// TESTS
// ============================================================================
