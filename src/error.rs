// ⚠️ Error Types - Typed outcomes for rule loading and extraction
// The core never logs or exits: it hands one of these back and the
// run loop decides whether to skip the message or abort.

use thiserror::Error;

// ============================================================================
// EXTRACTION ERRORS (scoped to a single message)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    /// No rule's discriminator matched the body. The caller reports the
    /// message as unparsable and moves on.
    #[error("no processing rule matched the message body")]
    NoDiscriminatorMatch,

    /// A rule was selected but one of its extraction steps found nothing
    #[error("rule '{rule}': extraction pattern `{pattern}` was not found in the message body")]
    StepPatternNotFound { rule: String, pattern: String },

    #[error("invalid {field} amount '{value}'")]
    InvalidAmount { field: &'static str, value: String },

    #[error("could not parse date '{value}' with format '{format}': {reason}")]
    InvalidDate {
        value: String,
        format: String,
        reason: String,
    },

    #[error("unknown time zone '{zone}'")]
    TimeZoneResolutionFailure { zone: String },

    /// Local time falls in a DST gap of the configured zone
    #[error("local time '{value}' does not exist in time zone '{zone}'")]
    NonexistentLocalTime { value: String, zone: String },
}

impl ExtractionError {
    /// True when the message simply isn't one the rules know about
    pub fn is_unparsable(&self) -> bool {
        matches!(self, ExtractionError::NoDiscriminatorMatch)
    }
}

// ============================================================================
// CONFIGURATION ERRORS (load time)
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rule '{rule}': invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule}': capture group {group} does not exist in `{pattern}` ({available} groups)")]
    GroupOutOfRange {
        rule: String,
        pattern: String,
        group: usize,
        available: usize,
    },

    /// transactionDate bindings must name the zone the bank writes dates in
    #[error("rule '{rule}': transactionDate binding on group {group} has no timeZone")]
    MissingTimeZone { rule: String, group: usize },

    #[error("invalid matching threshold: {0}")]
    InvalidThreshold(String),
}
